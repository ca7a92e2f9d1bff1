//! Report classifier - decide which report a worksheet represents
//!
//! Classification combines a structural signature of the sheet with a hint
//! taken from the e-mail subject. Both are driven by ordered rule tables so
//! the priority between rules (aging reports beat projections) is data.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::grid::collapse_whitespace;
use crate::domain::{ClassifiedSheet, Institution, RawGrid, ReportType};

/// Rows scanned when building a signature
pub const SIGNATURE_ROWS: usize = 50;

/// Rows scanned for an institution marker
pub const INSTITUTION_SCAN_ROWS: usize = 50;

/// Read-only view over the top of a grid used for classification
#[derive(Debug, Clone, Serialize)]
pub struct ReportSignature {
    /// Uppercased, whitespace-collapsed text of the scanned rows
    pub text: String,
    /// `text` with all whitespace removed
    pub compact: String,
    pub tokens: BTreeSet<String>,
    pub max_columns: usize,
    pub row_count: usize,
}

impl ReportSignature {
    pub fn from_grid(grid: &RawGrid) -> Self {
        let scanned = grid.row_count().min(SIGNATURE_ROWS);
        let lines: Vec<String> = (0..scanned).map(|r| grid.row_text(r)).collect();
        let mut signature = Self::from_text(&lines.join(" "));
        signature.max_columns = grid.rows.iter().take(scanned).map(|r| r.len()).max().unwrap_or(0);
        signature.row_count = grid.row_count();
        signature
    }

    /// Signature of free text such as an e-mail subject
    pub fn from_text(text: &str) -> Self {
        let text = collapse_whitespace(&text.to_uppercase());
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect();
        Self {
            text,
            compact,
            tokens,
            max_columns: 0,
            row_count: 0,
        }
    }

    /// Keyword match on the compact form, so `< 10` also matches `<10`
    pub fn contains(&self, keyword: &str) -> bool {
        let key: String = keyword
            .to_uppercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        !key.is_empty() && self.compact.contains(&key)
    }

    pub fn contains_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.contains(k))
    }
}

/// Conjunction of clauses; each clause is satisfied by any of its keywords
#[derive(Debug, Clone, Copy)]
pub struct Predicate {
    pub clauses: &'static [&'static [&'static str]],
}

impl Predicate {
    pub fn matches(&self, signature: &ReportSignature) -> bool {
        !self.clauses.is_empty() && self.clauses.iter().all(|any| signature.contains_any(any))
    }
}

/// Predicate mapped to a report type
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub predicate: Predicate,
    pub result: ReportType,
}

const AGING_MARKERS: &[&str] = &["< 10", "DAYS", "10-15", "15-21"];

/// Rules that win regardless of the structural rules below
pub const OVERRIDE_RULES: &[Rule] = &[Rule {
    name: "aging_buckets",
    predicate: Predicate {
        clauses: &[&["DEALER"], &["PENDING", "OUTSTANDING"], AGING_MARKERS],
    },
    result: ReportType::Outstanding,
}];

/// Structural rules in priority order
pub const STRUCTURAL_RULES: &[Rule] = &[
    Rule {
        name: "user_id",
        predicate: Predicate { clauses: &[&["USER ID"]] },
        result: ReportType::Pjp,
    },
    Rule {
        name: "voucher_party_date",
        predicate: Predicate {
            clauses: &[&["VOUCHER"], &["PARTY"], &["DATE"]],
        },
        result: ReportType::Collection,
    },
    Rule {
        name: "actual_order_do_done",
        predicate: Predicate {
            clauses: &[&["ACTUAL ORDER"], &["DO DONE"]],
        },
        result: ReportType::ProjectionVsActual,
    },
    Rule {
        name: "zone_dealer_amount",
        predicate: Predicate {
            clauses: &[&["ZONE"], &["DEALER"], &["AMOUNT"]],
        },
        result: ReportType::Projection,
    },
    Rule {
        name: "security_pending",
        predicate: Predicate {
            clauses: &[&["SECURITY"], &["PENDING"]],
        },
        result: ReportType::Outstanding,
    },
];

/// Looser single-keyword rules applied to the e-mail subject
pub const SUBJECT_RULES: &[Rule] = &[
    Rule {
        name: "subject_pjp",
        predicate: Predicate { clauses: &[&["USER ID", "PJP"]] },
        result: ReportType::Pjp,
    },
    Rule {
        name: "subject_projection_vs_actual",
        predicate: Predicate {
            clauses: &[&["PROJECTION VS ACTUAL", "ACTUAL ORDER", "DO DONE"]],
        },
        result: ReportType::ProjectionVsActual,
    },
    Rule {
        name: "subject_collection",
        predicate: Predicate {
            clauses: &[&["VOUCHER", "COLLECTION"]],
        },
        result: ReportType::Collection,
    },
    Rule {
        name: "subject_outstanding",
        predicate: Predicate {
            clauses: &[&["OUTSTANDING", "AGING", "AGEING", "PENDING"]],
        },
        result: ReportType::Outstanding,
    },
    Rule {
        name: "subject_projection",
        predicate: Predicate { clauses: &[&["PROJECTION"]] },
        result: ReportType::Projection,
    },
];

fn evaluate(rules: &'static [Rule], signature: &ReportSignature) -> Option<&'static Rule> {
    rules.iter().find(|r| r.predicate.matches(signature))
}

fn structural_rule(signature: &ReportSignature) -> Option<&'static Rule> {
    evaluate(OVERRIDE_RULES, signature).or_else(|| evaluate(STRUCTURAL_RULES, signature))
}

/// Structural classification of a signature
pub fn classify_structure(signature: &ReportSignature) -> ReportType {
    structural_rule(signature)
        .map(|r| r.result)
        .unwrap_or(ReportType::Unknown)
}

/// Report type hinted by an e-mail subject
pub fn subject_hint(subject: &str) -> ReportType {
    let signature = ReportSignature::from_text(subject);
    evaluate(SUBJECT_RULES, &signature)
        .map(|r| r.result)
        .unwrap_or(ReportType::Unknown)
}

/// Outcome of reconciling the structural and subject signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciled {
    pub report_type: ReportType,
    /// Set when both signals were known and disagreed
    pub conflict: Option<(ReportType, ReportType)>,
}

/// Combine structural and subject signals; structure wins on conflict
pub fn reconcile(structural: ReportType, hint: ReportType) -> Reconciled {
    match (structural, hint) {
        (ReportType::Unknown, ReportType::Unknown) => Reconciled {
            report_type: ReportType::Unknown,
            conflict: None,
        },
        (s, ReportType::Unknown) => Reconciled {
            report_type: s,
            conflict: None,
        },
        (ReportType::Unknown, h) => Reconciled {
            report_type: h,
            conflict: None,
        },
        (s, h) if s == h => Reconciled {
            report_type: s,
            conflict: None,
        },
        (s, h) => Reconciled {
            report_type: s,
            conflict: Some((s, h)),
        },
    }
}

fn institution_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^A-Z0-9])(J ?S ?B|J ?U ?D)(?:[^A-Z0-9]|$)").expect("valid institution regex")
    })
}

/// First institution marker in a piece of text
pub fn institution_in_text(text: &str) -> Option<Institution> {
    let upper = collapse_whitespace(&text.to_uppercase());
    let caps = institution_re().captures(&upper)?;
    let marker: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
    Institution::from_key(&marker)
}

/// Infer the institution: subject, then file name, then sheet content
pub fn detect_institution(subject: &str, file_name: &str, grid: &RawGrid) -> Option<Institution> {
    institution_in_text(subject)
        .or_else(|| institution_in_text(file_name))
        .or_else(|| {
            (0..grid.row_count().min(INSTITUTION_SCAN_ROWS))
                .find_map(|r| institution_in_text(&grid.row_text(r)))
        })
}

/// Full classification result for one sheet, with the evidence behind it
#[derive(Debug, Clone, Serialize)]
pub struct SheetClassification {
    pub sheet: ClassifiedSheet,
    pub structural: ReportType,
    pub hint: ReportType,
    pub matched_rule: Option<&'static str>,
    pub conflict: Option<(ReportType, ReportType)>,
}

/// Classify a worksheet given the message subject and file name
pub fn classify_sheet(grid: &RawGrid, subject: &str, file_name: &str) -> SheetClassification {
    let signature = ReportSignature::from_grid(grid);
    let rule = structural_rule(&signature);
    let structural = rule.map(|r| r.result).unwrap_or(ReportType::Unknown);
    let hint = subject_hint(subject);
    let reconciled = reconcile(structural, hint);

    SheetClassification {
        sheet: ClassifiedSheet {
            report_type: reconciled.report_type,
            institution: detect_institution(subject, file_name, grid),
        },
        structural,
        hint,
        matched_rule: rule.map(|r| r.name),
        conflict: reconciled.conflict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cell;

    fn grid(rows: &[&[&str]]) -> RawGrid {
        RawGrid::new(
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|c| if c.is_empty() { Cell::Null } else { Cell::from(*c) })
                        .collect()
                })
                .collect(),
        )
    }

    fn structure(rows: &[&[&str]]) -> ReportType {
        classify_structure(&ReportSignature::from_grid(&grid(rows)))
    }

    #[test]
    fn test_structural_rules_in_priority_order() {
        assert_eq!(structure(&[&["User ID", "Date", "Dealer"]]), ReportType::Pjp);
        assert_eq!(structure(&[&["Voucher No", "Date", "Party Name", "Amount"]]), ReportType::Collection);
        assert_eq!(
            structure(&[&["Zone", "Dealer", "Order Projection", "Actual Order", "DO Done"]]),
            ReportType::ProjectionVsActual
        );
        assert_eq!(structure(&[&["Zone", "Dealer Name", "Qnty MT", "Amount"]]), ReportType::Projection);
        assert_eq!(structure(&[&["Party", "Security", "Pending"]]), ReportType::Outstanding);
        assert_eq!(structure(&[&["Name", "Phone"]]), ReportType::Unknown);
    }

    #[test]
    fn test_aging_override_beats_projection() {
        let rows: &[&[&str]] = &[
            &["Zone", "Dealer", "Amount", "Outstanding", "15-21"],
            &["North", "Gupta", "100", "50", "10"],
        ];
        assert_eq!(structure(rows), ReportType::Outstanding);
    }

    #[test]
    fn test_aging_marker_matches_without_space() {
        let rows: &[&[&str]] = &[&["Dealer", "Total Pending", "<10", "10-15"]];
        assert_eq!(structure(rows), ReportType::Outstanding);
    }

    #[test]
    fn test_subject_hint() {
        assert_eq!(subject_hint("JSB Outstanding as on 12/03"), ReportType::Outstanding);
        assert_eq!(subject_hint("Projection vs Actual - March"), ReportType::ProjectionVsActual);
        assert_eq!(subject_hint("Zone projection"), ReportType::Projection);
        assert_eq!(subject_hint("PJP for next week"), ReportType::Pjp);
        assert_eq!(subject_hint("Collection details"), ReportType::Collection);
        assert_eq!(subject_hint("Fwd: hello"), ReportType::Unknown);
    }

    #[test]
    fn test_reconcile() {
        use ReportType::*;
        assert_eq!(reconcile(Unknown, Unknown).report_type, Unknown);
        assert_eq!(reconcile(Pjp, Unknown).report_type, Pjp);
        assert_eq!(reconcile(Unknown, Collection).report_type, Collection);
        assert_eq!(reconcile(Outstanding, Outstanding).conflict, None);

        let r = reconcile(Outstanding, Projection);
        assert_eq!(r.report_type, Outstanding);
        assert_eq!(r.conflict, Some((Outstanding, Projection)));
    }

    #[test]
    fn test_institution_detection_precedence() {
        let sheet = grid(&[&["J U D CEMENT LTD"], &["Dealer", "Pending"]]);
        assert_eq!(detect_institution("Outstanding JSB", "x.xlsx", &sheet), Some(Institution::Jsb));
        assert_eq!(detect_institution("Outstanding", "report_jsb.xlsx", &sheet), Some(Institution::Jsb));
        assert_eq!(detect_institution("Outstanding", "report.xlsx", &sheet), Some(Institution::Jud));
        assert_eq!(detect_institution("", "", &grid(&[&["Dealer"]])), None);
    }

    #[test]
    fn test_institution_requires_token_boundary() {
        assert_eq!(institution_in_text("JSBX TRADERS"), None);
        assert_eq!(institution_in_text("(J S B)"), Some(Institution::Jsb));
        assert_eq!(institution_in_text("jud-outstanding"), Some(Institution::Jud));
    }

    #[test]
    fn test_classify_sheet_logs_conflict_evidence() {
        let sheet = grid(&[&["User ID", "Date", "Dealer"]]);
        let c = classify_sheet(&sheet, "Collection report", "pjp.xlsx");
        assert_eq!(c.sheet.report_type, ReportType::Pjp);
        assert_eq!(c.matched_rule, Some("user_id"));
        assert_eq!(c.conflict, Some((ReportType::Pjp, ReportType::Collection)));
    }
}
