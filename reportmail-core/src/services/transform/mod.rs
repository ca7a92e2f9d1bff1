//! Row transformers - classified grids to domain records
//!
//! One strategy per report type. All of them share the cell parsing rules
//! below and skip derived rows (totals, subtotals, summaries).

mod collection;
mod outstanding;
mod pjp;
mod projection;
mod projection_vs_actual;

use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{bounded_amount, Cell, Institution, RawGrid, RecordBatch, ReportType, SourceMeta};
use crate::services::entity_cache::DirectorySnapshot;

pub use collection::transform as transform_collection;
pub use outstanding::transform as transform_outstanding;
pub use pjp::transform as transform_pjp;
pub use projection::transform as transform_projection;
pub use projection_vs_actual::transform as transform_projection_vs_actual;

/// Rows scanned for a sheet-level report date
pub const REPORT_DATE_SCAN_ROWS: usize = 20;

/// Plausible Excel serial range for a report date (1995..2064)
const SERIAL_DATE_RANGE: std::ops::RangeInclusive<f64> = 35000.0..=60000.0;

const DERIVED_ROW_TOKENS: [&str; 4] = ["TOTAL", "GRAND", "SUBTOTAL", "SUMMARY"];

/// Everything a transformer needs besides the grid
pub struct SheetContext<'a> {
    pub institution: Option<Institution>,
    pub source: SourceMeta,
    pub directory: &'a DirectorySnapshot,
    /// Fallback for missing or unparsable dates
    pub today: NaiveDate,
}

/// Transform a classified sheet into its record batch
pub fn transform_sheet(report_type: ReportType, grid: &RawGrid, ctx: &SheetContext<'_>) -> Result<RecordBatch> {
    match report_type {
        ReportType::Pjp => pjp::transform(grid, ctx).map(RecordBatch::Tasks),
        ReportType::Collection => collection::transform(grid, ctx).map(RecordBatch::Collections),
        ReportType::Projection => projection::transform(grid, ctx).map(RecordBatch::Projections),
        ReportType::ProjectionVsActual => {
            projection_vs_actual::transform(grid, ctx).map(RecordBatch::ProjectionVsActual)
        }
        ReportType::Outstanding => outstanding::transform(grid, ctx).map(RecordBatch::Outstanding),
        ReportType::Unknown => Err(Error::validation("cannot transform an UNKNOWN sheet")),
    }
}

/// Aggregate lines such as "Grand Total" are not data
pub fn is_derived_row(grid: &RawGrid, row: usize) -> bool {
    grid.row_text(row)
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| DERIVED_ROW_TOKENS.contains(&token))
}

/// Blank or derived rows are skipped by every transformer
pub(crate) fn is_skippable_row(grid: &RawGrid, row: usize) -> bool {
    grid.non_empty_cells(row) == 0 || is_derived_row(grid, row)
}

/// Excel serial day number to a calendar date (1900 date system)
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.round() as i64))
}

/// Parse a textual date; day-first for ambiguous numeric forms
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    // Two-digit year formats first: `%Y` would happily read "25" as year 25
    let formats = [
        "%d/%m/%y",
        "%d-%m-%y",
        "%d.%m.%y",
        "%d-%b-%y",
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%d.%m.%Y",
        "%d-%b-%Y",
        "%d %b %Y",
        "%d %B %Y",
    ];

    let candidates = [s, s.split_whitespace().next().unwrap_or(s)];
    for candidate in candidates {
        for fmt in &formats {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, fmt) {
                return Some(date);
            }
        }
    }
    None
}

/// Date from a cell: numeric cells are Excel serials, text is parsed
pub fn cell_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Number(n) => excel_serial_to_date(*n),
        Cell::Text(t) => parse_date(t),
        Cell::Null => None,
    }
}

/// Parse a human-entered amount: currency symbols and thousands separators
/// are ignored, `(100)` is negative, `-` alone is empty.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let s = s.trim();

    let (is_negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };

    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut amount: Decimal = cleaned.parse().ok()?;
    if is_negative && amount > Decimal::ZERO {
        amount = -amount;
    }
    Some(amount)
}

/// Numeric value of a cell, zero when empty or unparsable
pub fn cell_amount(cell: &Cell) -> Decimal {
    match cell {
        Cell::Number(n) if n.is_finite() => n.to_string().parse().unwrap_or(Decimal::ZERO),
        Cell::Text(t) => parse_amount(t).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

/// Trimmed text of an optional column
pub(crate) fn column_text(grid: &RawGrid, row: usize, col: Option<usize>) -> Option<String> {
    col.and_then(|c| grid.cell(row, c).as_text())
}

/// Amount of an optional column, zero when absent, rejected when too large to store
pub(crate) fn column_amount(grid: &RawGrid, row: usize, col: Option<usize>) -> Result<Decimal> {
    let Some(c) = col else {
        return Ok(Decimal::ZERO);
    };
    bounded_amount(
        cell_amount(grid.cell(row, c)),
        &format!("amount at row {}, column {}", row + 1, c + 1),
    )
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid iso date regex"))
}

fn dmy_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4}|\d{2})\b").expect("valid dmy date regex")
    })
}

/// Find a date embedded in free text such as "Outstanding as on 12.03.2025"
pub fn date_in_text(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = iso_date_re().captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
        if date.is_some() {
            return date;
        }
    }

    let caps = dmy_date_re().captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let mut year: i32 = caps[3].parse().ok()?;
    if caps[3].len() == 2 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Report date of a sheet: first date found in the top rows, else `today`.
///
/// Numeric serials only count above `first_header_row`, where amounts
/// cannot occur.
pub fn sheet_report_date(grid: &RawGrid, first_header_row: Option<usize>, today: NaiveDate) -> NaiveDate {
    let scan = grid.row_count().min(REPORT_DATE_SCAN_ROWS);
    for row in 0..scan {
        let serials_allowed = first_header_row.map(|h| row < h).unwrap_or(true);
        for cell in grid.row(row) {
            let found = match cell {
                Cell::Text(t) => date_in_text(t),
                Cell::Number(n) if serials_allowed && SERIAL_DATE_RANGE.contains(n) => excel_serial_to_date(*n),
                _ => None,
            };
            if let Some(date) = found {
                return date;
            }
        }
    }
    today
}

/// Year sanity check for dates parsed out of user data
pub(crate) fn plausible(date: NaiveDate) -> bool {
    (1990..=2100).contains(&date.year())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_excel_serial_is_deterministic() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 21).unwrap();
        assert_eq!(excel_serial_to_date(45678.0), Some(expected));
        assert_eq!(excel_serial_to_date(45678.4), Some(expected));
        assert_eq!(excel_serial_to_date(25569.0), NaiveDate::from_ymd_opt(1970, 1, 1));
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        assert_eq!(parse_date("2025-03-12"), Some(d));
        assert_eq!(parse_date("12/03/2025"), Some(d));
        assert_eq!(parse_date("12.03.25"), Some(d));
        assert_eq!(parse_date("12-Mar-2025"), Some(d));
        assert_eq!(parse_date("2025-03-12 00:00:00"), Some(d));
        assert_eq!(parse_date("next monday"), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,23,456.50"), Some(dec("123456.50")));
        assert_eq!(parse_amount("₹ 500"), Some(dec("500")));
        assert_eq!(parse_amount("(100)"), Some(dec("-100")));
        assert_eq!(parse_amount("-"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(cell_amount(&Cell::Number(12.5)), dec("12.5"));
        assert_eq!(cell_amount(&Cell::Null), Decimal::ZERO);
    }

    #[test]
    fn test_column_amount_bounds() {
        let grid = RawGrid::new(vec![vec![Cell::Number(12.5), Cell::Number(1e27), Cell::from("1,00,00,00,00,00,00,000")]]);
        assert_eq!(column_amount(&grid, 0, Some(0)).unwrap(), dec("12.5"));
        assert_eq!(column_amount(&grid, 0, None).unwrap(), Decimal::ZERO);
        assert!(matches!(column_amount(&grid, 0, Some(1)), Err(Error::Validation(_))));
        assert!(matches!(column_amount(&grid, 0, Some(2)), Err(Error::Validation(_))));
    }

    #[test]
    fn test_derived_rows() {
        let grid = RawGrid::new(vec![
            text_row(&["", "Grand Total", "500"]),
            text_row(&["North", "Sub-Total"]),
            text_row(&["North", "Totalink Traders"]),
        ]);
        assert!(is_derived_row(&grid, 0));
        assert!(is_derived_row(&grid, 1));
        assert!(!is_derived_row(&grid, 2));
    }

    #[test]
    fn test_report_date_from_title_text() {
        let grid = RawGrid::new(vec![
            text_row(&["JSB Outstanding as on 12.03.2025"]),
            text_row(&["Dealer", "Pending", "Security"]),
        ]);
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        assert_eq!(sheet_report_date(&grid, Some(1), today), NaiveDate::from_ymd_opt(2025, 3, 12).unwrap());
    }

    #[test]
    fn test_report_date_ignores_serial_below_header() {
        let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let grid = RawGrid::new(vec![
            text_row(&["Dealer", "Pending", "Security"]),
            vec![Cell::from("Gupta"), Cell::Number(45000.0), Cell::Number(0.0)],
        ]);
        assert_eq!(sheet_report_date(&grid, Some(0), today), today);

        let titled = RawGrid::new(vec![
            vec![Cell::from("Date"), Cell::Number(45678.0)],
            text_row(&["Dealer", "Pending", "Security"]),
        ]);
        assert_eq!(
            sheet_report_date(&titled, Some(1), today),
            NaiveDate::from_ymd_opt(2025, 1, 21).unwrap()
        );
    }

    #[test]
    fn test_unknown_sheet_is_rejected() {
        let directory = DirectorySnapshot::default();
        let ctx = context(&directory, None);
        assert!(transform_sheet(ReportType::Unknown, &RawGrid::default(), &ctx).is_err());
    }
}
