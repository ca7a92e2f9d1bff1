//! Column resolver - locate header rows and map semantic columns to positions
//!
//! Header rows are found by keyword conjunction rather than a fixed offset,
//! since title and logo rows of variable height precede the real header.

use crate::domain::grid::collapse_whitespace;
use crate::domain::result::{Error, Result};
use crate::domain::{Cell, RawGrid, ReportType};

/// Minimum non-empty cells for a row to count as a header
pub const MIN_HEADER_CELLS: usize = 3;

/// Uppercase and keep only `A-Z 0-9 < > - + %`, collapsing whitespace
pub fn normalize_header(text: &str) -> String {
    let mapped: String = text
        .to_uppercase()
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || "<>-+%".contains(c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&mapped)
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn compact_key(keyword: &str) -> String {
    compact(&normalize_header(keyword))
}

fn cell_label(cell: &Cell) -> String {
    cell.as_text().map(|t| normalize_header(&t)).unwrap_or_default()
}

/// Keyword conjunction identifying a header row
#[derive(Debug, Clone, Copy)]
pub struct HeaderPredicate {
    /// All clauses must hold; a clause holds when any of its keywords is present
    pub clauses: &'static [&'static [&'static str]],
}

pub const PJP_HEADER: HeaderPredicate = HeaderPredicate {
    clauses: &[&["USER ID"]],
};

pub const COLLECTION_HEADER: HeaderPredicate = HeaderPredicate {
    clauses: &[&["VOUCHER"], &["DATE"], &["PARTY"]],
};

/// Shared by PROJECTION and PROJECTION_VS_ACTUAL
pub const PROJECTION_HEADER: HeaderPredicate = HeaderPredicate {
    clauses: &[&["ZONE"]],
};

pub const OUTSTANDING_HEADER: HeaderPredicate = HeaderPredicate {
    clauses: &[&["DEALER"], &["PENDING", "OUTSTANDING", "TOTAL"]],
};

impl HeaderPredicate {
    pub fn matches_row(&self, grid: &RawGrid, row: usize) -> bool {
        if grid.non_empty_cells(row) < MIN_HEADER_CELLS {
            return false;
        }
        let labels: Vec<String> = grid.row(row).iter().map(cell_label).collect();
        let text = compact(&labels.join(" "));
        self.clauses
            .iter()
            .all(|any| any.iter().any(|k| text.contains(&compact_key(k))))
    }
}

/// First header row at or after `from`
pub fn find_header_row(grid: &RawGrid, predicate: &HeaderPredicate, from: usize) -> Option<usize> {
    (from..grid.row_count()).find(|&r| predicate.matches_row(grid, r))
}

/// Every row matching the predicate, for sheets with repeated header blocks
pub fn find_header_rows(grid: &RawGrid, predicate: &HeaderPredicate) -> Vec<usize> {
    (0..grid.row_count())
        .filter(|&r| predicate.matches_row(grid, r))
        .collect()
}

/// True when a row looks like the lower band of a two-row header:
/// some text and no numeric cells.
fn is_header_band(grid: &RawGrid, row: usize) -> bool {
    let cells: Vec<&Cell> = grid.row(row).iter().filter(|c| !c.is_null()).collect();
    !cells.is_empty()
        && cells.iter().all(|c| match c {
            Cell::Text(t) => t.trim().replace(',', "").parse::<f64>().is_err(),
            _ => false,
        })
}

/// Resolved header: one normalized label per column position
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMap {
    /// Row of the (upper) header band
    pub header_row: usize,
    /// First row after the header
    pub data_start: usize,
    labels: Vec<String>,
    compact_labels: Vec<String>,
}

impl HeaderMap {
    fn from_labels(header_row: usize, data_start: usize, labels: Vec<String>) -> Self {
        let compact_labels = labels.iter().map(|l| compact(l)).collect();
        Self {
            header_row,
            data_start,
            labels,
            compact_labels,
        }
    }

    /// Header made of a single row
    pub fn single(grid: &RawGrid, header_row: usize) -> Self {
        let labels = grid.row(header_row).iter().map(cell_label).collect();
        Self::from_labels(header_row, header_row + 1, labels)
    }

    /// Header that may span two rows.
    ///
    /// When the row below is a header band, an empty upper cell inherits the
    /// last upper label to its left wherever the lower cell is filled, and
    /// the two labels are concatenated. Otherwise falls back to `single`.
    pub fn merged(grid: &RawGrid, header_row: usize) -> Self {
        let lower_row = header_row + 1;
        if lower_row >= grid.row_count() || !is_header_band(grid, lower_row) {
            return Self::single(grid, header_row);
        }

        let width = grid.row(header_row).len().max(grid.row(lower_row).len());
        let mut carried = String::new();
        let mut labels = Vec::with_capacity(width);

        for col in 0..width {
            let upper = cell_label(grid.cell(header_row, col));
            let lower = cell_label(grid.cell(lower_row, col));

            let upper = if upper.is_empty() {
                if lower.is_empty() {
                    String::new()
                } else {
                    carried.clone()
                }
            } else {
                carried = upper.clone();
                upper
            };

            labels.push(collapse_whitespace(&format!("{} {}", upper, lower)));
        }

        Self::from_labels(header_row, lower_row + 1, labels)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn width(&self) -> usize {
        self.labels.len()
    }

    /// First column whose label contains every keyword
    pub fn find(&self, keywords: &[&str]) -> Option<usize> {
        self.find_excluding(keywords, &[])
    }

    /// First column containing every keyword and none of the exclusions
    pub fn find_excluding(&self, keywords: &[&str], excludes: &[&str]) -> Option<usize> {
        let keys: Vec<String> = keywords.iter().map(|k| compact_key(k)).collect();
        let excludes: Vec<String> = excludes.iter().map(|k| compact_key(k)).collect();
        self.compact_labels.iter().position(|label| {
            !label.is_empty()
                && keys.iter().all(|k| label.contains(k.as_str()))
                && !excludes.iter().any(|x| label.contains(x.as_str()))
        })
    }

    /// First alternative keyword set that resolves to a column
    pub fn find_any(&self, alternatives: &[&[&str]]) -> Option<usize> {
        alternatives.iter().find_map(|keys| self.find(keys))
    }

    /// Like `find_any`, but a missing column abandons the sheet
    pub fn require(&self, report: ReportType, column: &str, alternatives: &[&[&str]]) -> Result<usize> {
        self.find_any(alternatives)
            .ok_or_else(|| Error::missing_column(report, column))
    }
}
