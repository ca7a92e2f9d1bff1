//! Extracted worksheet grids
//!
//! A `RawGrid` is the normalized view of one worksheet: ordered rows of
//! nullable scalar cells. Grids are produced fresh per attachment and are
//! discarded once the sheet has been transformed.

use serde::{Deserialize, Serialize};

/// A single nullable scalar cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Trimmed textual form of the cell, `None` when empty.
    ///
    /// Whole numbers render without a fractional part so numeric voucher
    /// numbers and codes compare as typed.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Cell::Number(n) => Some(format_number(*n)),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Ordered rows of cells for one worksheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGrid {
    pub rows: Vec<Vec<Cell>>,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn max_columns(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// Cell at (row, col); out-of-range positions read as `Null`
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static NULL: Cell = Cell::Null;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&NULL)
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Uppercased text of a row with cells separated by single spaces
    pub fn row_text(&self, row: usize) -> String {
        let parts: Vec<String> = self
            .row(row)
            .iter()
            .filter_map(|c| c.as_text())
            .collect();
        collapse_whitespace(&parts.join(" ").to_uppercase())
    }

    pub fn non_empty_cells(&self, row: usize) -> usize {
        self.row(row).iter().filter(|c| !c.is_null()).count()
    }
}

/// A worksheet grid together with its sheet name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetGrid {
    pub name: String,
    pub grid: RawGrid,
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
