//! Workbook extractor - spreadsheet bytes to per-sheet cell grids
//!
//! One corrupt worksheet never aborts the file: each sheet is read in
//! isolation and failures are logged and skipped.

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use tracing::{debug, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{Cell, RawGrid, SheetGrid};

/// File extensions accepted as spreadsheets
pub const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// True if the declared file name carries a spreadsheet extension
pub fn is_spreadsheet_name(file_name: &str) -> bool {
    Path::new(file_name.trim())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SPREADSHEET_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Extract every non-empty worksheet from a workbook.
///
/// Rejects names without a spreadsheet extension and documents that cannot
/// be opened at all. Individual worksheet failures are skipped.
pub fn extract_workbook(bytes: &[u8], file_name: &str) -> Result<Vec<SheetGrid>> {
    if !is_spreadsheet_name(file_name) {
        return Err(Error::workbook(format!("'{}' is not a spreadsheet file", file_name)));
    }

    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| Error::workbook(format!("failed to open '{}': {}", file_name, e)))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let mut sheets = Vec::with_capacity(sheet_names.len());

    for sheet_name in sheet_names {
        match workbook.worksheet_range(&sheet_name) {
            Ok(range) => {
                if range.is_empty() {
                    debug!(file_name, sheet = %sheet_name, "Skipping empty worksheet");
                    continue;
                }
                sheets.push(SheetGrid {
                    name: sheet_name,
                    grid: range_to_grid(&range),
                });
            }
            Err(e) => {
                warn!(file_name, sheet = %sheet_name, error = %e, "Failed to extract worksheet, skipping");
            }
        }
    }

    Ok(sheets)
}

fn range_to_grid(range: &Range<Data>) -> RawGrid {
    let rows = range
        .rows()
        .map(|row| row.iter().map(data_to_cell).collect())
        .collect();
    RawGrid::new(rows)
}

/// Map a calamine value onto a nullable scalar cell.
///
/// Dates stay numeric (Excel serials) so transformers apply one
/// conversion rule regardless of how the cell was formatted.
fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Null,
        Data::Error(_) => Cell::Null,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::String(s) if s.trim().is_empty() => Cell::Null,
        Data::String(s) => Cell::Text(s.clone()),
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}
