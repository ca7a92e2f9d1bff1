//! Outstanding aging sheets
//!
//! A sheet may repeat its header several times (one block per zone or
//! TSO). Each block is read on its own and all rows are accumulated.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::{column_amount, column_text, is_skippable_row, sheet_report_date, SheetContext};
use crate::domain::result::{Error, Result};
use crate::domain::{AgingBuckets, OutstandingAgingRecord, RawGrid, ReportType};
use crate::services::columns::{find_header_rows, HeaderMap, OUTSTANDING_HEADER};

/// Bucket column positions within one header block
#[derive(Debug, Default)]
struct BucketColumns {
    less_than_10: Option<usize>,
    days_10_15: Option<usize>,
    days_15_21: Option<usize>,
    days_21_30: Option<usize>,
    days_30_45: Option<usize>,
    days_45_60: Option<usize>,
    days_60_75: Option<usize>,
    days_75_90: Option<usize>,
    greater_than_90: Option<usize>,
}

impl BucketColumns {
    fn resolve(header: &HeaderMap) -> Self {
        Self {
            less_than_10: header.find_any(&[&["<10"], &["LESS", "10"], &["0-10"]]),
            days_10_15: header.find_any(&[&["10-15"]]),
            days_15_21: header.find_any(&[&["15-21"]]),
            days_21_30: header.find_any(&[&["21-30"]]),
            days_30_45: header.find_any(&[&["30-45"]]),
            days_45_60: header.find_any(&[&["45-60"]]),
            days_60_75: header.find_any(&[&["60-75"]]),
            days_75_90: header.find_any(&[&["75-90"]]),
            greater_than_90: header.find_any(&[&[">90"], &["ABOVE", "90"], &["MORE", "90"], &["90+"]]),
        }
    }

    fn read(&self, grid: &RawGrid, row: usize) -> Result<AgingBuckets> {
        Ok(AgingBuckets {
            less_than_10_days: column_amount(grid, row, self.less_than_10)?,
            days_10_to_15: column_amount(grid, row, self.days_10_15)?,
            days_15_to_21: column_amount(grid, row, self.days_15_21)?,
            days_21_to_30: column_amount(grid, row, self.days_21_30)?,
            days_30_to_45: column_amount(grid, row, self.days_30_45)?,
            days_45_to_60: column_amount(grid, row, self.days_45_60)?,
            days_60_to_75: column_amount(grid, row, self.days_60_75)?,
            days_75_to_90: column_amount(grid, row, self.days_75_90)?,
            greater_than_90_days: column_amount(grid, row, self.greater_than_90)?,
        })
    }
}

pub fn transform(grid: &RawGrid, ctx: &SheetContext<'_>) -> Result<Vec<OutstandingAgingRecord>> {
    let report = ReportType::Outstanding;
    let header_rows = find_header_rows(grid, &OUTSTANDING_HEADER);
    if header_rows.is_empty() {
        return Err(Error::missing_column(report, "DEALER/PENDING"));
    }

    let report_date = sheet_report_date(grid, header_rows.first().copied(), ctx.today);
    let mut records = Vec::new();

    for (block, &header_row) in header_rows.iter().enumerate() {
        let block_end = header_rows.get(block + 1).copied().unwrap_or(grid.row_count());
        let header = HeaderMap::single(grid, header_row);

        let dealer_col = match header
            .find_excluding(&["DEALER"], &["CODE", "ID"])
            .or_else(|| header.find(&["DEALER"]))
        {
            Some(col) => col,
            None => {
                warn!(sheet = %ctx.source.sheet_name, header_row = header_row + 1, "Outstanding block without dealer column");
                continue;
            }
        };
        let pending_col = header
            .find_excluding(&["PENDING"], &["SECURITY"])
            .or_else(|| header.find_excluding(&["OUTSTANDING"], &["SECURITY"]))
            .or_else(|| header.find(&["TOTAL"]));
        let security_col = header.find(&["SECURITY"]);
        let zone_col = header.find(&["ZONE"]);
        let tso_col = header.find_any(&[&["TSO"], &["EXECUTIVE"]]);
        let buckets = BucketColumns::resolve(&header);

        for row in header.data_start..block_end {
            // single-cell rows are block banners such as "Zone: South"
            if is_skippable_row(grid, row) || grid.non_empty_cells(row) < 2 {
                continue;
            }
            let Some(dealer_name) = column_text(grid, row, Some(dealer_col)) else {
                debug!(sheet = %ctx.source.sheet_name, row = row + 1, "Skipping outstanding row without dealer");
                continue;
            };

            let aging = buckets.read(grid, row)?;
            let pending_amount = match pending_col {
                Some(_) => column_amount(grid, row, pending_col)?,
                None => aging.total()?,
            };
            let tso_name = column_text(grid, row, tso_col);

            records.push(OutstandingAgingRecord {
                report_date,
                institution: ctx.institution,
                verified_dealer_id: ctx.directory.resolve_dealer(&dealer_name),
                dealer_name,
                zone: column_text(grid, row, zone_col),
                security_deposit: column_amount(grid, row, security_col)?,
                pending_amount,
                is_overdue: aging.greater_than_90_days > Decimal::ZERO,
                buckets: aging,
                tso_user_id: tso_name.as_deref().and_then(|n| ctx.directory.resolve_user(n)),
                tso_name,
                source: ctx.source.clone(),
            });
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::{Cell, DealerEntry, Institution};
    use crate::services::entity_cache::DirectorySnapshot;
    use chrono::NaiveDate;

    const HEADER: &[&str] = &[
        "Dealer Name", "Security", "Total Pending", "< 10 Days", "10-15", "15-21", "21-30", "30-45", "45-60",
        "60-75", "75-90", "> 90",
    ];

    fn data(dealer: &str, pending: f64, over_90: f64) -> Vec<Cell> {
        let mut cells = vec![Cell::from(dealer), Cell::Number(5000.0), Cell::Number(pending)];
        cells.extend((0..8).map(|_| Cell::Number(0.0)));
        cells.push(Cell::Number(over_90));
        cells
    }

    #[test]
    fn test_multiple_header_blocks_accumulate() {
        let grid = RawGrid::new(vec![
            text_row(&["J S B Outstanding as on 10/03/2025"]),
            text_row(&["Zone: North"]),
            text_row(HEADER),
            data("Gupta Traders", 1200.0, 200.0),
            data("Unlisted Agencies", 300.0, 0.0),
            text_row(&["", "", "Total", "1500"]),
            text_row(&["Zone: South"]),
            text_row(HEADER),
            data("Verma Bros", 900.0, 0.0),
        ]);
        let directory = DirectorySnapshot::build(&[DealerEntry::new("D1", "Gupta Traders")], &[]);
        let records = transform(&grid, &context(&directory, Some(Institution::Jsb))).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].verified_dealer_id.as_deref(), Some("D1"));
        assert!(records[0].is_overdue);
        assert_eq!(records[0].pending_amount, dec("1200"));
        assert_eq!(records[0].security_deposit, dec("5000"));
        assert_eq!(records[0].buckets.greater_than_90_days, dec("200"));
        assert_eq!(records[1].verified_dealer_id, None);
        assert_eq!(records[1].dealer_key(), "name:UNLISTEDAGENCIES");
        assert!(!records[1].is_overdue);
        assert_eq!(records[2].dealer_name, "Verma Bros");
        assert!(records
            .iter()
            .all(|r| r.report_date == NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()));
    }

    #[test]
    fn test_pending_falls_back_to_bucket_total() {
        let grid = RawGrid::new(vec![
            text_row(&["Dealer", "Outstanding Security", "< 10", "> 90"]),
            vec![Cell::from("Roy"), Cell::Number(1.0), Cell::Number(40.0), Cell::Number(60.0)],
        ]);
        let directory = DirectorySnapshot::default();
        let records = transform(&grid, &context(&directory, None)).unwrap();
        assert_eq!(records[0].pending_amount, dec("100"));
        assert_eq!(records[0].security_deposit, dec("1"));
    }
}
