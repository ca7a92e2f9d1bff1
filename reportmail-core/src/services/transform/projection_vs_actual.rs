//! Projection vs actual sheets
//!
//! The zone column is sparse: a filled zone cell applies to every following
//! row until the next filled one.

use tracing::debug;

use super::{column_amount, column_text, is_skippable_row, sheet_report_date, SheetContext};
use crate::domain::result::{Error, Result};
use crate::domain::{ProjectionVsActualRecord, RawGrid, ReportType};
use crate::services::columns::{find_header_row, HeaderMap, PROJECTION_HEADER};
use rust_decimal::Decimal;

pub fn transform(grid: &RawGrid, ctx: &SheetContext<'_>) -> Result<Vec<ProjectionVsActualRecord>> {
    let report = ReportType::ProjectionVsActual;
    let header_row = find_header_row(grid, &PROJECTION_HEADER, 0)
        .ok_or_else(|| Error::missing_column(report, "ZONE"))?;
    let header = HeaderMap::merged(grid, header_row);

    let missing = |column: &str| Error::missing_column(report, column);

    let zone_col = header.require(report, "ZONE", &[&["ZONE"]])?;
    let dealer_col = header.require(report, "DEALER", &[&["DEALER"], &["PARTY"]])?;
    let order_projection_col = header
        .find_excluding(&["ORDER", "PROJECTION"], &["ACTUAL", "VS"])
        .ok_or_else(|| missing("ORDER PROJECTION"))?;
    let actual_order_col = header
        .find_excluding(&["ACTUAL", "ORDER"], &["VS", "PROJECTION"])
        .ok_or_else(|| missing("ACTUAL ORDER"))?;
    let do_done_col = header
        .find_excluding(&["DO DONE"], &["VS"])
        .ok_or_else(|| missing("DO DONE"))?;
    let collection_projection_col = header.find_excluding(&["COLLECTION", "PROJECTION"], &["ACTUAL", "VS"]);
    let actual_collection_col = header.find_excluding(&["ACTUAL", "COLLECTION"], &["VS", "SHORT", "PROJECTION"]);

    let report_date = sheet_report_date(grid, Some(header_row), ctx.today);

    let mut records = Vec::new();
    let mut current_zone = String::new();

    for row in header.data_start..grid.row_count() {
        if is_skippable_row(grid, row) {
            continue;
        }
        if let Some(zone) = column_text(grid, row, Some(zone_col)) {
            current_zone = zone;
        }

        let Some(dealer_name) = column_text(grid, row, Some(dealer_col)) else {
            debug!(sheet = %ctx.source.sheet_name, row = row + 1, "Skipping projection-vs-actual row without dealer");
            continue;
        };

        let mut record = ProjectionVsActualRecord {
            report_date,
            institution: ctx.institution,
            zone: current_zone.clone(),
            dealer_id: ctx.directory.resolve_dealer(&dealer_name),
            dealer_name,
            order_projection_mt: column_amount(grid, row, Some(order_projection_col))?,
            actual_order_mt: column_amount(grid, row, Some(actual_order_col))?,
            do_done_mt: column_amount(grid, row, Some(do_done_col))?,
            projection_vs_actual_order_mt: Decimal::ZERO,
            actual_order_vs_do_mt: Decimal::ZERO,
            collection_projection: column_amount(grid, row, collection_projection_col)?,
            actual_collection: column_amount(grid, row, actual_collection_col)?,
            short_fall: Decimal::ZERO,
            percent: Decimal::ZERO,
            source: ctx.source.clone(),
        };
        record.compute_derived()?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::Cell;
    use crate::services::entity_cache::DirectorySnapshot;

    fn row(zone: &str, dealer: &str, values: [f64; 5]) -> Vec<Cell> {
        let mut cells = vec![
            if zone.is_empty() { Cell::Null } else { Cell::from(zone) },
            Cell::from(dealer),
        ];
        cells.extend(values.iter().map(|v| Cell::Number(*v)));
        cells
    }

    fn sheet() -> RawGrid {
        RawGrid::new(vec![
            text_row(&["Projection vs Actual"]),
            text_row(&["Zone", "Dealer", "Order Projection", "Actual Order", "DO Done", "Collection", ""]),
            text_row(&["", "", "MT", "MT", "MT", "Projection", "Actual"]),
            row("North", "Gupta", [100.0, 80.0, 60.0, 1000.0, 750.0]),
            row("", "Sharma", [50.0, 50.0, 50.0, 0.0, 20.0]),
            row("South", "Verma", [10.0, 5.0, 5.0, 300.0, 100.0]),
            text_row(&["", "Zone Total", "160"]),
        ])
    }

    #[test]
    fn test_zone_carries_down() {
        let directory = DirectorySnapshot::default();
        let records = transform(&sheet(), &context(&directory, None)).unwrap();
        let zones: Vec<&str> = records.iter().map(|r| r.zone.as_str()).collect();
        assert_eq!(zones, vec!["North", "North", "South"]);
    }

    #[test]
    fn test_derived_metrics() {
        let directory = DirectorySnapshot::default();
        let records = transform(&sheet(), &context(&directory, None)).unwrap();

        let gupta = &records[0];
        assert_eq!(gupta.projection_vs_actual_order_mt, dec("20"));
        assert_eq!(gupta.actual_order_vs_do_mt, dec("20"));
        assert_eq!(gupta.short_fall, dec("250"));
        assert_eq!(gupta.percent, dec("75"));

        // zero collection projection gives a zero percentage
        assert_eq!(records[1].percent, Decimal::ZERO);
        assert_eq!(records[2].percent, dec("33.33"));
    }

    #[test]
    fn test_out_of_range_amount_fails_sheet() {
        let mut grid = sheet();
        grid.rows.insert(4, row("", "Huge", [1.0, 1.0, 1.0, 1.0, 1e27]));
        let directory = DirectorySnapshot::default();
        let err = transform(&grid, &context(&directory, None)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_large_collection_ratio_is_kept() {
        let grid = RawGrid::new(vec![
            text_row(&["Zone", "Dealer", "Order Projection", "Actual Order", "DO Done", "Collection", ""]),
            text_row(&["", "", "MT", "MT", "MT", "Projection", "Actual"]),
            row("North", "Gupta", [1.0, 1.0, 1.0, 1.0, 1_000_000.0]),
        ]);
        let directory = DirectorySnapshot::default();
        let records = transform(&grid, &context(&directory, None)).unwrap();
        assert_eq!(records[0].percent, dec("100000000"));
    }
}
