//! Projection sheets - planned orders and collections per zone and dealer
//!
//! Rows that share a zone and dealer are summed, not overwritten.

use std::collections::HashMap;

use rust_decimal::Decimal;

use super::{column_amount, column_text, is_skippable_row, sheet_report_date, SheetContext};
use crate::domain::result::{Error, Result};
use crate::domain::{bounded_amount, ProjectionRecord, RawGrid, ReportType};
use crate::services::columns::{find_header_row, HeaderMap, PROJECTION_HEADER};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DealerIdentity {
    Resolved(String),
    Raw { order: String, collection: String },
}

fn summed(total: Decimal, value: Decimal, what: &str) -> Result<Decimal> {
    let sum = total
        .checked_add(value)
        .ok_or_else(|| Error::validation(format!("summed {} overflows", what)))?;
    bounded_amount(sum, &format!("summed {}", what))
}

pub fn transform(grid: &RawGrid, ctx: &SheetContext<'_>) -> Result<Vec<ProjectionRecord>> {
    let report = ReportType::Projection;
    let header_row = find_header_row(grid, &PROJECTION_HEADER, 0)
        .ok_or_else(|| Error::missing_column(report, "ZONE"))?;
    let header = HeaderMap::merged(grid, header_row);

    let zone_col = header.require(report, "ZONE", &[&["ZONE"]])?;
    let order_dealer_col = header.require(
        report,
        "ORDER DEALER",
        &[&["ORDER", "DEALER"], &["ORDER", "PARTY"], &["DEALER"], &["PARTY"]],
    )?;
    let order_qty_col = header.require(
        report,
        "ORDER QNTY",
        &[&["ORDER", "QNTY"], &["ORDER", "QTY"], &["ORDER", "MT"], &["QNTY"], &["QTY"], &["MT"]],
    )?;
    let collection_dealer_col = header.find_any(&[&["COLLECTION", "DEALER"], &["COLLECTION", "PARTY"]]);
    let collection_amount_col = header.require(
        report,
        "COLLECTION AMOUNT",
        &[&["COLLECTION", "AMOUNT"], &["COLLECTION", "AMT"], &["AMOUNT"]],
    )?;

    let report_date = sheet_report_date(grid, Some(header_row), ctx.today);

    let mut records: Vec<ProjectionRecord> = Vec::new();
    let mut index: HashMap<(String, DealerIdentity), usize> = HashMap::new();

    for row in header.data_start..grid.row_count() {
        if is_skippable_row(grid, row) {
            continue;
        }

        let order_name = column_text(grid, row, Some(order_dealer_col)).unwrap_or_default();
        let collection_name = match collection_dealer_col {
            Some(_) => column_text(grid, row, collection_dealer_col).unwrap_or_default(),
            None => order_name.clone(),
        };
        if order_name.is_empty() && collection_name.is_empty() {
            continue;
        }

        let zone = column_text(grid, row, Some(zone_col)).unwrap_or_default();
        let dealer_id = ctx
            .directory
            .resolve_dealer(&order_name)
            .or_else(|| ctx.directory.resolve_dealer(&collection_name));
        let order_qty = column_amount(grid, row, Some(order_qty_col))?;
        let collection_amount = column_amount(grid, row, Some(collection_amount_col))?;

        let identity = match &dealer_id {
            Some(id) => DealerIdentity::Resolved(id.clone()),
            None => DealerIdentity::Raw {
                order: order_name.clone(),
                collection: collection_name.clone(),
            },
        };

        match index.get(&(zone.clone(), identity.clone())) {
            Some(&i) => {
                let record = &mut records[i];
                record.order_qty_mt = summed(record.order_qty_mt, order_qty, "order quantity")?;
                record.collection_amount = summed(record.collection_amount, collection_amount, "collection amount")?;
            }
            None => {
                index.insert((zone.clone(), identity), records.len());
                records.push(ProjectionRecord {
                    report_date,
                    institution: ctx.institution,
                    zone,
                    order_dealer_name: order_name,
                    collection_dealer_name: collection_name,
                    dealer_id,
                    order_qty_mt: order_qty,
                    collection_amount,
                    source: ctx.source.clone(),
                });
            }
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

    fn merged_sheet(rows: Vec<Vec<Cell>>) -> RawGrid {
        let mut all = vec![
            text_row(&["JUD Zone wise projection 14/03/2025"]),
            text_row(&["Zone", "Order Projection", "", "Collection Projection", ""]),
            text_row(&["", "Dealer Name", "Qnty MT", "Dealer Name", "Amount"]),
        ];
        all.extend(rows);
        RawGrid::new(all)
    }

    fn data(zone: &str, order: &str, qty: f64, collection: &str, amount: f64) -> Vec<Cell> {
        vec![
            Cell::from(zone),
            Cell::from(order),
            Cell::Number(qty),
            Cell::from(collection),
            Cell::Number(amount),
        ]
    }

    #[test]
    fn test_rows_for_same_dealer_are_summed() {
        let grid = merged_sheet(vec![
            data("North", "Gupta Traders", 10.0, "Gupta Traders", 1000.0),
            data("North", "GUPTA TRADERS.", 15.0, "Gupta Traders", 500.0),
            data("South", "Verma", 3.0, "Verma", 100.0),
        ]);
        let directory = DirectorySnapshot::build(&[DealerEntry::new("D1", "Gupta Traders")], &[]);
        let records = transform(&grid, &context(&directory, Some(Institution::Jud))).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].order_qty_mt, dec("25"));
        assert_eq!(records[0].collection_amount, dec("1500"));
        assert_eq!(records[0].dealer_id.as_deref(), Some("D1"));
        assert_eq!(records[0].report_date, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(records[1].zone, "South");
        assert_eq!(records[1].dealer_id, None);
    }

    #[test]
    fn test_unresolved_rows_sum_by_raw_names() {
        let grid = merged_sheet(vec![
            data("East", "Alpha", 1.0, "Alpha", 10.0),
            data("East", "Alpha", 2.0, "Beta", 10.0),
            data("East", "Alpha", 4.0, "Alpha", 10.0),
        ]);
        let directory = DirectorySnapshot::default();
        let records = transform(&grid, &context(&directory, None)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].order_qty_mt, dec("5"));
        assert_eq!(records[1].collection_dealer_name, "Beta");
    }

    #[test]
    fn test_single_band_header() {
        let grid = RawGrid::new(vec![
            text_row(&["Zone", "Dealer Name", "Qnty MT", "Amount"]),
            vec![Cell::from("West"), Cell::from("Roy"), Cell::Number(7.0), Cell::Number(70.0)],
        ]);
        let directory = DirectorySnapshot::default();
        let records = transform(&grid, &context(&directory, None)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].order_dealer_name, "Roy");
        assert_eq!(records[0].collection_dealer_name, "Roy");
        assert_eq!(records[0].order_qty_mt, dec("7"));
        assert_eq!(records[0].collection_amount, dec("70"));
    }

    #[test]
    fn test_sum_beyond_storable_range_fails_sheet() {
        let grid = merged_sheet(vec![
            data("North", "Alpha", 6e13, "Alpha", 1.0),
            data("North", "Alpha", 6e13, "Alpha", 1.0),
        ]);
        let directory = DirectorySnapshot::default();
        let err = transform(&grid, &context(&directory, None)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
