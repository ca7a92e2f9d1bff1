//! Collection sheets - one voucher per row

use tracing::debug;

use super::{cell_date, column_amount, column_text, is_skippable_row, plausible, SheetContext};
use crate::domain::result::{Error, Result};
use crate::domain::{CollectionVoucher, RawGrid, ReportType};
use crate::services::columns::{find_header_row, HeaderMap, COLLECTION_HEADER};

pub fn transform(grid: &RawGrid, ctx: &SheetContext<'_>) -> Result<Vec<CollectionVoucher>> {
    let report = ReportType::Collection;
    let header_row = find_header_row(grid, &COLLECTION_HEADER, 0)
        .ok_or_else(|| Error::missing_column(report, "VOUCHER/DATE/PARTY"))?;
    let header = HeaderMap::single(grid, header_row);

    let voucher_col = header
        .find_excluding(&["VOUCHER"], &["DATE", "TYPE"])
        .ok_or_else(|| Error::missing_column(report, "VOUCHER"))?;
    let date_col = header.require(report, "DATE", &[&["VOUCHER", "DATE"], &["DATE"]])?;
    let party_col = header.require(report, "PARTY", &[&["PARTY", "NAME"], &["PARTY"]])?;
    let amount_col = header.require(report, "AMOUNT", &[&["AMOUNT"], &["AMT"], &["CREDIT"]])?;
    let zone_col = header.find(&["ZONE"]);
    let district_col = header.find(&["DISTRICT"]);
    let remarks_col = header.find_any(&[&["REMARK"], &["NARRATION"]]);
    let tso_col = header.find_any(&[&["TSO"], &["EXECUTIVE"]]);

    let mut vouchers = Vec::new();
    for row in header.data_start..grid.row_count() {
        if is_skippable_row(grid, row) {
            continue;
        }
        let Some(voucher_no) = grid.cell(row, voucher_col).as_text() else {
            debug!(sheet = %ctx.source.sheet_name, row = row + 1, "Skipping collection row without voucher number");
            continue;
        };

        let party_name = grid.cell(row, party_col).as_text().unwrap_or_default();
        let tso_name = column_text(grid, row, tso_col);

        vouchers.push(CollectionVoucher {
            voucher_no,
            institution: ctx.institution,
            voucher_date: cell_date(grid.cell(row, date_col))
                .filter(|d| plausible(*d))
                .unwrap_or(ctx.today),
            dealer_id: ctx.directory.resolve_dealer(&party_name),
            party_name,
            zone: column_text(grid, row, zone_col),
            district: column_text(grid, row, district_col),
            amount: column_amount(grid, row, Some(amount_col))?,
            remarks: column_text(grid, row, remarks_col),
            tso_user_id: tso_name.as_deref().and_then(|n| ctx.directory.resolve_user(n)),
            tso_name,
            source: ctx.source.clone(),
        });
    }
    Ok(vouchers)
}
