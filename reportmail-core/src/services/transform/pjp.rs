//! PJP sheets - one visit task per row

use tracing::warn;

use super::{cell_date, column_text, is_skippable_row, plausible, SheetContext};
use crate::domain::result::{Error, Result};
use crate::domain::{Cell, DailyTask, RawGrid, ReportType};
use crate::services::columns::{find_header_row, HeaderMap, PJP_HEADER};

fn parse_user_id(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
        Cell::Text(t) => t.trim().parse().ok(),
        _ => None,
    }
}

pub fn transform(grid: &RawGrid, ctx: &SheetContext<'_>) -> Result<Vec<DailyTask>> {
    let header_row = find_header_row(grid, &PJP_HEADER, 0)
        .ok_or_else(|| Error::missing_column(ReportType::Pjp, "USER ID"))?;
    let header = HeaderMap::single(grid, header_row);

    let user_col = header.require(ReportType::Pjp, "USER ID", &[&["USER ID"]])?;
    let date_col = header.find_any(&[&["VISIT", "DATE"], &["DATE"]]);
    let dealer_col = header.find_any(&[&["DEALER"], &["PARTY"], &["SITE"], &["CUSTOMER"]]);
    let visit_col = header.find_any(&[&["VISIT", "TYPE"], &["TYPE"]]);
    let zone_col = header.find_any(&[&["ZONE"], &["AREA"]]);
    let remarks_col = header.find_any(&[&["PURPOSE"], &["REMARK"]]);

    let mut tasks = Vec::new();
    let mut dropped = 0usize;

    for row in header.data_start..grid.row_count() {
        if is_skippable_row(grid, row) {
            continue;
        }

        let user_cell = grid.cell(row, user_col);
        let Some(user_id) = parse_user_id(user_cell) else {
            dropped += 1;
            warn!(
                sheet = %ctx.source.sheet_name,
                row = row + 1,
                value = ?user_cell,
                "Dropping PJP row without a numeric user id"
            );
            continue;
        };

        let task_date = date_col
            .and_then(|c| cell_date(grid.cell(row, c)))
            .filter(|d| plausible(*d))
            .unwrap_or(ctx.today);

        let mut task = DailyTask::new(user_id, task_date, ctx.source.clone());
        task.dealer_name = column_text(grid, row, dealer_col);
        task.dealer_id = task
            .dealer_name
            .as_deref()
            .and_then(|name| ctx.directory.resolve_dealer(name));
        if let Some(visit_type) = column_text(grid, row, visit_col) {
            task.visit_type = visit_type;
        }
        task.zone = column_text(grid, row, zone_col);
        task.remarks = column_text(grid, row, remarks_col);
        task.institution = ctx.institution;
        tasks.push(task);
    }

    if dropped > 0 {
        warn!(sheet = %ctx.source.sheet_name, dropped, kept = tasks.len(), "PJP rows dropped");
    }
    Ok(tasks)
}
