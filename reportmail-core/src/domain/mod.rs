//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with small derivation helpers - no I/O or external dependencies.

mod archive;
mod collection;
mod directory;
pub mod grid;
pub mod mail;
pub mod names;
mod outstanding;
mod projection;
pub mod report;
pub mod result;
mod task;

pub use archive::ArchiveRecord;
pub use collection::CollectionVoucher;
pub use directory::{DealerEntry, UserEntry};
pub use grid::{Cell, RawGrid, SheetGrid};
pub use mail::{MailAttachment, MailMessage, SourceMeta};
pub use outstanding::{AgingBuckets, OutstandingAgingRecord};
pub use projection::{ProjectionRecord, ProjectionVsActualRecord};
pub use report::{ClassifiedSheet, Institution, ReportType};
pub use task::{DailyTask, DEFAULT_VISIT_TYPE, TASK_STATUS_ASSIGNED};

use rust_decimal::Decimal;

use result::{Error, Result};

/// Exclusive magnitude bound of the report amount columns (`DECIMAL(18, 4)`), 1e14
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(0x107A_4000, 0x5AF3, 0, false, 0);

/// Reject an amount the report tables cannot store
pub fn bounded_amount(value: Decimal, what: &str) -> Result<Decimal> {
    if value.abs() >= AMOUNT_LIMIT {
        return Err(Error::validation(format!("{} {} is out of range", what, value)));
    }
    Ok(value)
}

/// Records produced from one classified sheet
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBatch {
    Tasks(Vec<DailyTask>),
    Collections(Vec<CollectionVoucher>),
    Projections(Vec<ProjectionRecord>),
    ProjectionVsActual(Vec<ProjectionVsActualRecord>),
    Outstanding(Vec<OutstandingAgingRecord>),
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        match self {
            RecordBatch::Tasks(v) => v.len(),
            RecordBatch::Collections(v) => v.len(),
            RecordBatch::Projections(v) => v.len(),
            RecordBatch::ProjectionVsActual(v) => v.len(),
            RecordBatch::Outstanding(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            RecordBatch::Tasks(_) => RecordKind::DailyTask,
            RecordBatch::Collections(_) => RecordKind::CollectionVoucher,
            RecordBatch::Projections(_) => RecordKind::Projection,
            RecordBatch::ProjectionVsActual(_) => RecordKind::ProjectionVsActual,
            RecordBatch::Outstanding(_) => RecordKind::OutstandingAging,
        }
    }
}

/// Persisted record tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    DailyTask,
    CollectionVoucher,
    Projection,
    ProjectionVsActual,
    OutstandingAging,
    Archive,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        RecordKind::DailyTask,
        RecordKind::CollectionVoucher,
        RecordKind::Projection,
        RecordKind::ProjectionVsActual,
        RecordKind::OutstandingAging,
        RecordKind::Archive,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            RecordKind::DailyTask => "daily_tasks",
            RecordKind::CollectionVoucher => "collection_vouchers",
            RecordKind::Projection => "projection_records",
            RecordKind::ProjectionVsActual => "projection_vs_actual_records",
            RecordKind::OutstandingAging => "outstanding_aging_records",
            RecordKind::Archive => "ingestion_archive",
        }
    }
}
