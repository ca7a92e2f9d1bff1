//! Repository port - persistence abstraction

use crate::domain::result::Result;
use crate::domain::{
    ArchiveRecord, CollectionVoucher, DailyTask, DealerEntry, OutstandingAgingRecord,
    ProjectionRecord, ProjectionVsActualRecord, RecordKind, UserEntry,
};

/// Read access to the dealer and user directories
pub trait DirectorySource: Send + Sync {
    fn list_dealers(&self) -> Result<Vec<DealerEntry>>;

    fn list_users(&self) -> Result<Vec<UserEntry>>;
}

/// Persistence for ingested records
///
/// Every write is an insert with an explicit conflict target on the
/// record's natural key and a field-level merge on conflict. Nothing on
/// this trait deletes rows. Each call returns the number of rows written.
pub trait Repository: DirectorySource {
    fn upsert_daily_tasks(&self, tasks: &[DailyTask]) -> Result<usize>;

    fn upsert_collection_vouchers(&self, vouchers: &[CollectionVoucher]) -> Result<usize>;

    fn upsert_projections(&self, records: &[ProjectionRecord]) -> Result<usize>;

    fn upsert_projection_vs_actual(&self, records: &[ProjectionVsActualRecord]) -> Result<usize>;

    fn upsert_outstanding(&self, records: &[OutstandingAgingRecord]) -> Result<usize>;

    /// Store an unclassified file verbatim (`processed = false`)
    fn archive_unclassified(&self, record: &ArchiveRecord) -> Result<()>;

    /// Row count of a record table, for before/after verification
    fn count_records(&self, kind: RecordKind) -> Result<i64>;
}
