//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. The ingestion
//! pipeline is extract -> classify -> transform -> upsert, driven by the
//! scheduler; the remaining services back the CLI.

pub mod classify;
pub mod columns;
mod directory;
pub mod entity_cache;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod migration;
pub mod scheduler;
mod status;
pub mod transform;
pub mod upsert;

pub use classify::{classify_sheet, SheetClassification};
pub use directory::{DirectoryImportResult, DirectoryService};
pub use entity_cache::{DirectorySnapshot, EntityCache};
pub use extract::extract_workbook;
pub use ingest::{CycleReport, FileReport, FileStatus, IncomingFile, IngestService, MessageReport, SheetOutcome};
pub use logging::{EntryPoint, EventCount, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use scheduler::{MailboxCycle, PollCycle, Scheduler, SchedulerConfig, SchedulerState};
pub use status::{StatusService, StatusSummary, TableCount};
pub use upsert::{UpsertEngine, UpsertOutcome};
