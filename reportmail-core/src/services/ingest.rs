//! Ingest service - mailbox messages to persisted records
//!
//! One poll cycle lists unread messages and handles them strictly in
//! order. Within a message every spreadsheet attachment goes through
//! extract, classify, transform and upsert. Failure isolation:
//!
//! - a worksheet that cannot be transformed or written is skipped, the file continues
//! - an unreadable file is skipped, the message continues
//! - any other error fails the message, which stays unread for next cycle

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::domain::result::Result;
use crate::domain::{ArchiveRecord, Institution, MailMessage, ReportType, SheetGrid, SourceMeta};
use crate::ports::{Clock, DirectorySource, MailboxGateway, Repository};
use crate::services::classify::classify_sheet;
use crate::services::entity_cache::EntityCache;
use crate::services::extract::{extract_workbook, is_spreadsheet_name};
use crate::services::logging::{
    LogEvent, LoggingService, EVENT_CLASSIFICATION_CONFLICT, EVENT_CYCLE_FAILED, EVENT_FILE_ARCHIVED,
    EVENT_FILE_UNREADABLE, EVENT_MESSAGE_FAILED, EVENT_MESSAGE_PROCESSED, EVENT_SHEET_FAILED,
    EVENT_SHEET_INGESTED,
};
use crate::services::transform::{transform_sheet, SheetContext};
use crate::services::upsert::UpsertEngine;

/// Hex SHA-256 of raw file bytes
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// One spreadsheet file together with the message it arrived in
#[derive(Debug, Clone, Copy)]
pub struct IncomingFile<'a> {
    pub message_id: &'a str,
    pub subject: &'a str,
    pub sender: &'a str,
    pub file_name: &'a str,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetOutcome {
    Ingested { records: usize, inserted: i64 },
    /// Classified UNKNOWN
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetReport {
    pub sheet: String,
    pub report_type: ReportType,
    pub institution: Option<Institution>,
    pub outcome: SheetOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Ingested,
    Archived,
    Unreadable,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_name: String,
    pub status: FileStatus,
    pub sheets: Vec<SheetReport>,
    pub error: Option<String>,
}

impl FileReport {
    /// Records written across all sheets of the file
    pub fn record_count(&self) -> usize {
        self.sheets
            .iter()
            .map(|s| match s.outcome {
                SheetOutcome::Ingested { records, .. } => records,
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub message_id: String,
    pub files: Vec<FileReport>,
    /// Attachments ignored because they are not spreadsheets
    pub ignored_attachments: usize,
}

/// Outcome of one poll-and-drain cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub processed: usize,
    pub failed: usize,
}

pub struct IngestService {
    repository: Arc<dyn Repository>,
    cache: EntityCache,
    upsert: UpsertEngine,
    clock: Arc<dyn Clock>,
    event_log: Option<Arc<LoggingService>>,
    processed_folder_id: Option<String>,
}

impl IngestService {
    pub fn new(
        repository: Arc<dyn Repository>,
        directory: Arc<dyn DirectorySource>,
        clock: Arc<dyn Clock>,
        cache_ttl: chrono::Duration,
    ) -> Self {
        Self {
            cache: EntityCache::new(directory, Arc::clone(&clock), cache_ttl),
            upsert: UpsertEngine::new(Arc::clone(&repository)),
            repository,
            clock,
            event_log: None,
            processed_folder_id: None,
        }
    }

    pub fn with_event_log(mut self, event_log: Arc<LoggingService>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Folder successfully handled messages are moved into
    pub fn with_processed_folder(mut self, folder_id: Option<String>) -> Self {
        self.processed_folder_id = folder_id.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Event log writes never affect ingestion
    fn record(&self, event: LogEvent) {
        if let Some(log) = &self.event_log {
            if let Err(e) = log.log(event) {
                debug!(error = %e, "Failed to write ingestion event");
            }
        }
    }

    /// List unread messages and process each in order
    pub async fn run_cycle(&self, mailbox: &dyn MailboxGateway) -> Result<CycleReport> {
        let messages = match mailbox.list_unread_with_attachments().await {
            Ok(messages) => messages,
            Err(e) => {
                self.record(LogEvent::new(EVENT_CYCLE_FAILED).with_error(e.to_string()));
                return Err(e);
            }
        };

        let mut report = CycleReport {
            fetched: messages.len(),
            ..Default::default()
        };
        if messages.is_empty() {
            return Ok(report);
        }
        info!(mailbox = mailbox.name(), count = messages.len(), "Fetched unread messages");

        for message in &messages {
            match self.process_message(mailbox, message).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    error!(message_id = %message.id, error = %e, "Message failed, leaving unread");
                    self.record(
                        LogEvent::new(EVENT_MESSAGE_FAILED)
                            .with_message(&message.id)
                            .with_error(e.to_string()),
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Ingest every spreadsheet attachment of a message, then mark it read
    /// and optionally move it to the processed folder.
    pub async fn process_message(&self, mailbox: &dyn MailboxGateway, message: &MailMessage) -> Result<MessageReport> {
        let attachments = mailbox.get_attachments(&message.id).await?;
        let mut report = MessageReport {
            message_id: message.id.clone(),
            files: Vec::new(),
            ignored_attachments: 0,
        };

        for attachment in &attachments {
            if !is_spreadsheet_name(&attachment.name) {
                debug!(message_id = %message.id, file_name = %attachment.name, "Ignoring non-spreadsheet attachment");
                report.ignored_attachments += 1;
                continue;
            }
            let bytes = match attachment.decode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(message_id = %message.id, file_name = %attachment.name, error = %e, "Skipping undecodable attachment");
                    self.record(
                        LogEvent::new(EVENT_FILE_UNREADABLE)
                            .with_message(&message.id)
                            .with_file(&attachment.name)
                            .with_error(e.to_string()),
                    );
                    report.files.push(FileReport {
                        file_name: attachment.name.clone(),
                        status: FileStatus::Unreadable,
                        sheets: Vec::new(),
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let file = IncomingFile {
                message_id: &message.id,
                subject: &message.subject,
                sender: &message.from,
                file_name: &attachment.name,
                bytes: &bytes,
            };
            report.files.push(self.ingest_file(&file)?);
        }

        mailbox.mark_as_read(&message.id).await?;
        if let Some(folder) = &self.processed_folder_id {
            mailbox.move_mail(&message.id, folder).await?;
        }

        let records: usize = report.files.iter().map(FileReport::record_count).sum();
        info!(
            message_id = %message.id,
            files = report.files.len(),
            records,
            "Message processed"
        );
        self.record(
            LogEvent::new(EVENT_MESSAGE_PROCESSED)
                .with_message(&message.id)
                .with_count(records),
        );

        Ok(report)
    }

    /// Run one spreadsheet through the pipeline.
    ///
    /// Returns an error only when the directory or the database fails;
    /// unreadable workbooks and untransformable sheets are reported in the
    /// returned `FileReport`.
    pub fn ingest_file(&self, file: &IncomingFile<'_>) -> Result<FileReport> {
        let sheets = match extract_workbook(file.bytes, file.file_name) {
            Ok(sheets) => sheets,
            Err(e) => {
                warn!(message_id = file.message_id, file_name = file.file_name, error = %e, "Skipping unreadable workbook");
                self.record(
                    LogEvent::new(EVENT_FILE_UNREADABLE)
                        .with_message(file.message_id)
                        .with_file(file.file_name)
                        .with_error(e.to_string()),
                );
                return Ok(FileReport {
                    file_name: file.file_name.to_string(),
                    status: FileStatus::Unreadable,
                    sheets: Vec::new(),
                    error: Some(e.to_string()),
                });
            }
        };

        let directory = self.cache.snapshot()?;
        let today = self.clock.today();
        let mut reports = Vec::with_capacity(sheets.len());

        for sheet in &sheets {
            let classification = classify_sheet(&sheet.grid, file.subject, file.file_name);
            let report_type = classification.sheet.report_type;
            let institution = classification.sheet.institution;

            if let Some((structural, hint)) = classification.conflict {
                warn!(
                    message_id = file.message_id,
                    file_name = file.file_name,
                    sheet = %sheet.name,
                    %structural,
                    subject_hint = %hint,
                    "Sheet structure and subject disagree, using structure"
                );
                self.record(
                    LogEvent::new(EVENT_CLASSIFICATION_CONFLICT)
                        .with_message(file.message_id)
                        .with_file(file.file_name)
                        .with_sheet(&sheet.name)
                        .with_report_type(report_type)
                        .with_error(format!("structure {} vs subject {}", structural, hint)),
                );
            }

            if !report_type.is_known() {
                debug!(file_name = file.file_name, sheet = %sheet.name, "Sheet not recognised, skipping");
                reports.push(SheetReport {
                    sheet: sheet.name.clone(),
                    report_type,
                    institution,
                    outcome: SheetOutcome::Skipped,
                });
                continue;
            }

            let ctx = SheetContext {
                institution,
                source: SourceMeta {
                    message_id: file.message_id.to_string(),
                    file_name: file.file_name.to_string(),
                    sheet_name: sheet.name.clone(),
                },
                directory: directory.as_ref(),
                today,
            };

            let written = transform_sheet(report_type, &sheet.grid, &ctx).and_then(|batch| self.upsert.apply(batch));
            let outcome = match written {
                Ok(outcome) => {
                    info!(
                        file_name = file.file_name,
                        sheet = %sheet.name,
                        %report_type,
                        institution = Institution::key(institution),
                        records = outcome.written,
                        inserted = outcome.inserted(),
                        "Sheet ingested"
                    );
                    self.record(
                        LogEvent::new(EVENT_SHEET_INGESTED)
                            .with_message(file.message_id)
                            .with_file(file.file_name)
                            .with_sheet(&sheet.name)
                            .with_report_type(report_type)
                            .with_count(outcome.written),
                    );
                    SheetOutcome::Ingested {
                        records: outcome.written,
                        inserted: outcome.inserted(),
                    }
                }
                Err(e) => {
                    warn!(
                        file_name = file.file_name,
                        sheet = %sheet.name,
                        %report_type,
                        error = %e,
                        "Sheet could not be ingested, skipping"
                    );
                    self.record(
                        LogEvent::new(EVENT_SHEET_FAILED)
                            .with_message(file.message_id)
                            .with_file(file.file_name)
                            .with_sheet(&sheet.name)
                            .with_report_type(report_type)
                            .with_error(e.to_string()),
                    );
                    SheetOutcome::Failed { error: e.to_string() }
                }
            };

            reports.push(SheetReport {
                sheet: sheet.name.clone(),
                report_type,
                institution,
                outcome,
            });
        }

        let classified = reports.iter().any(|r| r.report_type.is_known());
        if !classified {
            self.archive(file, &sheets)?;
        }

        Ok(FileReport {
            file_name: file.file_name.to_string(),
            status: if classified { FileStatus::Ingested } else { FileStatus::Archived },
            sheets: reports,
            error: None,
        })
    }

    fn archive(&self, file: &IncomingFile<'_>, sheets: &[SheetGrid]) -> Result<()> {
        let mut payload = Map::new();
        for sheet in sheets {
            payload.insert(sheet.name.clone(), serde_json::to_value(&sheet.grid.rows)?);
        }

        self.repository.archive_unclassified(&ArchiveRecord {
            message_id: file.message_id.to_string(),
            subject: file.subject.to_string(),
            sender: file.sender.to_string(),
            file_name: file.file_name.to_string(),
            payload: JsonValue::Object(payload),
            content_hash: content_hash(file.bytes),
            processed: false,
        })?;

        info!(
            message_id = file.message_id,
            file_name = file.file_name,
            sheets = sheets.len(),
            "No sheet recognised, file archived"
        );
        self.record(
            LogEvent::new(EVENT_FILE_ARCHIVED)
                .with_message(file.message_id)
                .with_file(file.file_name)
                .with_count(sheets.len()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;
    use crate::domain::result::Error;
    use crate::domain::{
        ArchiveRecord, CollectionVoucher, DailyTask, DealerEntry, OutstandingAgingRecord, ProjectionRecord,
        ProjectionVsActualRecord, RecordKind, UserEntry,
    };
    use crate::ports::SystemClock;
    use rust_decimal::Decimal;
    use rust_xlsxwriter::Workbook;

    /// Delegates to DuckDB but rejects every projection-vs-actual write
    struct RejectingPvaRepository(Arc<DuckDbRepository>);

    impl DirectorySource for RejectingPvaRepository {
        fn list_dealers(&self) -> Result<Vec<DealerEntry>> {
            self.0.list_dealers()
        }

        fn list_users(&self) -> Result<Vec<UserEntry>> {
            self.0.list_users()
        }
    }

    impl Repository for RejectingPvaRepository {
        fn upsert_daily_tasks(&self, tasks: &[DailyTask]) -> Result<usize> {
            self.0.upsert_daily_tasks(tasks)
        }

        fn upsert_collection_vouchers(&self, vouchers: &[CollectionVoucher]) -> Result<usize> {
            self.0.upsert_collection_vouchers(vouchers)
        }

        fn upsert_projections(&self, records: &[ProjectionRecord]) -> Result<usize> {
            self.0.upsert_projections(records)
        }

        fn upsert_projection_vs_actual(&self, _records: &[ProjectionVsActualRecord]) -> Result<usize> {
            Err(Error::database("Conversion Error: value out of range for DECIMAL(10, 2)"))
        }

        fn upsert_outstanding(&self, records: &[OutstandingAgingRecord]) -> Result<usize> {
            self.0.upsert_outstanding(records)
        }

        fn archive_unclassified(&self, record: &ArchiveRecord) -> Result<()> {
            self.0.archive_unclassified(record)
        }

        fn count_records(&self, kind: RecordKind) -> Result<i64> {
            self.0.count_records(kind)
        }
    }

    fn service() -> (Arc<DuckDbRepository>, IngestService) {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let service = IngestService::new(
            repo.clone(),
            repo.clone(),
            Arc::new(SystemClock),
            chrono::Duration::minutes(5),
        );
        (repo, service)
    }

    fn workbook(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
        let mut wb = Workbook::new();
        for (name, rows) in sheets {
            let ws = wb.add_worksheet();
            ws.set_name(*name).unwrap();
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    match value.parse::<f64>() {
                        Ok(n) => ws.write_number(r as u32, c as u16, n).unwrap(),
                        Err(_) => ws.write_string(r as u32, c as u16, *value).unwrap(),
                    };
                }
            }
        }
        wb.save_to_buffer().unwrap()
    }

    fn file<'a>(name: &'a str, subject: &'a str, bytes: &'a [u8]) -> IncomingFile<'a> {
        IncomingFile {
            message_id: "msg-1",
            subject,
            sender: "reports@example.com",
            file_name: name,
            bytes,
        }
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_collection_sheet_is_ingested_with_institution() {
        let (repo, service) = service();
        repo.upsert_dealer(&DealerEntry::new("D1", "Gupta Traders")).unwrap();
        let bytes = workbook(&[(
            "Collection",
            &[
                &["JSB Collection Report"],
                &["Voucher No", "Date", "Party Name", "Amount"],
                &["V-1", "01/03/2025", "M/s Gupta Traders", "1500"],
                &["V-2", "02/03/2025", "Unknown Party", "250.5"],
                &["", "", "Grand Total", "1750.5"],
            ],
        )]);

        let report = service.ingest_file(&file("daily.xlsx", "", &bytes)).unwrap();
        assert_eq!(report.status, FileStatus::Ingested);
        assert_eq!(report.record_count(), 2);

        let vouchers = repo.get_collection_vouchers().unwrap();
        assert_eq!(vouchers.len(), 2);
        assert!(vouchers.iter().all(|v| v.institution == Some(Institution::Jsb)));
        assert_eq!(vouchers[0].dealer_id.as_deref(), Some("D1"));
        assert_eq!(vouchers[1].dealer_id, None);
    }

    #[test]
    fn test_missing_column_fails_only_that_sheet() {
        let (repo, service) = service();
        let bytes = workbook(&[
            ("Broken", &[&["Zone", "Dealer", "Amount", "Remarks"], &["North", "Roy", "10", ""]]),
            (
                "Vouchers",
                &[&["Voucher", "Date", "Party", "Amount"], &["V-9", "2025-03-01", "Roy", "10"]],
            ),
        ]);

        let report = service.ingest_file(&file("mixed.xlsx", "", &bytes)).unwrap();
        assert_eq!(report.sheets.len(), 2);
        assert!(matches!(report.sheets[0].outcome, SheetOutcome::Failed { .. }));
        assert!(matches!(report.sheets[1].outcome, SheetOutcome::Ingested { records: 1, .. }));
        assert_eq!(repo.count_records(RecordKind::CollectionVoucher).unwrap(), 1);
        assert_eq!(repo.pending_archive_count().unwrap(), 0);
    }

    #[test]
    fn test_unrecognised_file_is_archived() {
        let (repo, service) = service();
        let bytes = workbook(&[("Notes", &[&["Hello", "World"], &["1", "2"]])]);

        let report = service.ingest_file(&file("notes.xlsx", "FYI", &bytes)).unwrap();
        assert_eq!(report.status, FileStatus::Archived);

        let archived = repo.get_archive_records().unwrap();
        assert_eq!(archived.len(), 1);
        assert!(!archived[0].processed);
        assert_eq!(archived[0].content_hash, content_hash(&bytes));
        assert_eq!(archived[0].payload["Notes"][0][0], "Hello");
    }

    #[test]
    fn test_unreadable_workbook_is_reported() {
        let (repo, service) = service();
        let report = service
            .ingest_file(&file("broken.xlsx", "", b"definitely not a workbook"))
            .unwrap();
        assert_eq!(report.status, FileStatus::Unreadable);
        assert!(report.error.is_some());
        assert_eq!(repo.pending_archive_count().unwrap(), 0);
    }

    const PVA_HEADER: &[&str] = &[
        "Zone",
        "Dealer",
        "Order Projection",
        "Actual Order",
        "DO Done",
        "Collection Projection",
        "Actual Collection",
    ];
    const VOUCHER_ROWS: &[&[&str]] = &[&["Voucher", "Date", "Party", "Amount"], &["V-9", "2025-03-01", "Roy", "10"]];

    #[test]
    fn test_large_collection_ratio_is_persisted() {
        let (repo, service) = service();
        let bytes = workbook(&[(
            "PvA",
            &[PVA_HEADER, &["North", "Gupta", "1", "1", "1", "1", "1000000"]],
        )]);

        let report = service.ingest_file(&file("pva.xlsx", "", &bytes)).unwrap();
        assert!(matches!(report.sheets[0].outcome, SheetOutcome::Ingested { records: 1, .. }));

        let records = repo.get_projection_vs_actual().unwrap();
        assert_eq!(records[0].percent, Decimal::from(100_000_000));
        assert_eq!(records[0].short_fall, Decimal::from(-999_999));
    }

    #[test]
    fn test_out_of_range_amount_fails_only_that_sheet() {
        let (repo, service) = service();
        let bytes = workbook(&[
            ("PvA", &[PVA_HEADER, &["North", "Gupta", "1", "1", "1", "1", "1e27"]]),
            ("Vouchers", VOUCHER_ROWS),
        ]);

        let report = service.ingest_file(&file("mixed.xlsx", "", &bytes)).unwrap();
        assert_eq!(report.status, FileStatus::Ingested);
        assert!(matches!(report.sheets[0].outcome, SheetOutcome::Failed { .. }));
        assert!(matches!(report.sheets[1].outcome, SheetOutcome::Ingested { records: 1, .. }));
        assert_eq!(repo.count_records(RecordKind::ProjectionVsActual).unwrap(), 0);
        assert_eq!(repo.count_records(RecordKind::CollectionVoucher).unwrap(), 1);
    }

    #[test]
    fn test_write_failure_fails_only_that_sheet() {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let rejecting = Arc::new(RejectingPvaRepository(repo.clone()));
        let service = IngestService::new(
            rejecting.clone(),
            rejecting,
            Arc::new(SystemClock),
            chrono::Duration::minutes(5),
        );
        let bytes = workbook(&[
            ("PvA", &[PVA_HEADER, &["North", "Gupta", "1", "1", "1", "1", "2"]]),
            ("Vouchers", VOUCHER_ROWS),
        ]);

        let report = service.ingest_file(&file("mixed.xlsx", "", &bytes)).unwrap();
        match &report.sheets[0].outcome {
            SheetOutcome::Failed { error } => assert!(error.contains("out of range")),
            other => panic!("expected failed sheet, got {:?}", other),
        }
        assert!(matches!(report.sheets[1].outcome, SheetOutcome::Ingested { records: 1, .. }));
        assert_eq!(repo.count_records(RecordKind::CollectionVoucher).unwrap(), 1);
    }
}
