//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::domain::result::Result as CoreResult;
use crate::domain::{
    AgingBuckets, ArchiveRecord, CollectionVoucher, DailyTask, DealerEntry, Institution,
    OutstandingAgingRecord, ProjectionRecord, ProjectionVsActualRecord, RecordKind, SourceMeta,
    UserEntry,
};
use crate::ports::{DirectorySource, Repository};
use crate::services::migration::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
}

fn parse_decimal(s: Option<String>) -> Decimal {
    s.and_then(|v| v.parse().ok()).unwrap_or_default()
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok()
}

fn source_from_row(row: &duckdb::Row, first: usize) -> duckdb::Result<SourceMeta> {
    Ok(SourceMeta {
        message_id: row.get::<_, Option<String>>(first)?.unwrap_or_default(),
        file_name: row.get::<_, Option<String>>(first + 1)?.unwrap_or_default(),
        sheet_name: row.get::<_, Option<String>>(first + 2)?.unwrap_or_default(),
    })
}

/// Audit timestamps of a stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowTimestamps {
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file.
    ///
    /// Retries with exponential backoff on file locking errors, which occur
    /// when a manual `ingest` runs while the scheduler holds the file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = format!("{:#}", e);
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "Database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// In-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // JSON is statically linked through the "json" feature; never autoload
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        Ok(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    // === Directory ===

    pub fn upsert_dealer(&self, dealer: &DealerEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dealers (id, party_name, dealer_code, zone)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                party_name = EXCLUDED.party_name,
                dealer_code = EXCLUDED.dealer_code,
                zone = EXCLUDED.zone,
                updated_at = CURRENT_TIMESTAMP",
            params![dealer.id, dealer.party_name, dealer.dealer_code, dealer.zone],
        )?;
        Ok(())
    }

    pub fn upsert_user(&self, user: &UserEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, first_name, last_name)
             VALUES (?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                updated_at = CURRENT_TIMESTAMP",
            params![user.id, user.first_name, user.last_name],
        )?;
        Ok(())
    }

    pub fn get_dealers(&self) -> Result<Vec<DealerEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, party_name, dealer_code, zone FROM dealers ORDER BY id")?;
        let dealers = stmt
            .query_map([], |row| {
                Ok(DealerEntry {
                    id: row.get(0)?,
                    party_name: row.get(1)?,
                    dealer_code: row.get(2)?,
                    zone: row.get(3)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(dealers)
    }

    pub fn get_users(&self) -> Result<Vec<UserEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, first_name, last_name FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], |row| {
                Ok(UserEntry {
                    id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(users)
    }

    // === Record writes ===
    //
    // Each batch runs in one transaction. On conflict every mutable column
    // and updated_at are replaced; created_at is left alone.

    fn write_daily_tasks(&self, tasks: &[DailyTask]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO daily_tasks (user_id, task_date, dealer_key, institution, dealer_name, dealer_id,
                                          visit_type, status, zone, remarks,
                                          source_message_id, source_file_name, source_sheet)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (user_id, task_date, dealer_key, institution) DO UPDATE SET
                    dealer_name = EXCLUDED.dealer_name,
                    dealer_id = EXCLUDED.dealer_id,
                    visit_type = EXCLUDED.visit_type,
                    status = EXCLUDED.status,
                    zone = EXCLUDED.zone,
                    remarks = EXCLUDED.remarks,
                    source_message_id = EXCLUDED.source_message_id,
                    source_file_name = EXCLUDED.source_file_name,
                    source_sheet = EXCLUDED.source_sheet,
                    updated_at = CURRENT_TIMESTAMP",
            )?;
            for t in tasks {
                stmt.execute(params![
                    t.user_id,
                    t.task_date.to_string(),
                    t.dealer_key(),
                    Institution::key(t.institution),
                    t.dealer_name,
                    t.dealer_id,
                    t.visit_type,
                    t.status,
                    t.zone,
                    t.remarks,
                    t.source.message_id,
                    t.source.file_name,
                    t.source.sheet_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(tasks.len())
    }

    fn write_collection_vouchers(&self, vouchers: &[CollectionVoucher]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO collection_vouchers (voucher_no, institution, voucher_date, party_name, dealer_id,
                                                  zone, district, amount, remarks, tso_name, tso_user_id,
                                                  source_message_id, source_file_name, source_sheet)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (voucher_no, institution) DO UPDATE SET
                    voucher_date = EXCLUDED.voucher_date,
                    party_name = EXCLUDED.party_name,
                    dealer_id = EXCLUDED.dealer_id,
                    zone = EXCLUDED.zone,
                    district = EXCLUDED.district,
                    amount = EXCLUDED.amount,
                    remarks = EXCLUDED.remarks,
                    tso_name = EXCLUDED.tso_name,
                    tso_user_id = EXCLUDED.tso_user_id,
                    source_message_id = EXCLUDED.source_message_id,
                    source_file_name = EXCLUDED.source_file_name,
                    source_sheet = EXCLUDED.source_sheet,
                    updated_at = CURRENT_TIMESTAMP",
            )?;
            for v in vouchers {
                stmt.execute(params![
                    v.voucher_no,
                    Institution::key(v.institution),
                    v.voucher_date.to_string(),
                    v.party_name,
                    v.dealer_id,
                    v.zone,
                    v.district,
                    v.amount.to_string(),
                    v.remarks,
                    v.tso_name,
                    v.tso_user_id,
                    v.source.message_id,
                    v.source.file_name,
                    v.source.sheet_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(vouchers.len())
    }

    fn write_projections(&self, records: &[ProjectionRecord]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO projection_records (report_date, order_dealer_name, collection_dealer_name, institution,
                                                 zone, dealer_id, order_qty_mt, collection_amount,
                                                 source_message_id, source_file_name, source_sheet)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (report_date, order_dealer_name, collection_dealer_name, institution, zone) DO UPDATE SET
                    dealer_id = EXCLUDED.dealer_id,
                    order_qty_mt = EXCLUDED.order_qty_mt,
                    collection_amount = EXCLUDED.collection_amount,
                    source_message_id = EXCLUDED.source_message_id,
                    source_file_name = EXCLUDED.source_file_name,
                    source_sheet = EXCLUDED.source_sheet,
                    updated_at = CURRENT_TIMESTAMP",
            )?;
            for r in records {
                stmt.execute(params![
                    r.report_date.to_string(),
                    r.order_dealer_name,
                    r.collection_dealer_name,
                    Institution::key(r.institution),
                    r.zone,
                    r.dealer_id,
                    r.order_qty_mt.to_string(),
                    r.collection_amount.to_string(),
                    r.source.message_id,
                    r.source.file_name,
                    r.source.sheet_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn write_projection_vs_actual(&self, records: &[ProjectionVsActualRecord]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO projection_vs_actual_records (report_date, dealer_name, institution, zone, dealer_id,
                                                           order_projection_mt, actual_order_mt, do_done_mt,
                                                           projection_vs_actual_order_mt, actual_order_vs_do_mt,
                                                           collection_projection, actual_collection, short_fall, percent,
                                                           source_message_id, source_file_name, source_sheet)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (report_date, dealer_name, institution) DO UPDATE SET
                    zone = EXCLUDED.zone,
                    dealer_id = EXCLUDED.dealer_id,
                    order_projection_mt = EXCLUDED.order_projection_mt,
                    actual_order_mt = EXCLUDED.actual_order_mt,
                    do_done_mt = EXCLUDED.do_done_mt,
                    projection_vs_actual_order_mt = EXCLUDED.projection_vs_actual_order_mt,
                    actual_order_vs_do_mt = EXCLUDED.actual_order_vs_do_mt,
                    collection_projection = EXCLUDED.collection_projection,
                    actual_collection = EXCLUDED.actual_collection,
                    short_fall = EXCLUDED.short_fall,
                    percent = EXCLUDED.percent,
                    source_message_id = EXCLUDED.source_message_id,
                    source_file_name = EXCLUDED.source_file_name,
                    source_sheet = EXCLUDED.source_sheet,
                    updated_at = CURRENT_TIMESTAMP",
            )?;
            for r in records {
                stmt.execute(params![
                    r.report_date.to_string(),
                    r.dealer_name,
                    Institution::key(r.institution),
                    r.zone,
                    r.dealer_id,
                    r.order_projection_mt.to_string(),
                    r.actual_order_mt.to_string(),
                    r.do_done_mt.to_string(),
                    r.projection_vs_actual_order_mt.to_string(),
                    r.actual_order_vs_do_mt.to_string(),
                    r.collection_projection.to_string(),
                    r.actual_collection.to_string(),
                    r.short_fall.to_string(),
                    r.percent.to_string(),
                    r.source.message_id,
                    r.source.file_name,
                    r.source.sheet_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn write_outstanding(&self, records: &[OutstandingAgingRecord]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO outstanding_aging_records (report_date, dealer_key, institution, dealer_name,
                                                        verified_dealer_id, zone, security_deposit, pending_amount,
                                                        less_than_10_days, days_10_to_15, days_15_to_21, days_21_to_30,
                                                        days_30_to_45, days_45_to_60, days_60_to_75, days_75_to_90,
                                                        greater_than_90_days, is_overdue, tso_name, tso_user_id,
                                                        source_message_id, source_file_name, source_sheet)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (report_date, dealer_key, institution) DO UPDATE SET
                    dealer_name = EXCLUDED.dealer_name,
                    verified_dealer_id = EXCLUDED.verified_dealer_id,
                    zone = EXCLUDED.zone,
                    security_deposit = EXCLUDED.security_deposit,
                    pending_amount = EXCLUDED.pending_amount,
                    less_than_10_days = EXCLUDED.less_than_10_days,
                    days_10_to_15 = EXCLUDED.days_10_to_15,
                    days_15_to_21 = EXCLUDED.days_15_to_21,
                    days_21_to_30 = EXCLUDED.days_21_to_30,
                    days_30_to_45 = EXCLUDED.days_30_to_45,
                    days_45_to_60 = EXCLUDED.days_45_to_60,
                    days_60_to_75 = EXCLUDED.days_60_to_75,
                    days_75_to_90 = EXCLUDED.days_75_to_90,
                    greater_than_90_days = EXCLUDED.greater_than_90_days,
                    is_overdue = EXCLUDED.is_overdue,
                    tso_name = EXCLUDED.tso_name,
                    tso_user_id = EXCLUDED.tso_user_id,
                    source_message_id = EXCLUDED.source_message_id,
                    source_file_name = EXCLUDED.source_file_name,
                    source_sheet = EXCLUDED.source_sheet,
                    updated_at = CURRENT_TIMESTAMP",
            )?;
            for r in records {
                let b = &r.buckets;
                stmt.execute(params![
                    r.report_date.to_string(),
                    r.dealer_key(),
                    Institution::key(r.institution),
                    r.dealer_name,
                    r.verified_dealer_id,
                    r.zone,
                    r.security_deposit.to_string(),
                    r.pending_amount.to_string(),
                    b.less_than_10_days.to_string(),
                    b.days_10_to_15.to_string(),
                    b.days_15_to_21.to_string(),
                    b.days_21_to_30.to_string(),
                    b.days_30_to_45.to_string(),
                    b.days_45_to_60.to_string(),
                    b.days_60_to_75.to_string(),
                    b.days_75_to_90.to_string(),
                    b.greater_than_90_days.to_string(),
                    r.is_overdue,
                    r.tso_name,
                    r.tso_user_id,
                    r.source.message_id,
                    r.source.file_name,
                    r.source.sheet_name,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn write_archive(&self, record: &ArchiveRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO ingestion_archive (message_id, file_name, subject, sender, payload, content_hash, processed)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (message_id, file_name) DO UPDATE SET
                subject = EXCLUDED.subject,
                sender = EXCLUDED.sender,
                payload = EXCLUDED.payload,
                content_hash = EXCLUDED.content_hash,
                processed = EXCLUDED.processed,
                updated_at = CURRENT_TIMESTAMP",
            params![
                record.message_id,
                record.file_name,
                record.subject,
                record.sender,
                record.payload.to_string(),
                record.content_hash,
                record.processed,
            ],
        )?;
        Ok(())
    }

    // === Reads ===

    pub fn count_table(&self, kind: RecordKind) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", kind.table_name()), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Archived files still waiting for an operator
    pub fn pending_archive_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ingestion_archive WHERE NOT processed",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get_daily_tasks(&self) -> Result<Vec<DailyTask>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, task_date::VARCHAR, dealer_name, dealer_id, visit_type, status, zone, remarks,
                    NULLIF(institution, ''), source_message_id, source_file_name, source_sheet
             FROM daily_tasks
             ORDER BY task_date, user_id, dealer_key",
        )?;
        let tasks = stmt
            .query_map([], |row| {
                let date: String = row.get(1)?;
                let mut task = DailyTask::new(row.get(0)?, parse_date(&date), source_from_row(row, 9)?);
                task.dealer_name = row.get(2)?;
                task.dealer_id = row.get(3)?;
                task.visit_type = row.get(4)?;
                task.status = row.get(5)?;
                task.zone = row.get(6)?;
                task.remarks = row.get(7)?;
                task.institution = row.get::<_, Option<String>>(8)?.as_deref().and_then(Institution::from_key);
                Ok(task)
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    pub fn get_collection_vouchers(&self) -> Result<Vec<CollectionVoucher>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT voucher_no, NULLIF(institution, ''), voucher_date::VARCHAR, party_name, dealer_id, zone,
                    district, amount::VARCHAR, remarks, tso_name, tso_user_id,
                    source_message_id, source_file_name, source_sheet
             FROM collection_vouchers
             ORDER BY voucher_no, institution",
        )?;
        let vouchers = stmt
            .query_map([], |row| {
                let date: String = row.get(2)?;
                Ok(CollectionVoucher {
                    voucher_no: row.get(0)?,
                    institution: row.get::<_, Option<String>>(1)?.as_deref().and_then(Institution::from_key),
                    voucher_date: parse_date(&date),
                    party_name: row.get(3)?,
                    dealer_id: row.get(4)?,
                    zone: row.get(5)?,
                    district: row.get(6)?,
                    amount: parse_decimal(row.get(7)?),
                    remarks: row.get(8)?,
                    tso_name: row.get(9)?,
                    tso_user_id: row.get(10)?,
                    source: source_from_row(row, 11)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(vouchers)
    }

    pub fn get_projection_records(&self) -> Result<Vec<ProjectionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT report_date::VARCHAR, NULLIF(institution, ''), zone, order_dealer_name, collection_dealer_name,
                    dealer_id, order_qty_mt::VARCHAR, collection_amount::VARCHAR,
                    source_message_id, source_file_name, source_sheet
             FROM projection_records
             ORDER BY report_date, zone, order_dealer_name, collection_dealer_name",
        )?;
        let records = stmt
            .query_map([], |row| {
                let date: String = row.get(0)?;
                Ok(ProjectionRecord {
                    report_date: parse_date(&date),
                    institution: row.get::<_, Option<String>>(1)?.as_deref().and_then(Institution::from_key),
                    zone: row.get(2)?,
                    order_dealer_name: row.get(3)?,
                    collection_dealer_name: row.get(4)?,
                    dealer_id: row.get(5)?,
                    order_qty_mt: parse_decimal(row.get(6)?),
                    collection_amount: parse_decimal(row.get(7)?),
                    source: source_from_row(row, 8)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn get_projection_vs_actual(&self) -> Result<Vec<ProjectionVsActualRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT report_date::VARCHAR, NULLIF(institution, ''), zone, dealer_name, dealer_id,
                    order_projection_mt::VARCHAR, actual_order_mt::VARCHAR, do_done_mt::VARCHAR,
                    projection_vs_actual_order_mt::VARCHAR, actual_order_vs_do_mt::VARCHAR,
                    collection_projection::VARCHAR, actual_collection::VARCHAR, short_fall::VARCHAR,
                    percent::VARCHAR, source_message_id, source_file_name, source_sheet
             FROM projection_vs_actual_records
             ORDER BY report_date, zone, dealer_name",
        )?;
        let records = stmt
            .query_map([], |row| {
                let date: String = row.get(0)?;
                Ok(ProjectionVsActualRecord {
                    report_date: parse_date(&date),
                    institution: row.get::<_, Option<String>>(1)?.as_deref().and_then(Institution::from_key),
                    zone: row.get(2)?,
                    dealer_name: row.get(3)?,
                    dealer_id: row.get(4)?,
                    order_projection_mt: parse_decimal(row.get(5)?),
                    actual_order_mt: parse_decimal(row.get(6)?),
                    do_done_mt: parse_decimal(row.get(7)?),
                    projection_vs_actual_order_mt: parse_decimal(row.get(8)?),
                    actual_order_vs_do_mt: parse_decimal(row.get(9)?),
                    collection_projection: parse_decimal(row.get(10)?),
                    actual_collection: parse_decimal(row.get(11)?),
                    short_fall: parse_decimal(row.get(12)?),
                    percent: parse_decimal(row.get(13)?),
                    source: source_from_row(row, 14)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn get_outstanding_records(&self) -> Result<Vec<OutstandingAgingRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT report_date::VARCHAR, NULLIF(institution, ''), dealer_name, verified_dealer_id, zone,
                    security_deposit::VARCHAR, pending_amount::VARCHAR,
                    less_than_10_days::VARCHAR, days_10_to_15::VARCHAR, days_15_to_21::VARCHAR,
                    days_21_to_30::VARCHAR, days_30_to_45::VARCHAR, days_45_to_60::VARCHAR,
                    days_60_to_75::VARCHAR, days_75_to_90::VARCHAR, greater_than_90_days::VARCHAR,
                    is_overdue, tso_name, tso_user_id, source_message_id, source_file_name, source_sheet
             FROM outstanding_aging_records
             ORDER BY report_date, dealer_key, institution",
        )?;
        let records = stmt
            .query_map([], |row| {
                let date: String = row.get(0)?;
                Ok(OutstandingAgingRecord {
                    report_date: parse_date(&date),
                    institution: row.get::<_, Option<String>>(1)?.as_deref().and_then(Institution::from_key),
                    dealer_name: row.get(2)?,
                    verified_dealer_id: row.get(3)?,
                    zone: row.get(4)?,
                    security_deposit: parse_decimal(row.get(5)?),
                    pending_amount: parse_decimal(row.get(6)?),
                    buckets: AgingBuckets {
                        less_than_10_days: parse_decimal(row.get(7)?),
                        days_10_to_15: parse_decimal(row.get(8)?),
                        days_15_to_21: parse_decimal(row.get(9)?),
                        days_21_to_30: parse_decimal(row.get(10)?),
                        days_30_to_45: parse_decimal(row.get(11)?),
                        days_45_to_60: parse_decimal(row.get(12)?),
                        days_60_to_75: parse_decimal(row.get(13)?),
                        days_75_to_90: parse_decimal(row.get(14)?),
                        greater_than_90_days: parse_decimal(row.get(15)?),
                    },
                    is_overdue: row.get(16)?,
                    tso_name: row.get(17)?,
                    tso_user_id: row.get(18)?,
                    source: source_from_row(row, 19)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// created_at/updated_at of every outstanding row, keyed like the table
    pub fn get_outstanding_timestamps(&self) -> Result<Vec<(String, RowTimestamps)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT dealer_key, created_at::VARCHAR, updated_at::VARCHAR
             FROM outstanding_aging_records
             ORDER BY report_date, dealer_key, institution",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let created: String = row.get(1)?;
                let updated: String = row.get(2)?;
                Ok((
                    row.get::<_, String>(0)?,
                    RowTimestamps {
                        created_at: parse_timestamp(&created),
                        updated_at: parse_timestamp(&updated),
                    },
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_archive_records(&self) -> Result<Vec<ArchiveRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, file_name, subject, sender, CAST(payload AS VARCHAR), content_hash, processed
             FROM ingestion_archive
             ORDER BY created_at, message_id, file_name",
        )?;
        let records = stmt
            .query_map([], |row| {
                let payload: Option<String> = row.get(4)?;
                Ok(ArchiveRecord {
                    message_id: row.get(0)?,
                    file_name: row.get(1)?,
                    subject: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    sender: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    payload: payload
                        .and_then(|p| serde_json::from_str(&p).ok())
                        .unwrap_or(serde_json::Value::Null),
                    content_hash: row.get(5)?,
                    processed: row.get(6)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(records)
    }
}

impl DirectorySource for DuckDbRepository {
    fn list_dealers(&self) -> CoreResult<Vec<DealerEntry>> {
        Ok(self.get_dealers()?)
    }

    fn list_users(&self) -> CoreResult<Vec<UserEntry>> {
        Ok(self.get_users()?)
    }
}

impl Repository for DuckDbRepository {
    fn upsert_daily_tasks(&self, tasks: &[DailyTask]) -> CoreResult<usize> {
        Ok(self.write_daily_tasks(tasks)?)
    }

    fn upsert_collection_vouchers(&self, vouchers: &[CollectionVoucher]) -> CoreResult<usize> {
        Ok(self.write_collection_vouchers(vouchers)?)
    }

    fn upsert_projections(&self, records: &[ProjectionRecord]) -> CoreResult<usize> {
        Ok(self.write_projections(records)?)
    }

    fn upsert_projection_vs_actual(&self, records: &[ProjectionVsActualRecord]) -> CoreResult<usize> {
        Ok(self.write_projection_vs_actual(records)?)
    }

    fn upsert_outstanding(&self, records: &[OutstandingAgingRecord]) -> CoreResult<usize> {
        Ok(self.write_outstanding(records)?)
    }

    fn archive_unclassified(&self, record: &ArchiveRecord) -> CoreResult<()> {
        Ok(self.write_archive(record)?)
    }

    fn count_records(&self, kind: RecordKind) -> CoreResult<i64> {
        Ok(self.count_table(kind)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn voucher(no: &str, amount: &str) -> CollectionVoucher {
        CollectionVoucher {
            voucher_no: no.into(),
            institution: Some(Institution::Jsb),
            voucher_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            party_name: "Gupta".into(),
            dealer_id: None,
            zone: None,
            district: None,
            amount: dec(amount),
            remarks: None,
            tso_name: None,
            tso_user_id: None,
            source: SourceMeta::default(),
        }
    }

    #[test]
    fn test_directory_round_trip() {
        let repo = repo();
        repo.upsert_dealer(&DealerEntry::new("D1", "Gupta Traders").with_code("GT1")).unwrap();
        repo.upsert_dealer(&DealerEntry::new("D1", "Gupta Traders Pvt")).unwrap();
        repo.upsert_user(&UserEntry::new(7, "Anil", Some("Sharma"))).unwrap();

        let dealers = repo.list_dealers().unwrap();
        assert_eq!(dealers.len(), 1);
        assert_eq!(dealers[0].party_name, "Gupta Traders Pvt");
        assert_eq!(dealers[0].dealer_code, None);
        assert_eq!(repo.list_users().unwrap()[0].full_name(), "Anil Sharma");
    }

    #[test]
    fn test_voucher_upsert_updates_in_place() {
        let repo = repo();
        repo.upsert_collection_vouchers(&[voucher("V1", "100.50")]).unwrap();
        repo.upsert_collection_vouchers(&[voucher("V1", "200")]).unwrap();

        let stored = repo.get_collection_vouchers().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].amount, dec("200"));
        assert_eq!(stored[0].institution, Some(Institution::Jsb));
        assert_eq!(repo.count_records(RecordKind::CollectionVoucher).unwrap(), 1);
    }

    #[test]
    fn test_null_institution_still_conflicts() {
        let repo = repo();
        let mut v = voucher("V9", "1");
        v.institution = None;
        repo.upsert_collection_vouchers(&[v.clone()]).unwrap();
        repo.upsert_collection_vouchers(&[v]).unwrap();
        assert_eq!(repo.count_records(RecordKind::CollectionVoucher).unwrap(), 1);
        assert_eq!(repo.get_collection_vouchers().unwrap()[0].institution, None);
    }

    #[test]
    fn test_archive_is_idempotent_per_file() {
        let repo = repo();
        let record = ArchiveRecord {
            message_id: "m1".into(),
            subject: "Fwd".into(),
            sender: "ops@example.com".into(),
            file_name: "mystery.xlsx".into(),
            payload: json!({"Sheet1": [["a", 1]]}),
            content_hash: "abc".into(),
            processed: false,
        };
        repo.archive_unclassified(&record).unwrap();
        repo.archive_unclassified(&record).unwrap();

        let stored = repo.get_archive_records().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payload, record.payload);
        assert_eq!(repo.pending_archive_count().unwrap(), 1);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("IO Error: Could not set lock on file: database is locked"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }
}
