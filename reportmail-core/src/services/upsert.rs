//! Upsert engine - idempotent writes of record batches
//!
//! Every batch is reduced to one record per natural key (last row wins)
//! and handed to the repository as a single conflict-aware upsert. Nothing
//! here deletes rows.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use crate::domain::result::Result;
use crate::domain::{Institution, RecordBatch};
use crate::ports::Repository;

/// Row counts around one batch write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub written: usize,
    pub rows_before: i64,
    pub rows_after: i64,
}

impl UpsertOutcome {
    /// Rows that did not exist before this batch
    pub fn inserted(&self) -> i64 {
        self.rows_after - self.rows_before
    }
}

/// Keep the last record for each key, in first-seen key order
pub fn dedupe_last_wins<T, K, F>(records: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(&key(&record)) {
            Some(&i) => out[i] = record,
            None => {
                positions.insert(key(&record), out.len());
                out.push(record);
            }
        }
    }
    out
}

pub struct UpsertEngine {
    repository: Arc<dyn Repository>,
}

impl UpsertEngine {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    pub fn apply(&self, batch: RecordBatch) -> Result<UpsertOutcome> {
        let kind = batch.kind();
        if batch.is_empty() {
            let rows = self.repository.count_records(kind)?;
            return Ok(UpsertOutcome {
                written: 0,
                rows_before: rows,
                rows_after: rows,
            });
        }

        let rows_before = self.repository.count_records(kind)?;

        let written = match batch {
            RecordBatch::Tasks(tasks) => {
                let tasks = dedupe_last_wins(tasks, |t| {
                    (t.user_id, t.task_date, t.dealer_key(), Institution::key(t.institution))
                });
                self.repository.upsert_daily_tasks(&tasks)?
            }
            RecordBatch::Collections(vouchers) => {
                let vouchers = dedupe_last_wins(vouchers, |v| v.key());
                self.repository.upsert_collection_vouchers(&vouchers)?
            }
            RecordBatch::Projections(records) => {
                let records = dedupe_last_wins(records, |r| {
                    (
                        r.report_date,
                        r.order_dealer_name.clone(),
                        r.collection_dealer_name.clone(),
                        Institution::key(r.institution),
                        r.zone.clone(),
                    )
                });
                self.repository.upsert_projections(&records)?
            }
            RecordBatch::ProjectionVsActual(records) => {
                let records = dedupe_last_wins(records, |r| {
                    (r.report_date, r.dealer_name.clone(), Institution::key(r.institution))
                });
                self.repository.upsert_projection_vs_actual(&records)?
            }
            RecordBatch::Outstanding(records) => {
                let records = dedupe_last_wins(records, |r| {
                    (r.report_date, r.dealer_key(), Institution::key(r.institution))
                });
                self.repository.upsert_outstanding(&records)?
            }
        };

        let rows_after = self.repository.count_records(kind)?;
        debug!(
            table = kind.table_name(),
            written,
            rows_before,
            rows_after,
            "Upserted record batch"
        );

        Ok(UpsertOutcome {
            written,
            rows_before,
            rows_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_last_wins_keeps_first_position() {
        let rows = vec![("a", 1), ("b", 2), ("a", 3), ("c", 4), ("b", 5)];
        let out = dedupe_last_wins(rows, |r| r.0);
        assert_eq!(out, vec![("a", 3), ("b", 5), ("c", 4)]);
    }

    #[test]
    fn test_outcome_inserted() {
        let outcome = UpsertOutcome {
            written: 3,
            rows_before: 10,
            rows_after: 12,
        };
        assert_eq!(outcome.inserted(), 2);
    }
}
