//! Status service - record counts per table

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::RecordKind;

/// Status service for ingestion summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let mut tables = Vec::with_capacity(RecordKind::ALL.len());
        for kind in RecordKind::ALL {
            tables.push(TableCount {
                table: kind.table_name().to_string(),
                rows: self.repository.count_table(kind)?,
            });
        }

        Ok(StatusSummary {
            tables,
            total_dealers: self.repository.get_dealers()?.len() as i64,
            total_users: self.repository.get_users()?.len() as i64,
            pending_archive: self.repository.pending_archive_count()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub tables: Vec<TableCount>,
    pub total_dealers: i64,
    pub total_users: i64,
    /// Archived files nobody has looked at yet
    pub pending_archive: i64,
}

#[derive(Debug, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}
