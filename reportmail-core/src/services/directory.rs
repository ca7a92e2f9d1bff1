//! Directory service - seeds dealers and users from CSV exports

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::{DealerEntry, UserEntry};

/// Result of a directory CSV import
#[derive(Debug, Default, Serialize)]
pub struct DirectoryImportResult {
    pub imported: usize,
    pub skipped: usize,
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn field(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub struct DirectoryService {
    repository: Arc<DuckDbRepository>,
}

impl DirectoryService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Import dealers from a CSV with headers `id,party_name,dealer_code,zone`
    pub fn import_dealers(&self, file_path: &Path) -> Result<DirectoryImportResult> {
        let file = std::fs::File::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        self.import_dealers_from(file)
    }

    pub fn import_dealers_from<R: Read>(&self, input: R) -> Result<DirectoryImportResult> {
        let mut reader = csv::Reader::from_reader(input);
        let headers = reader.headers()?.clone();

        let id_idx = column(&headers, "id").context("Dealer CSV needs an 'id' column")?;
        let name_idx = column(&headers, "party_name").context("Dealer CSV needs a 'party_name' column")?;
        let code_idx = column(&headers, "dealer_code");
        let zone_idx = column(&headers, "zone");

        let mut result = DirectoryImportResult::default();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let (Some(id), Some(party_name)) = (field(&record, Some(id_idx)), field(&record, Some(name_idx))) else {
                warn!(line = line + 2, "Skipping dealer without id or party name");
                result.skipped += 1;
                continue;
            };
            self.repository.upsert_dealer(&DealerEntry {
                id,
                party_name,
                dealer_code: field(&record, code_idx),
                zone: field(&record, zone_idx),
            })?;
            result.imported += 1;
        }

        info!(imported = result.imported, skipped = result.skipped, "Imported dealers");
        Ok(result)
    }

    /// Import users from a CSV with headers `id,first_name,last_name`
    pub fn import_users(&self, file_path: &Path) -> Result<DirectoryImportResult> {
        let file = std::fs::File::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        self.import_users_from(file)
    }

    pub fn import_users_from<R: Read>(&self, input: R) -> Result<DirectoryImportResult> {
        let mut reader = csv::Reader::from_reader(input);
        let headers = reader.headers()?.clone();

        let id_idx = column(&headers, "id").context("User CSV needs an 'id' column")?;
        let first_idx = column(&headers, "first_name").context("User CSV needs a 'first_name' column")?;
        let last_idx = column(&headers, "last_name");

        let mut result = DirectoryImportResult::default();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let id = field(&record, Some(id_idx)).and_then(|s| s.parse::<i64>().ok());
            let (Some(id), Some(first_name)) = (id, field(&record, Some(first_idx))) else {
                warn!(line = line + 2, "Skipping user without numeric id or first name");
                result.skipped += 1;
                continue;
            };
            self.repository.upsert_user(&UserEntry {
                id,
                first_name,
                last_name: field(&record, last_idx),
            })?;
            result.imported += 1;
        }

        info!(imported = result.imported, skipped = result.skipped, "Imported users");
        Ok(result)
    }

    pub fn list_dealers(&self) -> Result<Vec<DealerEntry>> {
        self.repository.get_dealers()
    }

    pub fn list_users(&self) -> Result<Vec<UserEntry>> {
        self.repository.get_users()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> DirectoryService {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        DirectoryService::new(Arc::new(repo))
    }

    #[test]
    fn test_import_dealers() {
        let service = service();
        let csv = "id,party_name,dealer_code,zone\nD1,Gupta Traders,GT01,North\nD2,,X,South\nD3,Verma Bros,,\n";
        let result = service.import_dealers_from(csv.as_bytes()).unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped, 1);

        let dealers = service.list_dealers().unwrap();
        assert_eq!(dealers[0].dealer_code.as_deref(), Some("GT01"));
        assert_eq!(dealers[1].id, "D3");
        assert_eq!(dealers[1].zone, None);
    }

    #[test]
    fn test_import_users_requires_numeric_id() {
        let service = service();
        let csv = "ID,First_Name,Last_Name\n7,Anil,Sharma\nx9,Ravi,Kumar\n8,Sunita,\n";
        let result = service.import_users_from(csv.as_bytes()).unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(service.list_users().unwrap()[1].full_name(), "Sunita");
    }

    #[test]
    fn test_missing_required_header() {
        let service = service();
        assert!(service.import_dealers_from("code,name\n1,a\n".as_bytes()).is_err());
    }
}
