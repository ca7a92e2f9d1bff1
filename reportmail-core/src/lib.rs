//! Reportmail Core - ingestion of spreadsheet reports from a shared mailbox
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (grids, report types, records, directory entries)
//! - **ports**: Trait definitions for external dependencies (Repository, MailboxGateway, Clock)
//! - **services**: Extraction, classification, transformation, upsert and scheduling
//! - **adapters**: Concrete implementations (DuckDB, Graph, `.eml` directory, in-memory)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;
pub mod log_migrations;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbRepository;
use adapters::graph::{GraphMailbox, GRAPH_TOKEN_ENV};
use adapters::maildir::MaildirMailbox;
use config::{Config, MailboxConfig};
use ports::{Clock, MailboxGateway, SystemClock};
use services::*;

// Re-export commonly used types at crate root
pub use domain::{ClassifiedSheet, Institution, RawGrid, RecordBatch, RecordKind, ReportType};
pub use domain::result::Error;
pub use services::{EntryPoint, LogEntry, LogEvent, LoggingService};

pub const DB_FILENAME: &str = "reportmail.duckdb";

/// Main context for reportmail operations
///
/// Holds the configuration, the database and the services built on it.
pub struct ReportmailContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub repository: Arc<DuckDbRepository>,
    pub ingest_service: Arc<IngestService>,
    pub status_service: StatusService,
    pub directory_service: DirectoryService,
}

impl ReportmailContext {
    /// Open the data directory, run migrations and wire the services
    pub fn new(data_dir: &Path, event_log: Option<Arc<LoggingService>>) -> Result<Self> {
        let config = Config::load(data_dir)?;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(DB_FILENAME))?);
        repository.ensure_schema()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut ingest_service = IngestService::new(
            repository.clone(),
            repository.clone(),
            clock,
            config.cache_ttl(),
        )
        .with_processed_folder(config.processed_folder_id.clone());
        if let Some(log) = event_log {
            ingest_service = ingest_service.with_event_log(log);
        }

        Ok(Self {
            status_service: StatusService::new(Arc::clone(&repository)),
            directory_service: DirectoryService::new(Arc::clone(&repository)),
            ingest_service: Arc::new(ingest_service),
            repository,
            data_dir: data_dir.to_path_buf(),
            config,
        })
    }

    /// Build the configured mailbox gateway
    pub fn mailbox(&self) -> Result<Arc<dyn MailboxGateway>> {
        match &self.config.mailbox {
            Some(MailboxConfig::Maildir { path }) => Ok(Arc::new(MaildirMailbox::open(path)?)),
            Some(MailboxConfig::Graph { mailbox, base_url }) => {
                let token = std::env::var(GRAPH_TOKEN_ENV).unwrap_or_default();
                Ok(Arc::new(GraphMailbox::new_with_base_url(mailbox, &token, base_url)?))
            }
            None => anyhow::bail!(
                "No mailbox configured. Add a \"mailbox\" entry to {}",
                self.data_dir.join(config::SETTINGS_FILE).display()
            ),
        }
    }

    /// Scheduler polling the configured mailbox
    pub fn scheduler(&self) -> Result<Scheduler> {
        let cycle = MailboxCycle::new(Arc::clone(&self.ingest_service), self.mailbox()?);
        Ok(Scheduler::new(Arc::new(cycle), self.config.scheduler_config()))
    }
}
