//! CLI command implementations

pub mod directory;
pub mod ingest;
pub mod logs;
pub mod run;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use reportmail_core::{EntryPoint, LoggingService, ReportmailContext};

pub const DATA_DIR_ENV: &str = "REPORTMAIL_DIR";

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".reportmail"))
        .with_context(|| format!("Could not find home directory; set {}", DATA_DIR_ENV))
}

/// Get the event log for the given entry point
///
/// Returns None if the log fails to open (ingestion runs without it)
pub fn get_logger(entry_point: EntryPoint) -> Option<Arc<LoggingService>> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    match LoggingService::new(&data_dir, entry_point, env!("CARGO_PKG_VERSION")) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            tracing::warn!(error = %e, "Event log unavailable");
            None
        }
    }
}

/// Open the data directory and wire the services
pub fn get_context(entry_point: EntryPoint) -> Result<ReportmailContext> {
    let data_dir = get_data_dir()?;
    ReportmailContext::new(&data_dir, get_logger(entry_point))
        .context("Failed to initialize reportmail context")
}
