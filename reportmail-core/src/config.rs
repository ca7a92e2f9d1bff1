//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "processedFolderId": "AAMkAD...",
//!   "idlePollSecs": 15,
//!   "errorBackoffSecs": 30,
//!   "cacheTtlSecs": 300,
//!   "mailbox": { "kind": "maildir", "path": "/var/mail/reports" }
//! }
//! ```
//! Every scalar can be overridden from the environment. Keys this crate
//! does not know are preserved when saving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::adapters::graph::GRAPH_BASE_URL;
use crate::services::scheduler::{SchedulerConfig, DEFAULT_ERROR_BACKOFF, DEFAULT_IDLE_INTERVAL};

pub const SETTINGS_FILE: &str = "settings.json";

pub const ENV_PROCESSED_FOLDER: &str = "REPORTMAIL_PROCESSED_FOLDER";
pub const ENV_IDLE_POLL_SECS: &str = "REPORTMAIL_IDLE_POLL_SECS";
pub const ENV_ERROR_BACKOFF_SECS: &str = "REPORTMAIL_ERROR_BACKOFF_SECS";
pub const ENV_CACHE_TTL_SECS: &str = "REPORTMAIL_CACHE_TTL_SECS";

const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const MIN_INTERVAL_SECS: u64 = 1;

fn default_graph_base_url() -> String {
    GRAPH_BASE_URL.to_string()
}

/// Where unread report mail is read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MailboxConfig {
    /// Local `.eml` directory with new/ and cur/ subfolders
    Maildir { path: PathBuf },
    /// Shared mailbox over Microsoft Graph
    Graph {
        mailbox: String,
        #[serde(rename = "baseUrl", default = "default_graph_base_url")]
        base_url: String,
    },
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processed_folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    idle_poll_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_backoff_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mailbox: Option<MailboxConfig>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Effective configuration (settings file plus environment overrides)
#[derive(Debug, Clone)]
pub struct Config {
    pub processed_folder_id: Option<String>,
    pub idle_poll_secs: u64,
    pub error_backoff_secs: u64,
    pub cache_ttl_secs: u64,
    pub mailbox: Option<MailboxConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            processed_folder_id: None,
            idle_poll_secs: DEFAULT_IDLE_INTERVAL.as_secs(),
            error_backoff_secs: DEFAULT_ERROR_BACKOFF.as_secs(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            mailbox: None,
        }
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

/// Numeric override; unparsable values are ignored
fn env_secs(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    env(key).and_then(|v| v.trim().parse::<u64>().ok())
}

impl Config {
    /// Load config from the data directory, applying process environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with_env(data_dir, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = read_settings(&data_dir.join(SETTINGS_FILE))?;
        let defaults = Config::default();

        let processed_folder_id = env(ENV_PROCESSED_FOLDER)
            .or(raw.processed_folder_id)
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());

        Ok(Self {
            processed_folder_id,
            idle_poll_secs: env_secs(&env, ENV_IDLE_POLL_SECS)
                .or(raw.idle_poll_secs)
                .unwrap_or(defaults.idle_poll_secs),
            error_backoff_secs: env_secs(&env, ENV_ERROR_BACKOFF_SECS)
                .or(raw.error_backoff_secs)
                .unwrap_or(defaults.error_backoff_secs),
            cache_ttl_secs: env_secs(&env, ENV_CACHE_TTL_SECS)
                .or(raw.cache_ttl_secs)
                .unwrap_or(defaults.cache_ttl_secs),
            mailbox: raw.mailbox,
        })
    }

    /// Save config to the data directory
    /// Preserves other settings that this crate doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join(SETTINGS_FILE);
        let mut settings = read_settings(&settings_path)?;

        settings.processed_folder_id = self.processed_folder_id.clone();
        settings.idle_poll_secs = Some(self.idle_poll_secs);
        settings.error_backoff_secs = Some(self.error_backoff_secs);
        settings.cache_ttl_secs = Some(self.cache_ttl_secs);
        settings.mailbox = self.mailbox.clone();

        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Cache TTL, the default when the configured value is not representable
    pub fn cache_ttl(&self) -> chrono::Duration {
        i64::try_from(self.cache_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_CACHE_TTL_SECS as i64))
    }

    /// Scheduler intervals, never shorter than one second
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            idle_interval: Duration::from_secs(self.idle_poll_secs.max(MIN_INTERVAL_SECS)),
            error_backoff: Duration::from_secs(self.error_backoff_secs.max(MIN_INTERVAL_SECS)),
        }
    }
}
