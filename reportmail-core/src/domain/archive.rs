//! Raw archive record for files nothing could be classified in

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A file stored verbatim because no worksheet in it was recognised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub file_name: String,
    /// Extracted grids keyed by sheet name
    pub payload: JsonValue,
    /// Hex SHA-256 of the original file bytes
    pub content_hash: String,
    pub processed: bool,
}
