//! Dealer and user directory entries

use serde::{Deserialize, Serialize};

/// Canonical dealer from the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerEntry {
    pub id: String,
    pub party_name: String,
    pub dealer_code: Option<String>,
    pub zone: Option<String>,
}

impl DealerEntry {
    pub fn new(id: impl Into<String>, party_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            party_name: party_name.into(),
            dealer_code: None,
            zone: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.dealer_code = Some(code.into());
        self
    }
}

/// Field user (TSO) from the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl UserEntry {
    pub fn new(id: i64, first_name: impl Into<String>, last_name: Option<&str>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.map(|s| s.to_string()),
        }
    }

    pub fn full_name(&self) -> String {
        match self.last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name.trim(), last),
            _ => self.first_name.trim().to_string(),
        }
    }
}
