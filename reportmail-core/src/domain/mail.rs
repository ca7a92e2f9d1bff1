//! Mailbox message and attachment models

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

/// Unread message as listed by the mailbox gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Attachment payload; `content_bytes` is base64 as delivered by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailAttachment {
    pub name: String,
    pub content_bytes: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl MailAttachment {
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8], content_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            content_bytes: STANDARD.encode(bytes),
            content_type: content_type.map(|s| s.to_string()),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.content_bytes.trim())
            .map_err(|e| Error::validation(format!("attachment '{}' is not valid base64: {}", self.name, e)))
    }
}

/// Source metadata carried by every record produced from a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub message_id: String,
    pub file_name: String,
    pub sheet_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_decode() {
        let att = MailAttachment::from_bytes("a.xlsx", b"PK\x03\x04", None);
        assert_eq!(att.decode().unwrap(), b"PK\x03\x04");

        let bad = MailAttachment {
            name: "b.xlsx".into(),
            content_bytes: "***".into(),
            content_type: None,
        };
        assert!(bad.decode().is_err());
    }
}
