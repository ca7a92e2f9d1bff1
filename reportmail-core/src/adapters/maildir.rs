//! Local `.eml` directory mailbox
//!
//! Layout under the root directory:
//! - `new/`      unread messages, one `<id>.eml` file each
//! - `cur/`      messages marked read
//! - `<folder>/` messages moved to a named folder
//!
//! The message id is the file stem. Every operation is safe to repeat.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use tracing::{debug, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{MailAttachment, MailMessage};
use crate::ports::MailboxGateway;

const UNREAD_DIR: &str = "new";
const READ_DIR: &str = "cur";
const EXTENSION: &str = "eml";

/// A decoded attachment part
struct AttachmentPart {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

fn attachment_name(part: &ParsedMail) -> Option<String> {
    let disposition = part.get_content_disposition();
    let name = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    match disposition.disposition {
        DispositionType::Attachment => name.or_else(|| Some("attachment".to_string())),
        _ => name,
    }
}

fn collect_attachments(part: &ParsedMail, out: &mut Vec<AttachmentPart>) -> Result<()> {
    if part.subparts.is_empty() {
        if let Some(name) = attachment_name(part) {
            let bytes = part
                .get_body_raw()
                .map_err(|e| Error::mailbox(format!("failed to decode attachment '{}': {}", name, e)))?;
            out.push(AttachmentPart {
                name,
                content_type: part.ctype.mimetype.clone(),
                bytes,
            });
        }
        return Ok(());
    }
    for sub in &part.subparts {
        collect_attachments(sub, out)?;
    }
    Ok(())
}

pub struct MaildirMailbox {
    root: PathBuf,
}

impl MaildirMailbox {
    /// Open a mailbox rooted at `root`, creating `new/` and `cur/`
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root.join(UNREAD_DIR))?;
        std::fs::create_dir_all(root.join(READ_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn message_path(&self, folder: &str, message_id: &str) -> PathBuf {
        self.root.join(folder).join(format!("{}.{}", message_id, EXTENSION))
    }

    fn check_id(message_id: &str) -> Result<()> {
        if message_id.is_empty() || message_id.contains(['/', '\\']) || message_id.starts_with('.') {
            return Err(Error::validation(format!("invalid message id '{}'", message_id)));
        }
        Ok(())
    }

    /// Current location of a message, searching unread first
    async fn locate(&self, message_id: &str) -> Result<Option<PathBuf>> {
        Self::check_id(message_id)?;
        for folder in [UNREAD_DIR, READ_DIR] {
            let path = self.message_path(folder, message_id);
            if tokio::fs::try_exists(&path).await? {
                return Ok(Some(path));
            }
        }

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path().join(format!("{}.{}", message_id, EXTENSION));
            if tokio::fs::try_exists(&path).await? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    async fn read_message(path: &Path) -> Result<(MailMessage, Vec<AttachmentPart>)> {
        let bytes = tokio::fs::read(path).await?;
        let mail = parse_mail(&bytes)
            .map_err(|e| Error::mailbox(format!("failed to parse {}: {}", path.display(), e)))?;

        let mut attachments = Vec::new();
        collect_attachments(&mail, &mut attachments)?;

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let message = MailMessage {
            id,
            subject: mail.headers.get_first_value("Subject").unwrap_or_default(),
            from: mail.headers.get_first_value("From").unwrap_or_default(),
            attachments: attachments.iter().map(|a| a.name.clone()).collect(),
        };
        Ok((message, attachments))
    }
}

#[async_trait]
impl MailboxGateway for MaildirMailbox {
    fn name(&self) -> &str {
        "maildir"
    }

    async fn list_unread_with_attachments(&self) -> Result<Vec<MailMessage>> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(self.root.join(UNREAD_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut messages = Vec::new();
        for path in paths {
            match Self::read_message(&path).await {
                Ok((message, _)) if !message.attachments.is_empty() => messages.push(message),
                Ok(_) => debug!(path = %path.display(), "Unread message has no attachments"),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unparsable message"),
            }
        }
        Ok(messages)
    }

    async fn get_attachments(&self, message_id: &str) -> Result<Vec<MailAttachment>> {
        let path = self
            .locate(message_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("message '{}'", message_id)))?;
        let (_, attachments) = Self::read_message(&path).await?;
        Ok(attachments
            .into_iter()
            .map(|a| MailAttachment::from_bytes(a.name, &a.bytes, Some(&a.content_type)))
            .collect())
    }

    async fn mark_as_read(&self, message_id: &str) -> Result<()> {
        Self::check_id(message_id)?;
        let unread = self.message_path(UNREAD_DIR, message_id);
        if tokio::fs::try_exists(&unread).await? {
            tokio::fs::rename(&unread, self.message_path(READ_DIR, message_id)).await?;
            return Ok(());
        }
        match self.locate(message_id).await? {
            Some(_) => Ok(()),
            None => Err(Error::not_found(format!("message '{}'", message_id))),
        }
    }

    async fn move_mail(&self, message_id: &str, destination_folder_id: &str) -> Result<()> {
        Self::check_id(destination_folder_id)?;
        let destination = self.message_path(destination_folder_id, message_id);
        let current = self
            .locate(message_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("message '{}'", message_id)))?;
        if current == destination {
            return Ok(());
        }
        tokio::fs::create_dir_all(self.root.join(destination_folder_id)).await?;
        tokio::fs::rename(&current, &destination).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use tempfile::TempDir;

    fn eml(subject: &str, attachment: Option<(&str, &[u8])>) -> String {
        let mut out = format!(
            "From: Reports <reports@example.com>\r\nTo: ops@example.com\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: multipart/mixed; boundary=\"XYZ\"\r\n\r\n--XYZ\r\nContent-Type: text/plain\r\n\r\nSee attached.\r\n",
            subject
        );
        if let Some((name, bytes)) = attachment {
            out.push_str(&format!(
                "--XYZ\r\nContent-Type: application/octet-stream; name=\"{0}\"\r\nContent-Disposition: attachment; filename=\"{0}\"\r\nContent-Transfer-Encoding: base64\r\n\r\n{1}\r\n",
                name,
                STANDARD.encode(bytes)
            ));
        }
        out.push_str("--XYZ--\r\n");
        out
    }

    fn mailbox() -> (TempDir, MaildirMailbox) {
        let dir = TempDir::new().unwrap();
        let mailbox = MaildirMailbox::open(dir.path()).unwrap();
        std::fs::write(
            dir.path().join("new/001.eml"),
            eml("JSB Outstanding", Some(("aging.xlsx", b"PK\x03\x04"))),
        )
        .unwrap();
        std::fs::write(dir.path().join("new/002.eml"), eml("No attachment", None)).unwrap();
        (dir, mailbox)
    }

    #[tokio::test]
    async fn test_lists_unread_with_attachments() {
        let (_dir, mailbox) = mailbox();
        let messages = mailbox.list_unread_with_attachments().await.unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "001");
        assert_eq!(messages[0].subject, "JSB Outstanding");
        assert_eq!(messages[0].attachments, vec!["aging.xlsx".to_string()]);

        let attachments = mailbox.get_attachments("001").await.unwrap();
        assert_eq!(attachments[0].decode().unwrap(), b"PK\x03\x04");
    }

    #[tokio::test]
    async fn test_mark_and_move_are_idempotent() {
        let (dir, mailbox) = mailbox();

        mailbox.mark_as_read("001").await.unwrap();
        mailbox.mark_as_read("001").await.unwrap();
        assert!(dir.path().join("cur/001.eml").exists());
        assert!(mailbox.list_unread_with_attachments().await.unwrap().is_empty());

        mailbox.move_mail("001", "processed").await.unwrap();
        mailbox.move_mail("001", "processed").await.unwrap();
        mailbox.mark_as_read("001").await.unwrap();
        assert!(dir.path().join("processed/001.eml").exists());
        assert_eq!(mailbox.get_attachments("001").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_message_is_not_found() {
        let (_dir, mailbox) = mailbox();
        assert!(matches!(
            mailbox.mark_as_read("999").await,
            Err(Error::NotFound(_))
        ));
        assert!(mailbox.get_attachments("../escape").await.is_err());
    }
}
