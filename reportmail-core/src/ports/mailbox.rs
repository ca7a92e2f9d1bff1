//! Mailbox gateway port
//!
//! Defines the interface to the shared mailbox the reports arrive in.
//! Every call is keyed by an opaque message id and must be safe to repeat
//! for the same message, since the scheduler may re-run after a crash.

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::{MailAttachment, MailMessage};

#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// Gateway name used in logs (e.g., "graph", "maildir")
    fn name(&self) -> &str;

    /// List unread messages that carry at least one attachment
    async fn list_unread_with_attachments(&self) -> Result<Vec<MailMessage>>;

    /// Fetch attachment payloads (base64 content) for a message
    async fn get_attachments(&self, message_id: &str) -> Result<Vec<MailAttachment>>;

    async fn mark_as_read(&self, message_id: &str) -> Result<()>;

    /// Relocate a message into another folder
    async fn move_mail(&self, message_id: &str, destination_folder_id: &str) -> Result<()>;
}
