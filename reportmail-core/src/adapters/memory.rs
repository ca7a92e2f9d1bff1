//! In-memory mailbox for tests and dry runs
//!
//! Holds scripted messages, records every gateway call, and can be told
//! to fail specific operations.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::result::{Error, Result};
use crate::domain::{MailAttachment, MailMessage};
use crate::ports::MailboxGateway;

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxCall {
    ListUnread,
    GetAttachments(String),
    MarkAsRead(String),
    MoveMail { message_id: String, folder: String },
}

#[derive(Debug, Default)]
struct State {
    messages: Vec<(MailMessage, Vec<MailAttachment>)>,
    read: HashSet<String>,
    folders: HashMap<String, String>,
    calls: Vec<MailboxCall>,
    fail_list: usize,
    fail_attachments: HashSet<String>,
    fail_mark: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryMailbox {
    state: Mutex<State>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::Other(format!("Lock poisoned: {}", e)))
    }

    /// Add an unread message with the given attachments
    pub fn deliver(&self, id: &str, subject: &str, from: &str, attachments: Vec<MailAttachment>) {
        if let Ok(mut state) = self.state() {
            let message = MailMessage {
                id: id.to_string(),
                subject: subject.to_string(),
                from: from.to_string(),
                attachments: attachments.iter().map(|a| a.name.clone()).collect(),
            };
            state.messages.push((message, attachments));
        }
    }

    /// Make the next `times` listing calls fail
    pub fn fail_next_list(&self, times: usize) {
        if let Ok(mut state) = self.state() {
            state.fail_list = times;
        }
    }

    pub fn fail_attachments_for(&self, message_id: &str) {
        if let Ok(mut state) = self.state() {
            state.fail_attachments.insert(message_id.to_string());
        }
    }

    pub fn fail_mark_for(&self, message_id: &str) {
        if let Ok(mut state) = self.state() {
            state.fail_mark.insert(message_id.to_string());
        }
    }

    /// Clear all injected failures
    pub fn heal(&self) {
        if let Ok(mut state) = self.state() {
            state.fail_list = 0;
            state.fail_attachments.clear();
            state.fail_mark.clear();
        }
    }

    pub fn calls(&self) -> Vec<MailboxCall> {
        self.state().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn is_read(&self, message_id: &str) -> bool {
        self.state().map(|s| s.read.contains(message_id)).unwrap_or(false)
    }

    /// Folder the message was moved to, if any
    pub fn folder_of(&self, message_id: &str) -> Option<String> {
        self.state().ok().and_then(|s| s.folders.get(message_id).cloned())
    }
}

#[async_trait]
impl MailboxGateway for InMemoryMailbox {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_unread_with_attachments(&self) -> Result<Vec<MailMessage>> {
        let mut state = self.state()?;
        state.calls.push(MailboxCall::ListUnread);
        if state.fail_list > 0 {
            state.fail_list -= 1;
            return Err(Error::mailbox("injected listing failure"));
        }
        Ok(state
            .messages
            .iter()
            .filter(|(m, _)| !state.read.contains(&m.id) && !state.folders.contains_key(&m.id))
            .filter(|(m, _)| !m.attachments.is_empty())
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn get_attachments(&self, message_id: &str) -> Result<Vec<MailAttachment>> {
        let mut state = self.state()?;
        state.calls.push(MailboxCall::GetAttachments(message_id.to_string()));
        if state.fail_attachments.contains(message_id) {
            return Err(Error::mailbox(format!("injected attachment failure for '{}'", message_id)));
        }
        state
            .messages
            .iter()
            .find(|(m, _)| m.id == message_id)
            .map(|(_, a)| a.clone())
            .ok_or_else(|| Error::not_found(format!("message '{}'", message_id)))
    }

    async fn mark_as_read(&self, message_id: &str) -> Result<()> {
        let mut state = self.state()?;
        state.calls.push(MailboxCall::MarkAsRead(message_id.to_string()));
        if state.fail_mark.contains(message_id) {
            return Err(Error::mailbox(format!("injected mark failure for '{}'", message_id)));
        }
        state.read.insert(message_id.to_string());
        Ok(())
    }

    async fn move_mail(&self, message_id: &str, destination_folder_id: &str) -> Result<()> {
        let mut state = self.state()?;
        state.calls.push(MailboxCall::MoveMail {
            message_id: message_id.to_string(),
            folder: destination_folder_id.to_string(),
        });
        state
            .folders
            .insert(message_id.to_string(), destination_folder_id.to_string());
        Ok(())
    }
}
