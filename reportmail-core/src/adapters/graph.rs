//! Microsoft Graph mailbox client
//!
//! Talks to the Graph mail REST surface for one shared mailbox. Token
//! acquisition is not handled here: the caller supplies a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::domain::result::{Error, Result};
use crate::domain::{MailAttachment, MailMessage};
use crate::ports::MailboxGateway;

pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Environment variable holding the bearer token
pub const GRAPH_TOKEN_ENV: &str = "REPORTMAIL_GRAPH_TOKEN";

const UNREAD_FILTER: &str = "isRead eq false and hasAttachments eq true";
const PAGE_SIZE: &str = "50";
const FILE_ATTACHMENT_TYPE: &str = "#microsoft.graph.fileAttachment";

#[derive(Debug, Deserialize)]
struct Page<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<GraphRecipient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: GraphEmailAddress,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment {
    #[serde(rename = "@odata.type", default)]
    odata_type: Option<String>,
    name: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    content_bytes: Option<String>,
}

#[derive(Debug)]
pub struct GraphMailbox {
    client: Client,
    base_url: Url,
    mailbox: String,
    token: String,
}

impl GraphMailbox {
    pub fn new(mailbox: &str, token: &str) -> Result<Self> {
        Self::new_with_base_url(mailbox, token, GRAPH_BASE_URL)
    }

    pub fn new_with_base_url(mailbox: &str, token: &str, base_url: &str) -> Result<Self> {
        if mailbox.trim().is_empty() {
            return Err(Error::Config("Graph mailbox address cannot be empty".into()));
        }
        if token.trim().is_empty() {
            return Err(Error::Config(format!("Graph access token missing (set {})", GRAPH_TOKEN_ENV)));
        }
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid Graph base URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::mailbox(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            mailbox: mailbox.trim().to_string(),
            token: token.trim().to_string(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Graph base URL '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["users", self.mailbox.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::mailbox("Graph request timed out after 120 seconds")
        } else if error.is_connect() {
            Error::mailbox("Unable to connect to Graph")
        } else {
            Error::mailbox(format!("Graph request failed: {}", error))
        }
    }

    /// Map non-success statuses to mailbox errors
    fn check_response_status(&self, response: &Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match status.as_u16() {
            401 => Err(Error::mailbox("Graph authentication failed, the access token may have expired")),
            403 => Err(Error::mailbox("Graph access denied for this mailbox")),
            404 => Err(Error::not_found("Graph resource not found")),
            429 => Err(Error::mailbox("Graph rate limit exceeded")),
            code => Err(Error::mailbox(format!("Graph API error: HTTP {}", code))),
        }
    }

    async fn get_page<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<Page<T>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;
        self.check_response_status(&response)?;
        response
            .json()
            .await
            .map_err(|e| Error::mailbox(format!("Failed to parse Graph response: {}", e)))
    }

    async fn get_all<T: for<'de> Deserialize<'de>>(&self, first: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let page: Page<T> = self.get_page(url).await?;
            items.extend(page.value);
            if let Some(link) = page.next_link {
                next = Some(Url::parse(&link).map_err(|e| Error::mailbox(format!("Bad Graph nextLink: {}", e)))?);
            }
        }
        Ok(items)
    }

    /// Send a write request; 404 means the message is already gone
    async fn send_idempotent(&self, request: reqwest::RequestBuilder, message_id: &str) -> Result<()> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(message_id, "Message no longer in the folder, treating as done");
            return Ok(());
        }
        self.check_response_status(&response)
    }
}

#[async_trait]
impl MailboxGateway for GraphMailbox {
    fn name(&self) -> &str {
        "graph"
    }

    async fn list_unread_with_attachments(&self) -> Result<Vec<MailMessage>> {
        let mut url = self.url(&["mailFolders", "inbox", "messages"])?;
        url.query_pairs_mut()
            .append_pair("$filter", UNREAD_FILTER)
            .append_pair("$select", "id,subject,from,hasAttachments")
            .append_pair("$top", PAGE_SIZE);

        let messages: Vec<GraphMessage> = self.get_all(url).await?;
        Ok(messages
            .into_iter()
            .map(|m| MailMessage {
                id: m.id,
                subject: m.subject.unwrap_or_default(),
                from: m
                    .from
                    .and_then(|f| f.email_address.address)
                    .unwrap_or_default(),
                attachments: Vec::new(),
            })
            .collect())
    }

    async fn get_attachments(&self, message_id: &str) -> Result<Vec<MailAttachment>> {
        let url = self.url(&["messages", message_id, "attachments"])?;
        let attachments: Vec<GraphAttachment> = self.get_all(url).await?;

        // item and reference attachments carry no inline bytes
        Ok(attachments
            .into_iter()
            .filter(|a| a.odata_type.as_deref().map_or(true, |t| t == FILE_ATTACHMENT_TYPE))
            .filter_map(|a| {
                Some(MailAttachment {
                    content_bytes: a.content_bytes?,
                    name: a.name,
                    content_type: a.content_type,
                })
            })
            .collect())
    }

    async fn mark_as_read(&self, message_id: &str) -> Result<()> {
        let url = self.url(&["messages", message_id])?;
        self.send_idempotent(self.client.patch(url).json(&json!({ "isRead": true })), message_id)
            .await
    }

    async fn move_mail(&self, message_id: &str, destination_folder_id: &str) -> Result<()> {
        let url = self.url(&["messages", message_id, "move"])?;
        self.send_idempotent(
            self.client
                .post(url)
                .json(&json!({ "destinationId": destination_folder_id })),
            message_id,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::graph_mock::{MockGraphConfig, MockGraphServer, MockMessage};

    fn server() -> MockGraphServer {
        MockGraphServer::start(MockGraphConfig {
            messages: vec![
                MockMessage::new("AAMk-1", "JSB outstanding", "a.xlsx"),
                MockMessage::new("AAMk-2", "PJP", "b.xlsx"),
            ],
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_and_fetch_attachments() {
        let server = server();
        let mailbox = GraphMailbox::new_with_base_url("ops@example.com", "test_token", &server.base_url()).unwrap();

        let messages = mailbox.list_unread_with_attachments().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].subject, "JSB outstanding");
        assert_eq!(messages[0].from, "reports@example.com");

        let attachments = mailbox.get_attachments("AAMk-1").await.unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].name, "a.xlsx");
        assert_eq!(attachments[0].decode().unwrap(), b"PK");
    }

    #[tokio::test]
    async fn test_mark_and_move_are_idempotent() {
        let server = server();
        let mailbox = GraphMailbox::new_with_base_url("ops@example.com", "test_token", &server.base_url()).unwrap();

        mailbox.mark_as_read("AAMk-1").await.unwrap();
        mailbox.mark_as_read("AAMk-1").await.unwrap();
        mailbox.move_mail("AAMk-1", "processed").await.unwrap();
        // second move: message is gone from the source folder
        mailbox.move_mail("AAMk-1", "processed").await.unwrap();

        let unread = mailbox.list_unread_with_attachments().await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "AAMk-2");
    }

    #[tokio::test]
    async fn test_auth_failure_is_mailbox_error() {
        let server = MockGraphServer::start(MockGraphConfig {
            fail_auth: true,
            ..Default::default()
        })
        .unwrap();
        let mailbox = GraphMailbox::new_with_base_url("ops@example.com", "test_token", &server.base_url()).unwrap();

        let err = mailbox.list_unread_with_attachments().await.unwrap_err();
        assert!(matches!(err, Error::Mailbox(_)));
    }

    #[test]
    fn test_missing_token_is_config_error() {
        assert!(matches!(
            GraphMailbox::new("ops@example.com", " "),
            Err(Error::Config(_))
        ));
    }
}
