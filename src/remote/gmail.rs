//! Gmail API v1, scoped to the authorized mailbox (`users/me`).

use super::RemoteClient;
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::Integration;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const UNREAD_LABEL: &str = "UNREAD";

/// Response of `messages.list`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
}

/// Full message (`format=full`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    pub payload: Option<MessagePart>,
}

impl GmailMessage {
    pub fn is_unread(&self) -> bool {
        self.label_ids.iter().any(|l| l == UNREAD_LABEL)
    }

    /// First header with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// MIME part tree.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartBody {
    /// base64url-encoded content
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Mailbox profile, used as a connection probe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email_address: String,
    pub messages_total: Option<u64>,
}

/// Typed Gmail calls on top of [`RemoteClient`].
#[derive(Clone)]
pub struct GmailClient {
    remote: Arc<RemoteClient>,
}

impl GmailClient {
    pub fn new(remote: Arc<RemoteClient>) -> Self {
        Self { remote }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> IntegrationResult<T> {
        let value = self
            .remote
            .request(Integration::Gmail, method, endpoint, body)
            .await?;

        serde_json::from_value(value).map_err(|e| {
            IntegrationError::remote(
                Integration::Gmail,
                None,
                format!("unexpected response for {}: {}", endpoint, e),
            )
        })
    }

    /// Search the mailbox. Results keep Gmail's order (newest first).
    pub async fn list_messages(&self, query: &str, max_results: u32) -> IntegrationResult<Vec<MessageRef>> {
        let max_results = max_results.to_string();
        let params = serde_urlencoded::to_string([("q", query), ("maxResults", max_results.as_str())])
            .map_err(|e| {
                IntegrationError::remote(Integration::Gmail, None, format!("invalid search query: {}", e))
            })?;

        let list: MessageList = self
            .call(Method::GET, &format!("messages?{}", params), None)
            .await?;
        Ok(list.messages)
    }

    pub async fn get_message(&self, id: &str) -> IntegrationResult<GmailMessage> {
        self.call(
            Method::GET,
            &format!("messages/{}?format=full", urlencoding::encode(id)),
            None,
        )
        .await
    }

    /// Remove the `UNREAD` label.
    pub async fn mark_as_read(&self, id: &str) -> IntegrationResult<()> {
        let body = json!({ "removeLabelIds": [UNREAD_LABEL] });
        self.remote
            .request(
                Integration::Gmail,
                Method::POST,
                &format!("messages/{}/modify", urlencoding::encode(id)),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    pub async fn profile(&self) -> IntegrationResult<Profile> {
        self.call(Method::GET, "profile", None).await
    }
}
