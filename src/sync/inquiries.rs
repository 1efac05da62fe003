//! Customer inquiries: contact-form emails delivered to the shop's Gmail.

use crate::error::{IntegrationError, IntegrationResult};
use crate::models::{InquiryMessage, ParsedFields, ReadState};
use crate::remote::gmail::{GmailMessage, MessagePart};
use crate::remote::GmailClient;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

/// Gmail search selecting contact-form submissions.
pub const INQUIRY_SEARCH: &str = r#"subject:"Customer Inquiry""#;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InquiryFilter {
    #[default]
    All,
    Unread,
}

impl InquiryFilter {
    pub fn search_query(&self) -> String {
        match self {
            InquiryFilter::All => INQUIRY_SEARCH.to_string(),
            InquiryFilter::Unread => format!("{} is:unread", INQUIRY_SEARCH),
        }
    }
}

static FULL_NAME: Lazy<Regex> = Lazy::new(|| label_pattern("full name"));
static NAME: Lazy<Regex> = Lazy::new(|| label_pattern("name"));
static CONTACT_INFO: Lazy<Regex> = Lazy::new(|| label_pattern("contact info"));
static EMAIL: Lazy<Regex> = Lazy::new(|| label_pattern("email"));
static REASON: Lazy<Regex> = Lazy::new(|| label_pattern("reason for inquiry"));
static PREFERRED_RESPONSE: Lazy<Regex> = Lazy::new(|| label_pattern("preferred response"));
// Message runs to the end of the body
static MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ims)^[ \t]*message:[ \t]*(.+)").expect("MESSAGE pattern is valid")
});
static DATE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("DATE_COMMENT pattern is valid"));

/// `Label: value` at the start of a line, value on the same line.
fn label_pattern(label: &str) -> Regex {
    Regex::new(&format!(r"(?im)^[ \t]*{}:[ \t]*(.+)$", regex::escape(label)))
        .expect("label pattern is valid")
}

fn capture(pattern: &Regex, body: &str) -> Option<String> {
    pattern
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Extract the labelled contact-form fields. Missing labels stay `None`.
pub fn parse_inquiry_fields(body: &str) -> ParsedFields {
    ParsedFields {
        customer_name: capture(&FULL_NAME, body).or_else(|| capture(&NAME, body)),
        contact_info: capture(&CONTACT_INFO, body).or_else(|| capture(&EMAIL, body)),
        reason: capture(&REASON, body),
        preferred_response: capture(&PREFERRED_RESPONSE, body),
        message: capture(&MESSAGE, body),
    }
}

/// Decode Gmail's base64url, with or without padding. Invalid UTF-8 is replaced.
fn decode_base64url(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data.trim().trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Text of the message: the part's own body, else the first `text/plain`
/// part found depth-first.
fn extract_body(part: &MessagePart) -> Option<String> {
    if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
        if let Some(text) = decode_base64url(data) {
            return Some(text);
        }
    }

    for child in &part.parts {
        if child.mime_type.eq_ignore_ascii_case("text/plain") {
            if let Some(text) = child
                .body
                .as_ref()
                .and_then(|b| b.data.as_deref())
                .and_then(decode_base64url)
            {
                return Some(text);
            }
        }
    }

    part.parts
        .iter()
        .filter(|child| child.mime_type.starts_with("multipart/"))
        .find_map(extract_body)
}

/// RFC 2822 `Date` header, tolerating a trailing `(UTC)` style comment.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = DATE_COMMENT.replace(value.trim(), "");
    DateTime::parse_from_rfc2822(&cleaned)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Flatten a Gmail message into an inquiry.
pub fn inquiry_from_message(message: GmailMessage) -> InquiryMessage {
    let body = message
        .payload
        .as_ref()
        .and_then(extract_body)
        .unwrap_or_default();

    let read_state = if message.is_unread() {
        ReadState::Unread
    } else {
        ReadState::Read
    };

    InquiryMessage {
        date: message.header("Date").and_then(parse_date),
        from_address: message.header("From").unwrap_or_default().to_string(),
        subject: message.header("Subject").unwrap_or_default().to_string(),
        parsed_fields: parse_inquiry_fields(&body),
        body,
        read_state,
        id: message.id,
        thread_id: message.thread_id,
        snippet: message.snippet,
    }
}

pub struct InquiryService {
    gmail: GmailClient,
}

impl InquiryService {
    pub fn new(gmail: GmailClient) -> Self {
        Self { gmail }
    }

    /// Search, then fetch each message in search order.
    ///
    /// A message that fails to load is skipped; authentication and
    /// configuration failures abort the whole fetch.
    pub async fn fetch_inquiries(
        &self,
        max_results: u32,
        filter: InquiryFilter,
    ) -> IntegrationResult<Vec<InquiryMessage>> {
        let refs = self
            .gmail
            .list_messages(&filter.search_query(), max_results)
            .await?;
        debug!(count = refs.len(), filter = ?filter, "Inquiry search complete");

        let mut inquiries = Vec::with_capacity(refs.len());
        for message_ref in refs {
            match self.gmail.get_message(&message_ref.id).await {
                Ok(message) => {
                    let inquiry = inquiry_from_message(message);
                    if inquiry.parsed_fields.is_empty() {
                        debug!(message_id = %inquiry.id, "Inquiry body has no recognised fields");
                    }
                    inquiries.push(inquiry);
                }
                Err(e @ IntegrationError::RemoteRequestFailed { .. }) => {
                    warn!(message_id = %message_ref.id, error = %e, "Skipping inquiry that failed to load");
                }
                Err(e) => return Err(e),
            }
        }

        info!(count = inquiries.len(), filter = ?filter, "Inquiries fetched");
        Ok(inquiries)
    }

    pub async fn fetch_unread_inquiries(&self, max_results: u32) -> IntegrationResult<Vec<InquiryMessage>> {
        self.fetch_inquiries(max_results, InquiryFilter::Unread).await
    }

    pub async fn mark_inquiry_read(&self, id: &str) -> IntegrationResult<()> {
        self.gmail.mark_as_read(id).await?;
        info!(message_id = %id, "Inquiry marked as read");
        Ok(())
    }
}
