//! Read-only mirrors of provider records, as the portal uses them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// A QuickBooks invoice.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub doc_number: Option<String>,
    pub txn_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total_amount: f64,
    pub balance: f64,
    pub customer_ref: CustomerRef,
    /// Sales item lines only; subtotal and discount lines are dropped
    pub line_items: Vec<LineItem>,
    pub customer_memo: Option<String>,
    pub email_status: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CustomerRef {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub amount: f64,
}

/// A QuickBooks customer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
}

/// A contact-form email pulled from Gmail.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryMessage {
    pub id: String,
    pub thread_id: String,
    pub date: Option<DateTime<Utc>>,
    pub from_address: String,
    pub subject: String,
    pub body: String,
    pub snippet: String,
    pub parsed_fields: ParsedFields,
    pub read_state: ReadState,
}

/// Labelled values extracted from the contact-form body. Any may be missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ParsedFields {
    pub customer_name: Option<String>,
    pub contact_info: Option<String>,
    pub reason: Option<String>,
    pub preferred_response: Option<String>,
    pub message: Option<String>,
}

impl ParsedFields {
    pub fn is_empty(&self) -> bool {
        self == &ParsedFields::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadState {
    Unread,
    Read,
}

impl ReadState {
    /// Status label shown in the admin inbox
    pub fn status_label(&self) -> &'static str {
        match self {
            ReadState::Unread => "new",
            ReadState::Read => "read",
        }
    }
}
