use super::{AppError, AppState};
use crate::models::InquiryMessage;
use crate::sync::InquiryFilter;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_LIMIT: u32 = 50;
/// Gmail caps maxResults at 500
const MAX_LIMIT: u32 = 500;

#[derive(Deserialize)]
pub struct InquiryParams {
    pub limit: Option<u32>,
    #[serde(default)]
    pub unread: bool,
}

/// One inquiry as listed in the admin inbox, with display defaults filled in.
#[derive(Debug, PartialEq, Serialize)]
pub struct InquiryView {
    pub id: String,
    pub date: Option<DateTime<Utc>>,
    pub customer_name: String,
    pub contact_info: String,
    pub reason: String,
    pub preferred_response: String,
    pub message: String,
    pub subject: String,
    pub status: &'static str,
    pub from_email: String,
}

impl From<InquiryMessage> for InquiryView {
    fn from(inquiry: InquiryMessage) -> Self {
        let fields = inquiry.parsed_fields;
        Self {
            customer_name: fields.customer_name.unwrap_or_else(|| "Unknown".to_string()),
            contact_info: fields
                .contact_info
                .unwrap_or_else(|| inquiry.from_address.clone()),
            reason: fields.reason.unwrap_or_else(|| "General Inquiry".to_string()),
            preferred_response: fields
                .preferred_response
                .unwrap_or_else(|| "Email".to_string()),
            message: fields.message.unwrap_or(inquiry.snippet),
            status: inquiry.read_state.status_label(),
            id: inquiry.id,
            date: inquiry.date,
            subject: inquiry.subject,
            from_email: inquiry.from_address,
        }
    }
}

#[derive(Serialize)]
pub struct InquiryListResponse {
    pub success: bool,
    pub count: usize,
    pub inquiries: Vec<InquiryView>,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub success: bool,
}

/// GET /api/admin/inquiries?limit=50&unread=false
pub async fn list_inquiries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InquiryParams>,
) -> Result<Json<InquiryListResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let filter = if params.unread {
        InquiryFilter::Unread
    } else {
        InquiryFilter::All
    };

    let inquiries: Vec<InquiryView> = state
        .portal
        .inquiries
        .fetch_inquiries(limit, filter)
        .await?
        .into_iter()
        .map(InquiryView::from)
        .collect();

    Ok(Json(InquiryListResponse {
        success: true,
        count: inquiries.len(),
        inquiries,
    }))
}

/// POST /api/admin/inquiries/:id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MarkReadResponse>, AppError> {
    state.portal.inquiries.mark_inquiry_read(&id).await?;
    Ok(Json(MarkReadResponse { success: true }))
}
