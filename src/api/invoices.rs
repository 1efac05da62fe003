use super::{AppError, AppState};
use crate::models::{Invoice, LineItem};
use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("EMAIL_REGEX pattern is valid")
});

/// QuickBooks rejects MAXRESULTS above this
const MAX_PAGE_SIZE: u32 = 1000;
const DEFAULT_PAGE_SIZE: u32 = 100;

const LOOKUP_NOT_FOUND: &str = "Invoice not found or does not belong to this email address";

/// Request body for POST /api/invoices/lookup
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub invoice_number: Option<String>,
    pub email: Option<String>,
}

#[derive(Serialize)]
pub struct LookupResponse {
    pub success: bool,
    pub invoice: InvoiceSummary,
    pub customer: CustomerSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    pub id: String,
    pub number: Option<String>,
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub balance: f64,
    pub total: f64,
    pub payment_url: String,
    pub items: Vec<LineItem>,
}

#[derive(Serialize)]
pub struct CustomerSummary {
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize)]
pub struct InvoiceListResponse {
    pub success: bool,
    pub invoices: Vec<Invoice>,
    pub count: usize,
    pub limit: u32,
    pub offset: u32,
}

/// POST /api/invoices/lookup
///
/// Public. Returns the invoice only when it belongs to the customer with the
/// given email; every miss answers the same 404.
pub async fn lookup_invoice(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LookupRequest>,
) -> Result<Json<LookupResponse>, AppError> {
    let (Some(invoice_number), Some(email)) = (
        request.invoice_number.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        request.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
    ) else {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    };

    if !EMAIL_REGEX.is_match(&email) {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }

    debug!(invoice_number = %invoice_number, "Invoice lookup requested");

    let invoice = state
        .portal
        .invoices
        .verify_invoice_ownership(&invoice_number, &email)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                AppError::NotFound(LOOKUP_NOT_FOUND.to_string())
            } else {
                AppError::from(e)
            }
        })?;

    let payment_url = state
        .portal
        .invoices
        .payment_url(&invoice.id)
        .map_err(AppError::from)?;

    info!(invoice_id = %invoice.id, "Invoice lookup succeeded");

    Ok(Json(LookupResponse {
        success: true,
        customer: CustomerSummary {
            name: invoice.customer_ref.name.clone(),
        },
        invoice: InvoiceSummary {
            id: invoice.id,
            number: invoice.doc_number,
            date: invoice.txn_date,
            due_date: invoice.due_date,
            balance: invoice.balance,
            total: invoice.total_amount,
            payment_url,
            items: invoice.line_items,
        },
    }))
}

/// GET /api/admin/invoices?limit=100&offset=0
pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<InvoiceListResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);

    let invoices = state
        .portal
        .invoices
        .sync_all_invoices(limit, offset)
        .await
        .map_err(AppError::from)?;

    Ok(Json(InvoiceListResponse {
        success: true,
        count: invoices.len(),
        invoices,
        limit,
        offset,
    }))
}
