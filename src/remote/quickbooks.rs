//! QuickBooks Online Accounting API v3.

use super::RemoteClient;
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::Integration;
use crate::models::{Customer, CustomerRef, Invoice, LineItem};
use chrono::NaiveDate;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Invoice as returned by the QuickBooks API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QboInvoice {
    pub id: String,
    pub doc_number: Option<String>,
    pub txn_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_amt: f64,
    #[serde(default)]
    pub balance: f64,
    pub customer_ref: Option<QboRef>,
    #[serde(default)]
    pub line: Vec<QboLine>,
    pub customer_memo: Option<QboRef>,
    pub email_status: Option<String>,
}

/// Reference type (`{"value": "..", "name": ".."}`).
#[derive(Debug, Deserialize)]
pub struct QboRef {
    pub value: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QboLine {
    pub description: Option<String>,
    #[serde(default)]
    pub amount: f64,
    pub sales_item_line_detail: Option<QboSalesItemLineDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QboSalesItemLineDetail {
    pub qty: Option<f64>,
    pub unit_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QboCustomer {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub primary_email_addr: Option<QboEmailAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QboEmailAddress {
    pub address: Option<String>,
}

/// Subset of `CompanyInfo` shown on the settings page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CompanyInfo {
    pub company_name: String,
    pub country: Option<String>,
}

impl From<QboInvoice> for Invoice {
    fn from(qbo: QboInvoice) -> Self {
        let customer_ref = qbo
            .customer_ref
            .map(|r| CustomerRef {
                id: r.value,
                name: r.name,
            })
            .unwrap_or_default();

        let line_items = qbo
            .line
            .into_iter()
            .filter_map(|line| {
                let detail = line.sales_item_line_detail?;
                Some(LineItem {
                    description: line.description,
                    quantity: detail.qty,
                    unit_price: detail.unit_price,
                    amount: line.amount,
                })
            })
            .collect();

        Invoice {
            id: qbo.id,
            doc_number: qbo.doc_number,
            txn_date: qbo.txn_date,
            due_date: qbo.due_date,
            total_amount: qbo.total_amt,
            balance: qbo.balance,
            customer_ref,
            line_items,
            customer_memo: qbo.customer_memo.map(|m| m.value),
            email_status: qbo.email_status,
        }
    }
}

impl From<QboCustomer> for Customer {
    fn from(qbo: QboCustomer) -> Self {
        Customer {
            id: qbo.id,
            display_name: qbo.display_name,
            email: qbo.primary_email_addr.and_then(|e| e.address),
        }
    }
}

/// Escape a value for a single-quoted QuickBooks query literal.
pub fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Typed QuickBooks calls on top of [`RemoteClient`].
#[derive(Clone)]
pub struct QuickBooksClient {
    remote: Arc<RemoteClient>,
}

impl QuickBooksClient {
    pub fn new(remote: Arc<RemoteClient>) -> Self {
        Self { remote }
    }

    async fn get(&self, endpoint: &str) -> IntegrationResult<Value> {
        self.remote
            .request(Integration::QuickBooks, Method::GET, endpoint, None)
            .await
    }

    /// Run a query and return the rows of `entity` (empty when none matched).
    async fn query<T: DeserializeOwned>(&self, entity: &str, query: &str) -> IntegrationResult<Vec<T>> {
        debug!(query = %query, "QuickBooks query");
        let endpoint = format!("query?query={}", urlencoding::encode(query));
        let mut response = self.get(&endpoint).await?;

        match response
            .get_mut("QueryResponse")
            .and_then(|r| r.get_mut(entity))
            .map(Value::take)
        {
            Some(rows) => serde_json::from_value(rows).map_err(|e| {
                IntegrationError::remote(
                    Integration::QuickBooks,
                    None,
                    format!("unexpected {} shape: {}", entity, e),
                )
            }),
            None => Ok(Vec::new()),
        }
    }

    /// One page of invoices, newest first. `offset` is zero-based.
    pub async fn query_invoices(&self, limit: u32, offset: u32) -> IntegrationResult<Vec<Invoice>> {
        let query = format!(
            "SELECT * FROM Invoice ORDERBY Id DESC MAXRESULTS {} STARTPOSITION {}",
            limit,
            u64::from(offset) + 1
        );
        let rows: Vec<QboInvoice> = self.query("Invoice", &query).await?;
        Ok(rows.into_iter().map(Invoice::from).collect())
    }

    /// Fetch by internal ID. `None` when the response carries no invoice.
    pub async fn invoice_by_id(&self, id: &str) -> IntegrationResult<Option<Invoice>> {
        let mut response = self
            .get(&format!("invoice/{}", urlencoding::encode(id)))
            .await?;

        match response.get_mut("Invoice").map(Value::take) {
            Some(invoice) => {
                let invoice: QboInvoice = serde_json::from_value(invoice).map_err(|e| {
                    IntegrationError::remote(
                        Integration::QuickBooks,
                        None,
                        format!("unexpected Invoice shape: {}", e),
                    )
                })?;
                Ok(Some(invoice.into()))
            }
            None => Ok(None),
        }
    }

    /// Fetch by the customer-facing invoice number.
    pub async fn invoice_by_doc_number(&self, doc_number: &str) -> IntegrationResult<Option<Invoice>> {
        let query = format!(
            "SELECT * FROM Invoice WHERE DocNumber = '{}'",
            escape_query_literal(doc_number)
        );
        let rows: Vec<QboInvoice> = self.query("Invoice", &query).await?;
        Ok(rows.into_iter().next().map(Invoice::from))
    }

    pub async fn customer_by_email(&self, email: &str) -> IntegrationResult<Option<Customer>> {
        let query = format!(
            "SELECT * FROM Customer WHERE PrimaryEmailAddr.Address = '{}'",
            escape_query_literal(email)
        );
        let rows: Vec<QboCustomer> = self.query("Customer", &query).await?;
        Ok(rows.into_iter().next().map(Customer::from))
    }

    /// Connection probe used by the status endpoint.
    pub async fn company_info(&self) -> IntegrationResult<CompanyInfo> {
        let mut response = self.get("companyinfo/1").await?;
        let info = response
            .get_mut("CompanyInfo")
            .map(Value::take)
            .ok_or_else(|| {
                IntegrationError::remote(
                    Integration::QuickBooks,
                    None,
                    "response is missing CompanyInfo",
                )
            })?;

        serde_json::from_value(info).map_err(|e| {
            IntegrationError::remote(
                Integration::QuickBooks,
                None,
                format!("unexpected CompanyInfo shape: {}", e),
            )
        })
    }
}
