//! Invoice lookup, ownership verification and paging.

use crate::config::ProvidersConfig;
use crate::credentials::CredentialStore;
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::Integration;
use crate::models::Invoice;
use crate::oauth::quickbooks_app_base;
use crate::remote::QuickBooksClient;
use std::sync::Arc;
use tracing::{debug, info};

/// Ways an invoice identifier typed by a customer is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvoiceLookup {
    /// QuickBooks internal ID
    ById,
    /// Printed invoice number
    ByDocNumber,
}

/// Lookup order; the first hit wins.
pub const LOOKUP_CHAIN: [InvoiceLookup; 2] = [InvoiceLookup::ById, InvoiceLookup::ByDocNumber];

pub struct InvoiceService {
    quickbooks: QuickBooksClient,
    store: Arc<CredentialStore>,
    providers: ProvidersConfig,
}

impl InvoiceService {
    pub fn new(quickbooks: QuickBooksClient, store: Arc<CredentialStore>, providers: ProvidersConfig) -> Self {
        Self {
            quickbooks,
            store,
            providers,
        }
    }

    /// Resolve an identifier through [`LOOKUP_CHAIN`].
    ///
    /// A 400/404 from QuickBooks counts as a miss for that strategy: a printed
    /// invoice number is usually not a valid internal ID.
    pub async fn find_invoice(&self, identifier: &str) -> IntegrationResult<Option<Invoice>> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }

        for lookup in LOOKUP_CHAIN {
            let result = match lookup {
                InvoiceLookup::ById => self.quickbooks.invoice_by_id(identifier).await,
                InvoiceLookup::ByDocNumber => self.quickbooks.invoice_by_doc_number(identifier).await,
            };

            match result {
                Ok(Some(invoice)) => {
                    debug!(lookup = ?lookup, invoice_id = %invoice.id, "Invoice found");
                    return Ok(Some(invoice));
                }
                Ok(None) => debug!(lookup = ?lookup, "Invoice lookup missed"),
                Err(e) if matches!(e.remote_status(), Some(400) | Some(404)) => {
                    debug!(lookup = ?lookup, error = %e, "Invoice lookup rejected, treating as miss");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Return the invoice only if it belongs to the customer with this email.
    ///
    /// A missing invoice, a missing customer and a customer mismatch are
    /// indistinguishable to the caller.
    pub async fn verify_invoice_ownership(&self, identifier: &str, email: &str) -> IntegrationResult<Invoice> {
        let invoice = self
            .find_invoice(identifier)
            .await?
            .ok_or(IntegrationError::RecordNotFound)?;

        let customer = self
            .quickbooks
            .customer_by_email(email.trim())
            .await?
            .ok_or_else(|| {
                debug!(invoice_id = %invoice.id, "No customer with the given email");
                IntegrationError::RecordNotFound
            })?;

        if invoice.customer_ref.id != customer.id {
            info!(
                invoice_id = %invoice.id,
                customer_id = %customer.id,
                "Invoice lookup rejected: customer mismatch"
            );
            return Err(IntegrationError::OwnershipMismatch);
        }

        Ok(invoice)
    }

    /// One page of invoices in provider order (newest first).
    pub async fn sync_all_invoices(&self, limit: u32, offset: u32) -> IntegrationResult<Vec<Invoice>> {
        let invoices = self.quickbooks.query_invoices(limit, offset).await?;
        info!(count = invoices.len(), limit, offset, "Invoices fetched");
        Ok(invoices)
    }

    /// Link to the QuickBooks payment page for an invoice.
    pub fn payment_url(&self, invoice_id: &str) -> IntegrationResult<String> {
        let config = self.store.load_config(Integration::QuickBooks)?;
        Ok(format!(
            "{}/app/payment?invoiceId={}&companyId={}",
            quickbooks_app_base(&self.providers, config.environment),
            urlencoding::encode(invoice_id),
            urlencoding::encode(config.account_id.trim())
        ))
    }
}
