//! Error kinds surfaced by the integration layer.

use crate::integration::Integration;
use thiserror::Error;

/// Failures of integration operations.
///
/// `OwnershipMismatch` renders exactly like `RecordNotFound` so callers cannot
/// learn whether an invoice exists for someone else.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Client credentials (or the QuickBooks company ID) are missing
    #[error("{0} is not configured; save the client credentials in settings")]
    NotConfigured(Integration),

    /// No valid or refreshable token
    #[error("{0} is not authenticated; authorize in settings")]
    NotAuthenticated(Integration),

    /// CSRF state mismatch or provider error callback
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Network error or non-2xx response from the provider
    #[error("{integration} request failed: {message}")]
    RemoteRequestFailed {
        integration: Integration,
        status: Option<u16>,
        message: String,
    },

    #[error("record not found")]
    RecordNotFound,

    #[error("record not found")]
    OwnershipMismatch,

    /// Credential store could not be read or written
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type IntegrationResult<T> = Result<T, IntegrationError>;

impl IntegrationError {
    pub fn remote(integration: Integration, status: Option<u16>, message: impl Into<String>) -> Self {
        IntegrationError::RemoteRequestFailed {
            integration,
            status,
            message: message.into(),
        }
    }

    /// HTTP status the provider answered with, if the request got that far.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            IntegrationError::RemoteRequestFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// True for both not-found kinds.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IntegrationError::RecordNotFound | IntegrationError::OwnershipMismatch
        )
    }
}
