//! Server-side credential store for integration settings and OAuth tokens.
//!
//! One settings row and at most one token row per integration, kept in SQLite.
//! Client secrets, access tokens and refresh tokens are sealed with AES-256-GCM
//! before they are written.
//!
//! # Usage
//!
//! ```no_run
//! use pumpdesk::credentials::{CredentialStore, TokenSet};
//! use pumpdesk::integration::Integration;
//! use chrono::{Duration, Utc};
//!
//! # fn main() -> anyhow::Result<()> {
//! let encryption_key = std::env::var("PUMPDESK_ENCRYPTION_KEY")?;
//! let store = CredentialStore::new("pumpdesk.db", &encryption_key)?;
//!
//! let mut config = store.load_config(Integration::QuickBooks)?;
//! config.client_id = "ABc123".to_string();
//! config.client_secret = "s3cret".to_string();
//! store.save_config(Integration::QuickBooks, &config)?;
//!
//! store.store_tokens(
//!     Integration::QuickBooks,
//!     &TokenSet {
//!         access_token: "access".to_string(),
//!         refresh_token: Some("refresh".to_string()),
//!         expires_at: Utc::now() + Duration::hours(1),
//!     },
//! )?;
//! # Ok(())
//! # }
//! ```

use crate::integration::{Environment, Integration};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod storage;

pub use encryption::{Sealed, SecretBox};
pub use storage::CredentialStore;

/// Seconds before `expires_at` at which an access token stops counting as valid.
pub const EXPIRY_BUFFER_SECONDS: i64 = 60;

/// OAuth client settings for one integration, as saved by the admin.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Provider tenant identifier (QuickBooks realm ID). Unused by Gmail.
    pub account_id: String,
    pub environment: Environment,
    /// Empty = derive from the server's public base URL
    pub redirect_uri: String,
    pub scope: String,
}

impl IntegrationConfig {
    /// The config returned before anything was saved.
    pub fn empty(integration: Integration) -> Self {
        Self {
            scope: integration.default_scope().to_string(),
            ..Self::default()
        }
    }

    /// Client credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    pub fn scope_or_default(&self, integration: Integration) -> &str {
        if self.scope.trim().is_empty() {
            integration.default_scope()
        } else {
            &self.scope
        }
    }
}

/// OAuth tokens for one integration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// True iff the access token is non-empty and `now < expires_at - 60s`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty()
            && now < self.expires_at - Duration::seconds(EXPIRY_BUFFER_SECONDS)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}
