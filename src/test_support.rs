//! Fixtures shared by unit tests.

use crate::config::PortalConfig;
use crate::credentials::{CredentialStore, IntegrationConfig, TokenSet};
use crate::integration::Integration;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use std::sync::Arc;

pub(crate) const REALM_ID: &str = "9130355377";

pub(crate) fn memory_store() -> Arc<CredentialStore> {
    let key = BASE64.encode([7u8; 32]);
    Arc::new(CredentialStore::new(":memory:", &key).expect("Failed to create test store"))
}

/// Config whose provider endpoints all point at `server_url`.
pub(crate) fn portal_config(server_url: &str) -> PortalConfig {
    PortalConfig::default().with_provider_base_url(server_url)
}

pub(crate) fn save_client_config(store: &CredentialStore, integration: Integration) {
    let config = IntegrationConfig {
        client_id: "cid".to_string(),
        client_secret: "csecret".to_string(),
        account_id: if integration.requires_account_id() {
            REALM_ID.to_string()
        } else {
            String::new()
        },
        ..IntegrationConfig::empty(integration)
    };
    store.save_config(integration, &config).unwrap();
}

/// Store tokens expiring `expires_in` seconds from now.
pub(crate) fn seed_tokens(
    store: &CredentialStore,
    integration: Integration,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in: i64,
) -> TokenSet {
    let tokens = TokenSet {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: Utc::now() + Duration::seconds(expires_in),
    };
    store.store_tokens(integration, &tokens).unwrap();
    tokens
}
