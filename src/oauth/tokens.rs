//! Token lifecycle: validity checks and refresh.
//!
//! A token set counts as valid until 60 seconds before it expires. Anything
//! that needs a bearer token goes through [`TokenManager::valid_tokens`], which
//! refreshes at most once. Refreshes are serialized per integration so two
//! requests noticing an expired token at the same time do not both spend the
//! refresh token.

use super::exchange;
use super::provider::ProviderEndpoints;
use crate::config::ProvidersConfig;
use crate::credentials::{CredentialStore, TokenSet};
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::Integration;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct TokenManager {
    store: Arc<CredentialStore>,
    http: reqwest::Client,
    providers: ProvidersConfig,
    refresh_locks: HashMap<Integration, Mutex<()>>,
}

impl TokenManager {
    pub fn new(store: Arc<CredentialStore>, http: reqwest::Client, providers: ProvidersConfig) -> Self {
        let refresh_locks = Integration::ALL
            .into_iter()
            .map(|integration| (integration, Mutex::new(())))
            .collect();

        Self {
            store,
            http,
            providers,
            refresh_locks,
        }
    }

    pub fn get_tokens(&self, integration: Integration) -> IntegrationResult<Option<TokenSet>> {
        Ok(self.store.get_tokens(integration)?)
    }

    pub fn is_valid(tokens: &TokenSet, now: DateTime<Utc>) -> bool {
        tokens.is_valid_at(now)
    }

    /// Tokens usable for an API call right now.
    ///
    /// Returns the stored set when valid, otherwise refreshes once. Without
    /// stored tokens this fails with `NotAuthenticated` and no network I/O.
    pub async fn valid_tokens(&self, integration: Integration) -> IntegrationResult<TokenSet> {
        let tokens = self
            .get_tokens(integration)?
            .ok_or(IntegrationError::NotAuthenticated(integration))?;

        if Self::is_valid(&tokens, Utc::now()) {
            return Ok(tokens);
        }

        debug!(integration = %integration, "Access token expired, refreshing");
        self.refresh_after(integration, &tokens.access_token).await
    }

    /// Unconditionally refresh the stored token set.
    pub async fn refresh(&self, integration: Integration) -> IntegrationResult<TokenSet> {
        let _guard = self.lock(integration).lock().await;
        self.refresh_locked(integration).await
    }

    /// Refresh because `rejected_access_token` stopped working.
    ///
    /// If another task already replaced that token with a valid one while we
    /// waited for the lock, the newer set is returned without calling the
    /// provider.
    pub async fn refresh_after(
        &self,
        integration: Integration,
        rejected_access_token: &str,
    ) -> IntegrationResult<TokenSet> {
        let _guard = self.lock(integration).lock().await;

        if let Some(current) = self.get_tokens(integration)? {
            if current.access_token != rejected_access_token
                && Self::is_valid(&current, Utc::now())
            {
                debug!(integration = %integration, "Token already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        self.refresh_locked(integration).await
    }

    fn lock(&self, integration: Integration) -> &Mutex<()> {
        // Populated for every variant in new()
        &self.refresh_locks[&integration]
    }

    async fn refresh_locked(&self, integration: Integration) -> IntegrationResult<TokenSet> {
        let config = self.store.load_config(integration)?;
        if !config.is_configured() {
            return Err(IntegrationError::NotConfigured(integration));
        }

        let current = self
            .get_tokens(integration)?
            .ok_or(IntegrationError::NotAuthenticated(integration))?;

        let refresh_token = match current.refresh_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => {
                warn!(integration = %integration, "No refresh token stored, re-authorization required");
                return Err(IntegrationError::NotAuthenticated(integration));
            }
        };

        let endpoints = ProviderEndpoints::resolve(&self.providers, integration, config.environment);

        let grant = exchange::refresh_access_token(&self.http, &endpoints, &config, refresh_token)
            .await
            .map_err(|e| {
                warn!(integration = %integration, error = %e, "Token refresh failed");
                match e.remote_status() {
                    // Rejected grant, or a 2xx without an access token
                    Some(status) if status < 500 => IntegrationError::NotAuthenticated(integration),
                    _ => e,
                }
            })?;

        let tokens = grant.into_token_set(current.refresh_token.clone(), Utc::now());
        self.store.store_tokens(integration, &tokens)?;

        info!(
            integration = %integration,
            expires_at = %tokens.expires_at,
            "Access token refreshed"
        );

        Ok(tokens)
    }
}
