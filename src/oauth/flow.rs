//! Authorization code flow: settings, authorization URL, callback, disconnect.

use super::exchange;
use super::provider::ProviderEndpoints;
use super::state_manager::StateManager;
use super::tokens::TokenManager;
use crate::config::{PortalConfig, ProvidersConfig};
use crate::credentials::{CredentialStore, IntegrationConfig, TokenSet};
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::Integration;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State accepted without verification when `oauth.allow_manual_test_state` is on.
pub const MANUAL_TEST_STATE: &str = "manual_test";

/// Where an integration stands in the connect lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No client credentials saved
    Unconfigured,
    Configured,
    /// An authorization URL was issued and its state has not been redeemed
    AuthorizationPending,
    /// Tokens are valid, or expired but refreshable
    Authenticated,
}

/// Query parameters the provider sends to the callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// QuickBooks company ID
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DisconnectOptions {
    pub clear_account_id: bool,
    /// Reset the whole config, leaving the integration unconfigured
    pub clear_config: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectOutcome {
    pub tokens_removed: bool,
    pub account_id_cleared: bool,
    pub config_cleared: bool,
}

pub struct AuthorizationFlow {
    store: Arc<CredentialStore>,
    tokens: Arc<TokenManager>,
    states: StateManager,
    http: reqwest::Client,
    providers: ProvidersConfig,
    public_base_url: String,
    allow_manual_test_state: bool,
}

impl AuthorizationFlow {
    pub fn new(
        store: Arc<CredentialStore>,
        tokens: Arc<TokenManager>,
        http: reqwest::Client,
        config: &PortalConfig,
    ) -> Self {
        if config.oauth.allow_manual_test_state {
            warn!("OAuth callbacks accept the '{}' state; never enable this in production", MANUAL_TEST_STATE);
        }

        Self {
            store,
            tokens,
            states: StateManager::new(config.oauth.state_expiry_seconds),
            http,
            providers: config.providers.clone(),
            public_base_url: config.server.public_base_url.trim_end_matches('/').to_string(),
            allow_manual_test_state: config.oauth.allow_manual_test_state,
        }
    }

    pub fn load_config(&self, integration: Integration) -> IntegrationResult<IntegrationConfig> {
        Ok(self.store.load_config(integration)?)
    }

    pub fn save_config(
        &self,
        integration: Integration,
        config: &IntegrationConfig,
    ) -> IntegrationResult<()> {
        self.store.save_config(integration, config)?;
        info!(
            integration = %integration,
            environment = config.environment.as_str(),
            "Integration settings saved"
        );
        Ok(())
    }

    /// Redirect URI registered with the provider: the saved value, or the
    /// portal's own callback route.
    pub fn redirect_uri(&self, integration: Integration, config: &IntegrationConfig) -> String {
        if config.redirect_uri.trim().is_empty() {
            format!(
                "{}/api/integrations/{}/oauth/callback",
                self.public_base_url,
                integration.as_str()
            )
        } else {
            config.redirect_uri.trim().to_string()
        }
    }

    /// Issue a CSRF state and build the provider's authorization URL.
    pub fn build_authorization_url(&self, integration: Integration) -> IntegrationResult<String> {
        let config = self.load_config(integration)?;
        if !config.is_configured() {
            return Err(IntegrationError::NotConfigured(integration));
        }

        let endpoints = ProviderEndpoints::resolve(&self.providers, integration, config.environment);
        let redirect_uri = self.redirect_uri(integration, &config);
        let state = self.states.create_state(integration);

        debug!(integration = %integration, redirect_uri = %redirect_uri, "Authorization URL issued");

        Ok(endpoints.build_auth_url(&config, &redirect_uri, &state))
    }

    /// Redeem the provider's callback: verify state, exchange the code, persist tokens.
    pub async fn handle_callback(
        &self,
        integration: Integration,
        params: &CallbackParams,
    ) -> IntegrationResult<TokenSet> {
        if let Some(error) = &params.error {
            let description = params.error_description.as_deref().unwrap_or("no description");
            warn!(
                integration = %integration,
                error = %error,
                description = %description,
                "Provider denied authorization"
            );
            return Err(IntegrationError::AuthorizationDenied(format!(
                "{}: {}",
                error, description
            )));
        }

        let state = params
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IntegrationError::AuthorizationDenied("missing state parameter".to_string()))?;
        self.verify_state(integration, state)?;

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                IntegrationError::AuthorizationDenied("missing authorization code".to_string())
            })?;

        let mut config = self.load_config(integration)?;
        if !config.is_configured() {
            return Err(IntegrationError::NotConfigured(integration));
        }

        let endpoints = ProviderEndpoints::resolve(&self.providers, integration, config.environment);
        let redirect_uri = self.redirect_uri(integration, &config);

        debug!(integration = %integration, "Exchanging authorization code for tokens");
        let grant =
            exchange::exchange_code_for_tokens(&self.http, &endpoints, &config, code, &redirect_uri)
                .await?;

        let tokens = grant.into_token_set(None, Utc::now());
        self.store.store_tokens(integration, &tokens)?;

        if integration.requires_account_id() {
            if let Some(realm_id) = params.realm_id.as_deref().filter(|r| !r.is_empty()) {
                if config.account_id != realm_id {
                    config.account_id = realm_id.to_string();
                    self.store.save_config(integration, &config)?;
                    debug!(integration = %integration, "Company ID from callback saved");
                }
            }
        }

        info!(
            integration = %integration,
            has_refresh_token = tokens.has_refresh_token(),
            "Authorization completed"
        );

        Ok(tokens)
    }

    fn verify_state(&self, integration: Integration, state: &str) -> IntegrationResult<()> {
        if state == MANUAL_TEST_STATE && self.allow_manual_test_state {
            warn!(integration = %integration, "Accepting manual test state");
            return Ok(());
        }

        let entry = self.states.validate_and_consume(state).ok_or_else(|| {
            warn!(integration = %integration, "Invalid or expired OAuth state");
            IntegrationError::AuthorizationDenied("invalid or expired state".to_string())
        })?;

        if entry.integration != integration {
            warn!(
                expected = %entry.integration,
                actual = %integration,
                "OAuth state issued for a different integration"
            );
            return Err(IntegrationError::AuthorizationDenied(
                "state was issued for a different integration".to_string(),
            ));
        }

        Ok(())
    }

    pub fn connection_state(&self, integration: Integration) -> IntegrationResult<ConnectionState> {
        let config = self.load_config(integration)?;
        if !config.is_configured() {
            return Ok(ConnectionState::Unconfigured);
        }

        if let Some(tokens) = self.tokens.get_tokens(integration)? {
            if TokenManager::is_valid(&tokens, Utc::now()) || tokens.has_refresh_token() {
                return Ok(ConnectionState::Authenticated);
            }
        }

        if self.states.has_pending(integration) {
            Ok(ConnectionState::AuthorizationPending)
        } else {
            Ok(ConnectionState::Configured)
        }
    }

    pub fn disconnect(
        &self,
        integration: Integration,
        options: DisconnectOptions,
    ) -> IntegrationResult<DisconnectOutcome> {
        let tokens_removed = self.store.delete_tokens(integration)?;

        let mut outcome = DisconnectOutcome {
            tokens_removed,
            account_id_cleared: false,
            config_cleared: false,
        };

        if options.clear_config {
            self.store
                .save_config(integration, &IntegrationConfig::empty(integration))?;
            outcome.config_cleared = true;
            outcome.account_id_cleared = true;
        } else if options.clear_account_id {
            let mut config = self.load_config(integration)?;
            config.account_id.clear();
            self.store.save_config(integration, &config)?;
            outcome.account_id_cleared = true;
        }

        info!(
            integration = %integration,
            tokens_removed = outcome.tokens_removed,
            account_id_cleared = outcome.account_id_cleared,
            config_cleared = outcome.config_cleared,
            "Integration disconnected"
        );

        Ok(outcome)
    }
}
