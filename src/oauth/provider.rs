//! Provider endpoint resolution and authorization URL construction.

use crate::config::ProvidersConfig;
use crate::credentials::IntegrationConfig;
use crate::integration::{Environment, Integration};

/// How client credentials are presented to the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientAuth {
    /// `Authorization: Basic base64(client_id:client_secret)` (QuickBooks)
    Basic,
    /// `client_id` and `client_secret` in the form body (Gmail)
    RequestBody,
}

/// Resolved OAuth and API endpoints for one integration in one environment
#[derive(Clone, Debug)]
pub struct ProviderEndpoints {
    pub integration: Integration,
    pub auth_url: String,
    pub token_url: String,
    /// REST API origin, without the per-integration path prefix
    pub api_base: String,
    pub client_auth: ClientAuth,
}

impl ProviderEndpoints {
    pub fn resolve(
        providers: &ProvidersConfig,
        integration: Integration,
        environment: Environment,
    ) -> Self {
        match integration {
            Integration::QuickBooks => {
                let qb = &providers.quickbooks;
                // Sandbox and production share the OAuth endpoints; only the API host differs
                let api_base = match environment {
                    Environment::Sandbox => &qb.sandbox_api_base,
                    Environment::Production => &qb.production_api_base,
                };
                Self {
                    integration,
                    auth_url: qb.auth_url.clone(),
                    token_url: qb.token_url.clone(),
                    api_base: api_base.trim_end_matches('/').to_string(),
                    client_auth: ClientAuth::Basic,
                }
            }
            Integration::Gmail => {
                let gmail = &providers.gmail;
                Self {
                    integration,
                    auth_url: gmail.auth_url.clone(),
                    token_url: gmail.token_url.clone(),
                    api_base: gmail.api_base.trim_end_matches('/').to_string(),
                    client_auth: ClientAuth::RequestBody,
                }
            }
        }
    }

    /// Build the authorization URL the admin's browser is sent to.
    pub fn build_auth_url(&self, config: &IntegrationConfig, redirect_uri: &str, state: &str) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&scope={}&response_type=code&state={}",
            self.auth_url,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(config.scope_or_default(self.integration)),
            urlencoding::encode(state)
        );

        // Google only issues a refresh token for offline access with explicit consent
        if self.integration == Integration::Gmail {
            url.push_str("&access_type=offline&prompt=consent");
        }

        url
    }
}

/// Base of the QuickBooks web app, for customer payment links.
pub fn quickbooks_app_base(providers: &ProvidersConfig, environment: Environment) -> &str {
    let qb = &providers.quickbooks;
    match environment {
        Environment::Sandbox => qb.sandbox_app_base.trim_end_matches('/'),
        Environment::Production => qb.production_app_base.trim_end_matches('/'),
    }
}
