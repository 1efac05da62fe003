//! Authenticated requests against the provider APIs.
//!
//! [`RemoteClient::request`] resolves the integration's base URL, attaches the
//! bearer token and, when the provider answers 401, refreshes once and retries
//! once. The typed clients in [`quickbooks`] and [`gmail`] build on it.

pub mod gmail;
pub mod quickbooks;

pub use gmail::GmailClient;
pub use quickbooks::QuickBooksClient;

use crate::config::{HttpConfig, ProvidersConfig};
use crate::credentials::{CredentialStore, IntegrationConfig};
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::Integration;
use crate::oauth::{ProviderEndpoints, TokenManager};
use anyhow::Context;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Build the shared outbound HTTP client with an explicit request timeout.
pub fn build_http_client(config: &HttpConfig) -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
        .context("Failed to build HTTP client")
}

pub struct RemoteClient {
    store: Arc<CredentialStore>,
    tokens: Arc<TokenManager>,
    http: Client,
    providers: ProvidersConfig,
}

impl RemoteClient {
    pub fn new(
        store: Arc<CredentialStore>,
        tokens: Arc<TokenManager>,
        http: Client,
        providers: ProvidersConfig,
    ) -> Self {
        Self {
            store,
            tokens,
            http,
            providers,
        }
    }

    /// Perform an authenticated call and return the parsed JSON body.
    ///
    /// `endpoint` is relative to the integration's API root and may carry a
    /// query string. An empty response body yields `Value::Null`.
    pub async fn request(
        &self,
        integration: Integration,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> IntegrationResult<Value> {
        let config = self.store.load_config(integration)?;
        if !config.is_configured()
            || (integration.requires_account_id() && config.account_id.trim().is_empty())
        {
            return Err(IntegrationError::NotConfigured(integration));
        }

        let url = self.endpoint_url(integration, &config, endpoint);

        let tokens = self
            .tokens
            .valid_tokens(integration)
            .await
            .map_err(|e| not_authenticated_on_refresh_failure(integration, e))?;

        let response = self
            .send(integration, &method, &url, body, &tokens.access_token)
            .await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            warn!(integration = %integration, "Provider rejected access token, refreshing once");

            let refreshed = self
                .tokens
                .refresh_after(integration, &tokens.access_token)
                .await
                .map_err(|e| not_authenticated_on_refresh_failure(integration, e))?;

            self.send(integration, &method, &url, body, &refreshed.access_token)
                .await?
        } else {
            response
        };

        read_json(integration, response).await
    }

    fn endpoint_url(
        &self,
        integration: Integration,
        config: &IntegrationConfig,
        endpoint: &str,
    ) -> String {
        let endpoints = ProviderEndpoints::resolve(&self.providers, integration, config.environment);
        let endpoint = endpoint.trim_start_matches('/');

        match integration {
            Integration::QuickBooks => format!(
                "{}/v3/company/{}/{}",
                endpoints.api_base,
                urlencoding::encode(config.account_id.trim()),
                endpoint
            ),
            Integration::Gmail => format!("{}/gmail/v1/users/me/{}", endpoints.api_base, endpoint),
        }
    }

    async fn send(
        &self,
        integration: Integration,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        access_token: &str,
    ) -> IntegrationResult<reqwest::Response> {
        debug!(integration = %integration, method = %method, url = %url, "Provider request");

        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| IntegrationError::remote(integration, None, format!("request failed: {}", e)))
    }
}

fn not_authenticated_on_refresh_failure(
    integration: Integration,
    err: IntegrationError,
) -> IntegrationError {
    match err {
        IntegrationError::RemoteRequestFailed { .. } => IntegrationError::NotAuthenticated(integration),
        other => other,
    }
}

async fn read_json(integration: Integration, response: reqwest::Response) -> IntegrationResult<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| IntegrationError::remote(integration, Some(status.as_u16()), e.to_string()))?;

    if !status.is_success() {
        let message = provider_error_message(&text).unwrap_or_else(|| format!("HTTP {}", status));
        warn!(
            integration = %integration,
            status = status.as_u16(),
            message = %message,
            "Provider request failed"
        );
        return Err(IntegrationError::remote(integration, Some(status.as_u16()), message));
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| {
        IntegrationError::remote(
            integration,
            Some(status.as_u16()),
            format!("invalid JSON in response: {}", e),
        )
    })
}

/// Pull a readable message out of a provider error body.
///
/// QuickBooks: `{"Fault":{"Error":[{"Message":..,"Detail":..}]}}`
/// Google: `{"error":{"message":..}}` or `{"error":"..","error_description":".."}`
fn provider_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    if let Some(error) = value.pointer("/Fault/Error/0") {
        let message = error.get("Message").and_then(Value::as_str);
        let detail = error.get("Detail").and_then(Value::as_str);
        return match (message, detail) {
            (Some(m), Some(d)) => Some(format!("{}: {}", m, d)),
            (Some(m), None) => Some(m.to_string()),
            (None, Some(d)) => Some(d.to_string()),
            (None, None) => None,
        };
    }

    match value.get("error")? {
        Value::Object(error) => error.get("message").and_then(Value::as_str).map(str::to_string),
        Value::String(error) => Some(
            value
                .get("error_description")
                .and_then(Value::as_str)
                .map(|d| format!("{}: {}", error, d))
                .unwrap_or_else(|| error.clone()),
        ),
        _ => None,
    }
}
