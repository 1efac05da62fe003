//! Token endpoint calls: authorization-code exchange and refresh.

use super::provider::{ClientAuth, ProviderEndpoints};
use crate::credentials::{IntegrationConfig, TokenSet};
use crate::error::{IntegrationError, IntegrationResult};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;

/// Upper bound on a provider-supplied lifetime; larger values overflow chrono.
const MAX_EXPIRES_IN_SECONDS: i64 = u32::MAX as i64;

/// OAuth token response (standard OAuth 2.0, plus error fields)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// A successful token endpoint answer.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

impl TokenGrant {
    /// Convert to a stored token set, keeping `previous_refresh_token` when the
    /// provider did not rotate it.
    pub fn into_token_set(self, previous_refresh_token: Option<String>, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .or(previous_refresh_token),
            expires_at: now + Duration::seconds(self.expires_in.clamp(0, MAX_EXPIRES_IN_SECONDS)),
        }
    }
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code_for_tokens(
    http: &Client,
    endpoints: &ProviderEndpoints,
    config: &IntegrationConfig,
    code: &str,
    redirect_uri: &str,
) -> IntegrationResult<TokenGrant> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];
    request_tokens(http, endpoints, config, &form).await
}

/// Obtain a new access token from a refresh token.
pub async fn refresh_access_token(
    http: &Client,
    endpoints: &ProviderEndpoints,
    config: &IntegrationConfig,
    refresh_token: &str,
) -> IntegrationResult<TokenGrant> {
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
    ];
    request_tokens(http, endpoints, config, &form).await
}

async fn request_tokens(
    http: &Client,
    endpoints: &ProviderEndpoints,
    config: &IntegrationConfig,
    params: &[(&str, &str)],
) -> IntegrationResult<TokenGrant> {
    let integration = endpoints.integration;
    let mut form: Vec<(&str, &str)> = params.to_vec();

    let mut request = http
        .post(&endpoints.token_url)
        .header(reqwest::header::ACCEPT, "application/json");

    request = match endpoints.client_auth {
        ClientAuth::Basic => request.basic_auth(&config.client_id, Some(&config.client_secret)),
        ClientAuth::RequestBody => {
            form.push(("client_id", config.client_id.as_str()));
            form.push(("client_secret", config.client_secret.as_str()));
            request
        }
    };

    tracing::debug!(
        integration = %integration,
        token_url = %endpoints.token_url,
        "Calling token endpoint"
    );

    let response = request.form(&form).send().await.map_err(|e| {
        IntegrationError::remote(integration, None, format!("token request failed: {}", e))
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| IntegrationError::remote(integration, Some(status.as_u16()), e.to_string()))?;

    let parsed: Option<TokenResponse> = serde_json::from_str(&body).ok();

    if !status.is_success() {
        let detail = parsed
            .as_ref()
            .and_then(|r| r.error_description.clone().or_else(|| r.error.clone()))
            .unwrap_or_else(|| format!("HTTP {}", status));
        return Err(IntegrationError::remote(
            integration,
            Some(status.as_u16()),
            format!("token endpoint rejected the request: {}", detail),
        ));
    }

    let token_response = parsed.ok_or_else(|| {
        IntegrationError::remote(
            integration,
            Some(status.as_u16()),
            "token endpoint returned an unreadable response",
        )
    })?;

    let access_token = token_response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            IntegrationError::remote(
                integration,
                Some(status.as_u16()),
                "token endpoint response is missing access_token",
            )
        })?;

    tracing::debug!(
        integration = %integration,
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        "Token endpoint call succeeded"
    );

    let expires_in = match token_response.expires_in {
        Some(seconds) if !(0..=MAX_EXPIRES_IN_SECONDS).contains(&seconds) => {
            tracing::warn!(
                integration = %integration,
                expires_in = seconds,
                "Token endpoint returned an out-of-range expires_in, clamping"
            );
            seconds.clamp(0, MAX_EXPIRES_IN_SECONDS)
        }
        Some(seconds) => seconds,
        None => DEFAULT_EXPIRES_IN_SECONDS,
    };

    Ok(TokenGrant {
        access_token,
        refresh_token: token_response.refresh_token,
        expires_in,
    })
}
