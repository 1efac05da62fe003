//! Integration settings endpoints used by the admin settings page.

use super::{parse_integration, AppError, AppState};
use crate::credentials::IntegrationConfig;
use crate::integration::{Environment, Integration};
use crate::oauth::DisconnectOptions;
use crate::portal::IntegrationStatus;
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Saved settings as shown to the admin. The client secret is never returned.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub client_id: String,
    pub has_client_secret: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_id: Option<String>,
    pub environment: Environment,
    /// Saved override, or the derived callback URL when none is saved
    pub redirect_uri: String,
    pub scope: String,
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub success: bool,
    pub config: ConfigView,
}

/// Request body for PUT /api/integrations/:name/config
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub client_id: Option<String>,
    /// Omit to keep the stored secret
    pub client_secret: Option<String>,
    pub realm_id: Option<String>,
    pub environment: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub status: IntegrationStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlResponse {
    pub success: bool,
    pub auth_url: String,
}

/// Request body for POST /api/integrations/:name/disconnect
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest {
    #[serde(default)]
    pub clear_realm: bool,
    #[serde(default)]
    pub clear_config: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
    pub success: bool,
    pub tokens_deleted: bool,
    pub realm_cleared: bool,
    pub config_cleared: bool,
}

fn config_view(state: &AppState, integration: Integration, config: &IntegrationConfig) -> ConfigView {
    ConfigView {
        client_id: config.client_id.clone(),
        has_client_secret: !config.client_secret.is_empty(),
        realm_id: integration
            .requires_account_id()
            .then(|| config.account_id.clone()),
        environment: config.environment,
        redirect_uri: state.portal.flow.redirect_uri(integration, config),
        scope: config.scope_or_default(integration).to_string(),
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing required field '{}'", field)))
}

/// GET /api/integrations/:name/config
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ConfigResponse>, AppError> {
    let integration = parse_integration(&name)?;
    let config = state.portal.flow.load_config(integration)?;

    Ok(Json(ConfigResponse {
        success: true,
        config: config_view(&state, integration, &config),
    }))
}

/// PUT /api/integrations/:name/config
///
/// QuickBooks requires clientId, clientSecret and realmId; Gmail requires
/// clientId and clientSecret. A stored secret satisfies the requirement when
/// the request omits it.
pub async fn put_config(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigResponse>, AppError> {
    let integration = parse_integration(&name)?;
    let mut config = state.portal.flow.load_config(integration)?;

    config.client_id = required(update.client_id, "clientId")?;

    match update.client_secret.map(|s| s.trim().to_string()) {
        Some(secret) if !secret.is_empty() => config.client_secret = secret,
        _ if !config.client_secret.is_empty() => {}
        _ => return Err(AppError::BadRequest("Missing required field 'clientSecret'".to_string())),
    }

    if integration.requires_account_id() {
        config.account_id = required(update.realm_id, "realmId")?;
    }

    if let Some(environment) = update.environment {
        config.environment = environment
            .parse()
            .map_err(|e: anyhow::Error| AppError::BadRequest(e.to_string()))?;
    }
    if let Some(redirect_uri) = update.redirect_uri {
        config.redirect_uri = redirect_uri.trim().to_string();
    }
    if let Some(scope) = update.scope {
        config.scope = scope.trim().to_string();
    }

    state.portal.flow.save_config(integration, &config)?;

    Ok(Json(ConfigResponse {
        success: true,
        config: config_view(&state, integration, &config),
    }))
}

/// GET /api/integrations/:name/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let integration = parse_integration(&name)?;
    let status = state.portal.status(integration).await?;

    Ok(Json(StatusResponse {
        success: true,
        status,
    }))
}

/// GET /api/integrations/:name/oauth/url
pub async fn get_auth_url(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<AuthUrlResponse>, AppError> {
    let integration = parse_integration(&name)?;
    let auth_url = state.portal.flow.build_authorization_url(integration)?;

    Ok(Json(AuthUrlResponse {
        success: true,
        auth_url,
    }))
}

/// POST /api/integrations/:name/disconnect
///
/// An empty body means tokens only; a body that is present must be valid JSON.
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<DisconnectResponse>, AppError> {
    let integration = parse_integration(&name)?;
    let request: DisconnectRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DisconnectRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid disconnect request: {}", e)))?
    };

    let outcome = state.portal.flow.disconnect(
        integration,
        DisconnectOptions {
            clear_account_id: request.clear_realm,
            clear_config: request.clear_config,
        },
    )?;

    info!(integration = %integration, "Disconnect requested from settings");

    Ok(Json(DisconnectResponse {
        success: true,
        tokens_deleted: outcome.tokens_removed,
        realm_cleared: outcome.account_id_cleared,
        config_cleared: outcome.config_cleared,
    }))
}
