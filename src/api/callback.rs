use super::{parse_integration, AppError, AppState};
use crate::error::IntegrationError;
use crate::oauth::CallbackParams;
use axum::{
    extract::{Path, Query, State},
    response::Redirect,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// GET /api/integrations/:name/oauth/callback
///
/// Public: the provider redirects the admin's browser here. The outcome is
/// reported by redirecting back to the settings page with `success=1` or
/// `error=<message>`.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AppError> {
    let integration = parse_integration(&name)?;
    debug!(integration = %integration, "OAuth callback received");

    let settings_page = &state.portal.config.server.settings_page;
    let target = match state.portal.flow.handle_callback(integration, &params).await {
        Ok(_) => {
            info!(integration = %integration, "OAuth connection established");
            format!("{}?tab={}&success=1", settings_page, integration.as_str())
        }
        Err(e) => {
            let message = match &e {
                IntegrationError::Storage(inner) => {
                    error!(integration = %integration, error = ?inner, "OAuth callback failed to persist tokens");
                    "Failed to save tokens".to_string()
                }
                other => {
                    warn!(integration = %integration, error = %other, "OAuth callback failed");
                    other.to_string()
                }
            };
            format!(
                "{}?tab={}&error={}",
                settings_page,
                integration.as_str(),
                urlencoding::encode(&message)
            )
        }
    };

    Ok(Redirect::to(&target))
}
