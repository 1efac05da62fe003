//! HTTP API for the customer portal and the admin settings pages.
//!
//! Public routes serve the invoice lookup form and the OAuth callback. Every
//! other route requires HTTP Basic admin credentials.

pub mod auth_middleware;
mod callback;
mod inquiries;
mod invoices;
mod settings;
mod users;

pub use auth_middleware::{require_admin, AuthenticatedAdmin, ADMIN_REALM};

use crate::admin::AdminError;
use crate::error::IntegrationError;
use crate::integration::Integration;
use crate::portal::Portal;
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

/// Shared application state
pub struct AppState {
    pub portal: Portal,
}

/// Error body shared by every endpoint
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<IntegrationError> for AppError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::NotConfigured(_) => AppError::ServiceUnavailable(err.to_string()),
            IntegrationError::NotAuthenticated(_) => AppError::Unauthorized(err.to_string()),
            IntegrationError::AuthorizationDenied(_) => AppError::Forbidden(err.to_string()),
            IntegrationError::RemoteRequestFailed { .. } => AppError::BadGateway(err.to_string()),
            IntegrationError::RecordNotFound | IntegrationError::OwnershipMismatch => {
                AppError::NotFound(err.to_string())
            }
            IntegrationError::Storage(e) => {
                error!(error = ?e, "Credential store failure");
                AppError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::InvalidInput(msg) => AppError::BadRequest(msg),
            AdminError::NotFound => AppError::NotFound(err.to_string()),
            AdminError::LastAdmin => AppError::Conflict(err.to_string()),
            AdminError::Storage(e) => {
                error!(error = ?e, "Admin repository failure");
                AppError::Internal("Internal server error".to_string())
            }
        }
    }
}

/// Resolve the `:name` path segment.
fn parse_integration(name: &str) -> Result<Integration, AppError> {
    name.parse()
        .map_err(|_| AppError::NotFound(format!("Integration '{}' not found", name)))
}

/// Run blocking admin-repository work off the async runtime.
async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AdminError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!(error = %e, "Blocking task failed");
            AppError::Internal("Internal server error".to_string())
        })?
        .map_err(AppError::from)
}

/// Create the full API router
pub fn create_router(portal: Portal) -> Router {
    let cors = cors_layer(portal.config.server.cors_allowed_origin.as_deref());
    let state = Arc::new(AppState { portal });

    let public = Router::new()
        .route("/api/invoices/lookup", post(invoices::lookup_invoice))
        .route(
            "/api/integrations/:name/oauth/callback",
            get(callback::oauth_callback),
        );

    let admin = Router::new()
        .route(
            "/api/integrations/:name/config",
            get(settings::get_config).put(settings::put_config),
        )
        .route("/api/integrations/:name/status", get(settings::get_status))
        .route("/api/integrations/:name/oauth/url", get(settings::get_auth_url))
        .route("/api/integrations/:name/disconnect", post(settings::disconnect))
        .route("/api/admin/invoices", get(invoices::list_invoices))
        .route("/api/admin/inquiries", get(inquiries::list_inquiries))
        .route("/api/admin/inquiries/:id/read", post(inquiries::mark_read))
        .route("/api/admin/users", get(users::list_users))
        .route(
            "/api/admin/users/:username",
            put(users::save_user).delete(users::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let router = Router::new().merge(public).merge(admin).with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// CORS for a separately hosted admin UI. None = same-origin only.
fn cors_layer(allowed_origin: Option<&str>) -> Option<CorsLayer> {
    let origin = allowed_origin?;
    let origin = match HeaderValue::from_str(origin) {
        Ok(origin) => origin,
        Err(_) => {
            warn!(origin = %origin, "Ignoring invalid CORS origin");
            return None;
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}
