use super::AppState;
use crate::auth::extract_basic_credentials;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[cfg(test)]
mod tests;

/// Realm sent in the Basic challenge
pub const ADMIN_REALM: &str = "pumpdesk";

/// Username of the admin who passed [`require_admin`], available to handlers
/// as a request extension.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticatedAdmin(pub String);

/// Require HTTP Basic credentials of a known admin.
///
/// Password verification (SQLite lookup and argon2) runs on the blocking pool.
/// Failures answer 401 with a `WWW-Authenticate` challenge.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let credentials = match extract_basic_credentials(request.headers()) {
        Ok(credentials) => credentials,
        Err(e) => {
            debug!(error = %e, path = %request.uri().path(), "Admin credentials missing or malformed");
            return challenge(&e.to_string());
        }
    };

    let admins = state.portal.admins.clone();
    let username = credentials.username.clone();
    let verified = tokio::task::spawn_blocking(move || {
        admins.verify_credentials(&credentials.username, &credentials.password)
    })
    .await;

    match verified {
        Ok(Ok(Some(user))) => {
            debug!(username = %user.username, "Admin authenticated");
            request
                .extensions_mut()
                .insert(AuthenticatedAdmin(user.username));
            next.run(request).await
        }
        Ok(Ok(None)) => {
            warn!(username = %username, "Admin authentication failed");
            challenge("Invalid username or password")
        }
        Ok(Err(e)) => {
            error!(error = ?e, "Admin credential check failed");
            internal_error()
        }
        Err(e) => {
            error!(error = %e, "Admin credential check panicked");
            internal_error()
        }
    }
}

fn challenge(message: &str) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{}\"", ADMIN_REALM)) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": "Internal server error" })),
    )
        .into_response()
}
