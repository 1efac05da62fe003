use super::*;
use crate::admin::{AdminUserInput, SqliteAdminRepository};
use crate::portal::Portal;
use crate::test_support::{memory_store, portal_config};
use axum::{
    body::Body,
    extract::Extension,
    http::Request as HttpRequest,
    middleware,
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tower::ServiceExt;

async fn whoami(Extension(admin): Extension<AuthenticatedAdmin>) -> String {
    admin.0
}

fn create_test_app() -> Router {
    let portal = Portal::new(
        portal_config("http://unused"),
        memory_store(),
        Arc::new(SqliteAdminRepository::new(":memory:").unwrap()),
    )
    .unwrap();
    portal
        .admins
        .save_user(
            "office",
            AdminUserInput {
                password: Some("heatpump123".to_string()),
                ..AdminUserInput::default()
            },
        )
        .unwrap();

    let state = Arc::new(AppState { portal });
    Router::new()
        .route("/whoami", get(whoami))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state)
}

fn request(authorization: Option<String>) -> HttpRequest<Body> {
    let mut builder = HttpRequest::builder().uri("/whoami");
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::empty()).unwrap()
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", username, password)))
}

#[tokio::test]
async fn test_valid_credentials_pass_through() {
    let response = create_test_app()
        .oneshot(request(Some(basic("office", "heatpump123"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"office");
}

#[tokio::test]
async fn test_missing_credentials_challenged() {
    let response = create_test_app().oneshot(request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Basic realm=\"pumpdesk\""
    );
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let response = create_test_app()
        .oneshot(request(Some(basic("office", "not-the-password"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_unknown_user_rejected() {
    let response = create_test_app()
        .oneshot(request(Some(basic("intruder", "heatpump123"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_token_rejected() {
    let response = create_test_app()
        .oneshot(request(Some("Bearer abc".to_string())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
