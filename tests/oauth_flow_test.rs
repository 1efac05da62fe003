// Integration tests for the settings and OAuth endpoints: the full
// unconfigured -> configured -> pending -> authenticated -> refreshed lifecycle.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use pumpdesk::admin::SqliteAdminRepository;
use pumpdesk::api::create_router;
use pumpdesk::config::PortalConfig;
use pumpdesk::credentials::{CredentialStore, TokenSet};
use pumpdesk::integration::Integration;
use pumpdesk::portal::Portal;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const REALM_ID: &str = "4620816365";

fn create_test_app(server_url: &str) -> (Router, Arc<CredentialStore>) {
    let key = BASE64.encode([9u8; 32]);
    let store = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
    let config = PortalConfig::default().with_provider_base_url(server_url);
    let portal = Portal::new(
        config,
        store.clone(),
        Arc::new(SqliteAdminRepository::new(":memory:").unwrap()),
    )
    .unwrap();
    portal.admins.bootstrap("office", "heatpump123").unwrap();

    (create_router(portal), store)
}

fn admin_auth() -> String {
    format!("Basic {}", BASE64.encode("office:heatpump123"))
}

fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", admin_auth());

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn connection_state(app: &Router, name: &str) -> String {
    let (status, body) = send(
        app,
        admin_request("GET", &format!("/api/integrations/{}/status", name), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["state"].as_str().unwrap().to_string()
}

fn state_param(auth_url: &str) -> String {
    reqwest::Url::parse(auth_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

async fn callback(app: &Router, name: &str, query: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/integrations/{}/oauth/callback?{}", name, query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    (response.status(), location)
}

/// Unconfigured -> Configured -> AuthorizationPending -> Authenticated -> refresh.
#[tokio::test]
async fn test_quickbooks_connection_lifecycle() {
    let mut server = Server::new_async().await;
    let (app, store) = create_test_app(&server.url());

    assert_eq!(connection_state(&app, "quickbooks").await, "unconfigured");

    // Save client credentials
    let (status, body) = send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/quickbooks/config",
            Some(json!({
                "clientId": "ABcid",
                "clientSecret": "s3cret",
                "realmId": REALM_ID,
                "environment": "sandbox"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["hasClientSecret"], true);
    assert_eq!(body["config"]["realmId"], REALM_ID);
    assert!(body["config"].get("clientSecret").is_none());
    assert!(!body.to_string().contains("s3cret"));

    assert_eq!(connection_state(&app, "quickbooks").await, "configured");

    // Issue the authorization URL
    let (status, body) = send(
        &app,
        admin_request("GET", "/api/integrations/quickbooks/oauth/url", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let auth_url = body["authUrl"].as_str().unwrap().to_string();
    assert!(auth_url.contains("client_id=ABcid"));
    assert!(auth_url.contains("response_type=code"));
    let state = state_param(&auth_url);

    assert_eq!(connection_state(&app, "quickbooks").await, "authorization_pending");

    // Provider redirects back with a code
    let exchange = server
        .mock("POST", "/quickbooks/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "auth-code-1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"a1","refresh_token":"r1","expires_in":3600,"token_type":"bearer"}"#)
        .expect(1)
        .create_async()
        .await;

    let (status, location) = callback(
        &app,
        "quickbooks",
        &format!("code=auth-code-1&state={}&realmId={}", state, REALM_ID),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, "/admin/settings.html?tab=quickbooks&success=1");
    exchange.assert_async().await;

    // Status runs a live probe with the new token
    let probe = server
        .mock("GET", format!("/v3/company/{}/companyinfo/1", REALM_ID).as_str())
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"CompanyInfo":{"CompanyName":"Northern Heat Pumps","Country":"US"}}"#)
        .create_async()
        .await;

    let (status, body) = send(
        &app,
        admin_request("GET", "/api/integrations/quickbooks/status", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "authenticated");
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["apiTest"]["success"], true);
    assert_eq!(body["apiTest"]["details"]["companyName"], "Northern Heat Pumps");
    probe.assert_async().await;

    // Expire the access token; the next API call refreshes first
    store
        .store_tokens(
            Integration::QuickBooks,
            &TokenSet {
                access_token: "a1".to_string(),
                refresh_token: Some("r1".to_string()),
                expires_at: Utc::now() - Duration::minutes(5),
            },
        )
        .unwrap();

    let refresh = server
        .mock("POST", "/quickbooks/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "r1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"a2","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let invoices = server
        .mock("GET", Matcher::Regex(format!(r"^/v3/company/{}/query", REALM_ID)))
        .match_header("authorization", "Bearer a2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"QueryResponse":{}}"#)
        .expect(1)
        .create_async()
        .await;

    let (status, body) = send(&app, admin_request("GET", "/api/admin/invoices", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["offset"], 0);
    refresh.assert_async().await;
    invoices.assert_async().await;

    // Refresh token kept when the provider does not rotate it
    let tokens = store.get_tokens(Integration::QuickBooks).unwrap().unwrap();
    assert_eq!(tokens.access_token, "a2");
    assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_callback_with_unknown_state_never_calls_token_endpoint() {
    let mut server = Server::new_async().await;
    let (app, store) = create_test_app(&server.url());

    let (status, _) = send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/gmail/config",
            Some(json!({ "clientId": "gcid", "clientSecret": "gsecret" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let exchange = server
        .mock("POST", "/gmail/token")
        .expect(0)
        .create_async()
        .await;

    let (status, location) = callback(&app, "gmail", "code=abc&state=forged-state").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(location.starts_with("/admin/settings.html?tab=gmail&error="));
    assert!(!location.contains("success=1"));

    // The manual test bypass is off by default
    let (_, location) = callback(&app, "gmail", "code=abc&state=manual_test").await;
    assert!(location.contains("error="));

    exchange.assert_async().await;
    assert!(store.get_tokens(Integration::Gmail).unwrap().is_none());
}

#[tokio::test]
async fn test_callback_reports_provider_error() {
    let server = Server::new_async().await;
    let (app, _) = create_test_app(&server.url());

    let (status, location) = callback(
        &app,
        "gmail",
        "error=access_denied&error_description=User%20cancelled",
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(location.contains("error=authorization%20denied"));
}

#[tokio::test]
async fn test_gmail_auth_url_requests_offline_access() {
    let server = Server::new_async().await;
    let (app, _) = create_test_app(&server.url());

    // Not configured yet
    let (status, body) = send(
        &app,
        admin_request("GET", "/api/integrations/gmail/oauth/url", None),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);

    send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/gmail/config",
            Some(json!({ "clientId": "gcid", "clientSecret": "gsecret" })),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        admin_request("GET", "/api/integrations/gmail/oauth/url", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let auth_url = body["authUrl"].as_str().unwrap();
    assert!(auth_url.contains("access_type=offline"));
    assert!(auth_url.contains("prompt=consent"));
    assert!(auth_url.contains(&urlencoding::encode(
        "http://localhost:8080/api/integrations/gmail/oauth/callback"
    ).into_owned()));
}

#[tokio::test]
async fn test_config_validation() {
    let server = Server::new_async().await;
    let (app, _) = create_test_app(&server.url());

    // QuickBooks requires a realm ID
    let (status, body) = send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/quickbooks/config",
            Some(json!({ "clientId": "cid", "clientSecret": "secret" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("realmId"));

    // Secret required on first save
    let (status, _) = send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/gmail/config",
            Some(json!({ "clientId": "cid" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/gmail/config",
            Some(json!({ "clientId": "cid", "clientSecret": "secret", "environment": "staging" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown integration
    let (status, _) = send(&app, admin_request("GET", "/api/integrations/xero/config", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_config_update_keeps_stored_secret() {
    let server = Server::new_async().await;
    let (app, store) = create_test_app(&server.url());

    send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/gmail/config",
            Some(json!({ "clientId": "cid", "clientSecret": "first-secret" })),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/gmail/config",
            Some(json!({ "clientId": "cid-2" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["clientId"], "cid-2");
    assert!(body["config"].get("realmId").is_none());

    let config = store.load_config(Integration::Gmail).unwrap();
    assert_eq!(config.client_secret, "first-secret");
}

#[tokio::test]
async fn test_disconnect_clears_tokens_and_realm() {
    let server = Server::new_async().await;
    let (app, store) = create_test_app(&server.url());

    send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/quickbooks/config",
            Some(json!({ "clientId": "cid", "clientSecret": "secret", "realmId": REALM_ID })),
        ),
    )
    .await;
    store
        .store_tokens(
            Integration::QuickBooks,
            &TokenSet {
                access_token: "a1".to_string(),
                refresh_token: Some("r1".to_string()),
                expires_at: Utc::now() + Duration::hours(1),
            },
        )
        .unwrap();

    let (status, body) = send(
        &app,
        admin_request(
            "POST",
            "/api/integrations/quickbooks/disconnect",
            Some(json!({ "clearRealm": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokensDeleted"], true);
    assert_eq!(body["realmCleared"], true);
    assert_eq!(body["configCleared"], false);

    assert!(store.get_tokens(Integration::QuickBooks).unwrap().is_none());
    let config = store.load_config(Integration::QuickBooks).unwrap();
    assert!(config.account_id.is_empty());
    assert_eq!(config.client_id, "cid");

    // Body is optional
    let (status, body) = send(
        &app,
        admin_request("POST", "/api/integrations/quickbooks/disconnect", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokensDeleted"], false);
}

#[tokio::test]
async fn test_disconnect_rejects_malformed_body() {
    let server = Server::new_async().await;
    let (app, store) = create_test_app(&server.url());

    send(
        &app,
        admin_request(
            "PUT",
            "/api/integrations/gmail/config",
            Some(json!({ "clientId": "cid", "clientSecret": "secret" })),
        ),
    )
    .await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/integrations/gmail/disconnect")
        .header("authorization", admin_auth())
        .header("content-type", "text/plain")
        .body(Body::from(r#"{"clearConfig": tru"#))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Nothing was cleared
    assert_eq!(store.load_config(Integration::Gmail).unwrap().client_id, "cid");

    // A well-formed body is honoured even without a JSON content type
    let request = Request::builder()
        .method("POST")
        .uri("/api/integrations/gmail/disconnect")
        .header("authorization", admin_auth())
        .body(Body::from(r#"{"clearConfig": true}"#))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configCleared"], true);
    assert!(store.load_config(Integration::Gmail).unwrap().client_id.is_empty());
}
