// Integration tests for the public POST /api/invoices/lookup endpoint

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use mockito::{Matcher, Server, ServerGuard};
use pumpdesk::admin::SqliteAdminRepository;
use pumpdesk::api::create_router;
use pumpdesk::config::PortalConfig;
use pumpdesk::credentials::{CredentialStore, IntegrationConfig, TokenSet};
use pumpdesk::integration::Integration;
use pumpdesk::portal::Portal;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const REALM_ID: &str = "4620816365";

const INVOICE: &str = r#"{
    "Id": "130",
    "DocNumber": "1037",
    "TxnDate": "2024-03-01",
    "DueDate": "2024-03-31",
    "TotalAmt": 4250.0,
    "Balance": 1250.0,
    "CustomerRef": {"value": "58", "name": "Jane Doe"},
    "Line": [
        {"Description": "Mini-split install", "Amount": 4000.0, "DetailType": "SalesItemLineDetail",
         "SalesItemLineDetail": {"Qty": 1, "UnitPrice": 4000.0}},
        {"Description": "Line set", "Amount": 250.0, "DetailType": "SalesItemLineDetail",
         "SalesItemLineDetail": {"Qty": 2, "UnitPrice": 125.0}},
        {"Amount": 4250.0, "DetailType": "SubTotalLineDetail", "SubTotalLineDetail": {}}
    ]
}"#;

fn create_test_app(server_url: &str, connected: bool) -> Router {
    let key = BASE64.encode([3u8; 32]);
    let store = Arc::new(CredentialStore::new(":memory:", &key).unwrap());

    if connected {
        store
            .save_config(
                Integration::QuickBooks,
                &IntegrationConfig {
                    client_id: "cid".to_string(),
                    client_secret: "secret".to_string(),
                    account_id: REALM_ID.to_string(),
                    ..IntegrationConfig::default()
                },
            )
            .unwrap();
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
    }

    let portal = Portal::new(
        PortalConfig::default().with_provider_base_url(server_url),
        store,
        Arc::new(SqliteAdminRepository::new(":memory:").unwrap()),
    )
    .unwrap();
    create_router(portal)
}

async fn lookup(app: &Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/invoices/lookup")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn mock_invoice(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("GET", format!("/v3/company/{}/invoice/130", REALM_ID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(r#"{{"Invoice":{}}}"#, INVOICE))
        .create_async()
        .await
}

async fn mock_customer(server: &mut ServerGuard, customer_id: Option<&str>) -> mockito::Mock {
    let body = match customer_id {
        Some(id) => format!(
            r#"{{"QueryResponse":{{"Customer":[{{"Id":"{}","DisplayName":"Jane Doe"}}]}}}}"#,
            id
        ),
        None => r#"{"QueryResponse":{}}"#.to_string(),
    };
    server
        .mock("GET", Matcher::Regex(format!(r"^/v3/company/{}/query", REALM_ID)))
        .match_query(Matcher::UrlEncoded(
            "query".into(),
            "SELECT * FROM Customer WHERE PrimaryEmailAddr.Address = 'jane@example.com'".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

#[tokio::test]
async fn test_lookup_returns_invoice_for_owner() {
    let mut server = Server::new_async().await;
    let _invoice = mock_invoice(&mut server).await;
    let _customer = mock_customer(&mut server, Some("58")).await;
    let app = create_test_app(&server.url(), true);

    let (status, body) = lookup(
        &app,
        json!({ "invoiceNumber": "130", "email": "jane@example.com" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["invoice"]["id"], "130");
    assert_eq!(body["invoice"]["number"], "1037");
    assert_eq!(body["invoice"]["date"], "2024-03-01");
    assert_eq!(body["invoice"]["dueDate"], "2024-03-31");
    assert_eq!(body["invoice"]["balance"], 1250.0);
    assert_eq!(body["invoice"]["total"], 4250.0);
    assert_eq!(body["customer"]["name"], "Jane Doe");

    let items = body["invoice"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["unitPrice"], 125.0);

    let payment_url = body["invoice"]["paymentUrl"].as_str().unwrap();
    assert_eq!(
        payment_url,
        format!(
            "{}/app/payment?invoiceId=130&companyId={}",
            server.url(),
            REALM_ID
        )
    );
}

#[tokio::test]
async fn test_mismatch_and_unknown_customer_look_identical() {
    let mut server = Server::new_async().await;
    let _invoice = mock_invoice(&mut server).await;
    let customer = mock_customer(&mut server, Some("77")).await;
    let app = create_test_app(&server.url(), true);

    let (mismatch_status, mismatch_body) = lookup(
        &app,
        json!({ "invoiceNumber": "130", "email": "jane@example.com" }),
    )
    .await;

    customer.remove_async().await;
    let _customer = mock_customer(&mut server, None).await;

    let (missing_status, missing_body) = lookup(
        &app,
        json!({ "invoiceNumber": "130", "email": "jane@example.com" }),
    )
    .await;

    assert_eq!(mismatch_status, StatusCode::NOT_FOUND);
    assert_eq!(missing_status, StatusCode::NOT_FOUND);
    assert_eq!(mismatch_body, missing_body);
    assert_eq!(mismatch_body["success"], false);
}

#[tokio::test]
async fn test_lookup_validates_input() {
    let server = Server::new_async().await;
    let app = create_test_app(&server.url(), true);

    let (status, body) = lookup(&app, json!({ "invoiceNumber": "130" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");

    let (status, body) = lookup(
        &app,
        json!({ "invoiceNumber": "130", "email": "not-an-email" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid email address");

    let (status, _) = lookup(&app, json!({ "invoiceNumber": "  ", "email": "jane@example.com" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_lookup_unconfigured_is_service_unavailable() {
    let server = Server::new_async().await;
    let app = create_test_app(&server.url(), false);

    let (status, body) = lookup(
        &app,
        json!({ "invoiceNumber": "130", "email": "jane@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("QuickBooks"));
}

#[tokio::test]
async fn test_lookup_retries_once_after_401() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("GET", format!("/v3/company/{}/invoice/130", REALM_ID).as_str())
        .with_status(401)
        .with_body(r#"{"Fault":{"Error":[{"Message":"AuthenticationFailed"}]}}"#)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/quickbooks/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"a2","refresh_token":"r2","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;
    let app = create_test_app(&server.url(), true);

    let (status, body) = lookup(
        &app,
        json!({ "invoiceNumber": "130", "email": "jane@example.com" }),
    )
    .await;

    // Second 401 surfaces as a provider failure, with no third attempt
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    rejected.assert_async().await;
    refresh.assert_async().await;
}
