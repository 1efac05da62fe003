//! Service wiring shared by the HTTP layer and the binary.

use crate::admin::{AdminAccounts, AdminRepository, SqliteAdminRepository};
use crate::config::PortalConfig;
use crate::credentials::CredentialStore;
use crate::error::{IntegrationError, IntegrationResult};
use crate::integration::Integration;
use crate::oauth::{AuthorizationFlow, ConnectionState, TokenManager};
use crate::remote::{build_http_client, GmailClient, QuickBooksClient, RemoteClient};
use crate::sync::{InquiryService, InvoiceService};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a live call made to prove the stored tokens work.
#[derive(Clone, Debug, Serialize)]
pub struct ApiTest {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    pub integration: Integration,
    pub state: ConnectionState,
    pub configured: bool,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_test: Option<ApiTest>,
}

pub struct Portal {
    pub config: PortalConfig,
    pub store: Arc<CredentialStore>,
    pub tokens: Arc<TokenManager>,
    pub flow: AuthorizationFlow,
    pub quickbooks: QuickBooksClient,
    pub gmail: GmailClient,
    pub invoices: InvoiceService,
    pub inquiries: InquiryService,
    pub admins: AdminAccounts,
}

impl Portal {
    /// Build the services on one store and one HTTP client.
    pub fn new(
        config: PortalConfig,
        store: Arc<CredentialStore>,
        admin_repository: Arc<dyn AdminRepository>,
    ) -> Result<Self> {
        let http = build_http_client(&config.http)?;
        let tokens = Arc::new(TokenManager::new(
            store.clone(),
            http.clone(),
            config.providers.clone(),
        ));
        let flow = AuthorizationFlow::new(store.clone(), tokens.clone(), http.clone(), &config);
        let remote = Arc::new(RemoteClient::new(
            store.clone(),
            tokens.clone(),
            http,
            config.providers.clone(),
        ));

        let quickbooks = QuickBooksClient::new(remote.clone());
        let gmail = GmailClient::new(remote);

        Ok(Self {
            invoices: InvoiceService::new(quickbooks.clone(), store.clone(), config.providers.clone()),
            inquiries: InquiryService::new(gmail.clone()),
            admins: AdminAccounts::new(admin_repository),
            quickbooks,
            gmail,
            flow,
            tokens,
            store,
            config,
        })
    }

    /// Open the credential store and admin repository at `storage.db_path`.
    pub fn open(config: PortalConfig, encryption_key: &str) -> Result<Self> {
        let store = Arc::new(
            CredentialStore::new(&config.storage.db_path, encryption_key)
                .context("Failed to open credential store")?,
        );
        let admins = Arc::new(
            SqliteAdminRepository::new(&config.storage.db_path)
                .context("Failed to open admin repository")?,
        );
        Self::new(config, store, admins)
    }

    /// Connection state plus, when authenticated, a live call to the provider.
    pub async fn status(&self, integration: Integration) -> IntegrationResult<IntegrationStatus> {
        let state = self.flow.connection_state(integration)?;
        let configured = state != ConnectionState::Unconfigured;
        let authenticated = state == ConnectionState::Authenticated;

        let api_test = if authenticated {
            Some(self.api_test(integration).await)
        } else {
            None
        };

        Ok(IntegrationStatus {
            integration,
            state,
            configured,
            authenticated,
            api_test,
        })
    }

    async fn api_test(&self, integration: Integration) -> ApiTest {
        let result: IntegrationResult<Value> = match integration {
            Integration::QuickBooks => self
                .quickbooks
                .company_info()
                .await
                .map(|info| json!({ "companyName": info.company_name, "country": info.country })),
            Integration::Gmail => self
                .gmail
                .profile()
                .await
                .map(|profile| json!({ "emailAddress": profile.email_address, "messagesTotal": profile.messages_total })),
        };

        match result {
            Ok(details) => {
                debug!(integration = %integration, "Live API test succeeded");
                ApiTest {
                    success: true,
                    details: Some(details),
                    error: None,
                }
            }
            Err(e) => {
                warn!(integration = %integration, error = %e, "Live API test failed");
                ApiTest {
                    success: false,
                    details: None,
                    error: Some(api_test_error(&e)),
                }
            }
        }
    }
}

fn api_test_error(err: &IntegrationError) -> String {
    match err {
        IntegrationError::Storage(_) => "credential store error".to_string(),
        other => other.to_string(),
    }
}
