mod env;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Accepted range for `http.timeout_seconds`
const TIMEOUT_SECONDS_RANGE: (u64, u64) = (1, 600);

/// Accepted range for `oauth.state_expiry_seconds`
const STATE_EXPIRY_SECONDS_RANGE: (i64, i64) = (1, 86_400);

/// Complete portal configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub oauth: OAuthFlowConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Externally visible origin, used to derive OAuth redirect URIs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Admin settings page the OAuth callback redirects back to
    #[serde(default = "default_settings_page")]
    pub settings_page: String,
    /// Allowed CORS origin for the admin UI. None = same-origin only.
    #[serde(default)]
    pub cors_allowed_origin: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_settings_page() -> String {
    "/admin/settings.html".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_base_url: default_public_base_url(),
            settings_page: default_settings_page(),
            cors_allowed_origin: None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding integration settings, tokens and admin users
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "pumpdesk.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout for provider calls (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("pumpdesk/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

/// OAuth authorization flow configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthFlowConfig {
    /// How long an issued CSRF state stays valid (seconds)
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    /// Accept the literal `manual_test` state on callbacks. Development only.
    #[serde(default)]
    pub allow_manual_test_state: bool,
}

fn default_state_expiry() -> i64 {
    600
}

impl Default for OAuthFlowConfig {
    fn default() -> Self {
        Self {
            state_expiry_seconds: default_state_expiry(),
            allow_manual_test_state: false,
        }
    }
}

/// Provider endpoint URLs. Overridable so tests can point at a mock server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub quickbooks: QuickBooksEndpointsConfig,
    #[serde(default)]
    pub gmail: GmailEndpointsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuickBooksEndpointsConfig {
    #[serde(default = "default_qb_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_qb_token_url")]
    pub token_url: String,
    #[serde(default = "default_qb_sandbox_api_base")]
    pub sandbox_api_base: String,
    #[serde(default = "default_qb_production_api_base")]
    pub production_api_base: String,
    #[serde(default = "default_qb_sandbox_app_base")]
    pub sandbox_app_base: String,
    #[serde(default = "default_qb_production_app_base")]
    pub production_app_base: String,
}

fn default_qb_auth_url() -> String {
    "https://appcenter.intuit.com/connect/oauth2".to_string()
}

fn default_qb_token_url() -> String {
    "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer".to_string()
}

fn default_qb_sandbox_api_base() -> String {
    "https://sandbox-quickbooks.api.intuit.com".to_string()
}

fn default_qb_production_api_base() -> String {
    "https://quickbooks.api.intuit.com".to_string()
}

fn default_qb_sandbox_app_base() -> String {
    "https://app.sandbox.qbo.intuit.com".to_string()
}

fn default_qb_production_app_base() -> String {
    "https://app.qbo.intuit.com".to_string()
}

impl Default for QuickBooksEndpointsConfig {
    fn default() -> Self {
        Self {
            auth_url: default_qb_auth_url(),
            token_url: default_qb_token_url(),
            sandbox_api_base: default_qb_sandbox_api_base(),
            production_api_base: default_qb_production_api_base(),
            sandbox_app_base: default_qb_sandbox_app_base(),
            production_app_base: default_qb_production_app_base(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailEndpointsConfig {
    #[serde(default = "default_gmail_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_gmail_token_url")]
    pub token_url: String,
    #[serde(default = "default_gmail_api_base")]
    pub api_base: String,
}

fn default_gmail_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_gmail_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com".to_string()
}

impl Default for GmailEndpointsConfig {
    fn default() -> Self {
        Self {
            auth_url: default_gmail_auth_url(),
            token_url: default_gmail_token_url(),
            api_base: default_gmail_api_base(),
        }
    }
}

impl PortalConfig {
    /// Point every provider endpoint at one base URL (mock servers in tests).
    pub fn with_provider_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.providers.quickbooks = QuickBooksEndpointsConfig {
            auth_url: format!("{}/connect/oauth2", base),
            token_url: format!("{}/quickbooks/token", base),
            sandbox_api_base: base.to_string(),
            production_api_base: base.to_string(),
            sandbox_app_base: base.to_string(),
            production_app_base: base.to_string(),
        };
        self.providers.gmail = GmailEndpointsConfig {
            auth_url: format!("{}/o/oauth2/auth", base),
            token_url: format!("{}/gmail/token", base),
            api_base: base.to_string(),
        };
        self
    }

    /// Clamp numeric settings into ranges the HTTP client and state store can use.
    pub fn normalize(&mut self) {
        let (min, max) = TIMEOUT_SECONDS_RANGE;
        if !(min..=max).contains(&self.http.timeout_seconds) {
            let clamped = self.http.timeout_seconds.clamp(min, max);
            warn!(
                configured = self.http.timeout_seconds,
                using = clamped,
                "http.timeout_seconds out of range"
            );
            self.http.timeout_seconds = clamped;
        }

        let (min, max) = STATE_EXPIRY_SECONDS_RANGE;
        if !(min..=max).contains(&self.oauth.state_expiry_seconds) {
            let clamped = self.oauth.state_expiry_seconds.clamp(min, max);
            warn!(
                configured = self.oauth.state_expiry_seconds,
                using = clamped,
                "oauth.state_expiry_seconds out of range"
            );
            self.oauth.state_expiry_seconds = clamped;
        }
    }
}

/// Load configuration from a TOML file, then apply environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PortalConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut config: PortalConfig =
        toml::from_str(&contents).context("Failed to parse config file")?;
    env::apply_env_overrides(&mut config);
    config.normalize();
    Ok(config)
}

/// Defaults plus environment overrides, for running without a config file
pub fn config_from_env() -> PortalConfig {
    let mut config = PortalConfig::default();
    env::apply_env_overrides(&mut config);
    config.normalize();
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortalConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.server.settings_page, "/admin/settings.html");
        assert_eq!(config.http.timeout_seconds, 30);
        assert_eq!(config.oauth.state_expiry_seconds, 600);
        assert!(!config.oauth.allow_manual_test_state);
        assert_eq!(
            config.providers.quickbooks.token_url,
            "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer"
        );
        assert_eq!(config.providers.gmail.token_url, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:9000"
            public_base_url = "https://heatpumps.example.com"
            cors_allowed_origin = "https://heatpumps.example.com"

            [storage]
            db_path = "/var/lib/pumpdesk/portal.db"

            [http]
            timeout_seconds = 10

            [oauth]
            state_expiry_seconds = 120
            allow_manual_test_state = true

            [providers.gmail]
            api_base = "http://localhost:9999"
        "#;

        let config: PortalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.server.public_base_url, "https://heatpumps.example.com");
        assert_eq!(
            config.server.cors_allowed_origin.as_deref(),
            Some("https://heatpumps.example.com")
        );
        assert_eq!(config.storage.db_path, "/var/lib/pumpdesk/portal.db");
        assert_eq!(config.http.timeout_seconds, 10);
        assert_eq!(config.oauth.state_expiry_seconds, 120);
        assert!(config.oauth.allow_manual_test_state);
        assert_eq!(config.providers.gmail.api_base, "http://localhost:9999");
        // Unset fields in a present section keep their defaults
        assert_eq!(config.providers.gmail.token_url, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [http]
            timeout_seconds = 5
        "#;

        let config: PortalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.http.timeout_seconds, 5);
        assert_eq!(config.storage.db_path, "pumpdesk.db");
        assert_eq!(
            config.providers.quickbooks.sandbox_api_base,
            "https://sandbox-quickbooks.api.intuit.com"
        );
    }

    #[test]
    fn test_with_provider_base_url() {
        let config = PortalConfig::default().with_provider_base_url("http://127.0.0.1:1234/");
        assert_eq!(
            config.providers.quickbooks.token_url,
            "http://127.0.0.1:1234/quickbooks/token"
        );
        assert_eq!(config.providers.gmail.api_base, "http://127.0.0.1:1234");
    }

    #[test]
    fn test_normalize_clamps_out_of_range_values() {
        let toml = r#"
            [http]
            timeout_seconds = 0

            [oauth]
            state_expiry_seconds = 9999999999999999
        "#;

        let mut config: PortalConfig = toml::from_str(toml).unwrap();
        config.normalize();
        assert_eq!(config.http.timeout_seconds, 1);
        assert_eq!(config.oauth.state_expiry_seconds, 86_400);

        let mut config = PortalConfig::default();
        config.normalize();
        assert_eq!(config.http.timeout_seconds, 30);
        assert_eq!(config.oauth.state_expiry_seconds, 600);
    }

    #[test]
    fn test_load_config_normalizes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[oauth]\nstate_expiry_seconds = -5\n").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.oauth.state_expiry_seconds, 1);
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/pumpdesk.toml").is_err());
    }
}
