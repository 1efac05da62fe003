use super::PortalConfig;
use tracing::warn;

/// Apply `PUMPDESK_*` environment variables on top of file/default values.
///
/// Unparseable values are ignored with a warning and the previous value is kept.
pub(super) fn apply_env_overrides(config: &mut PortalConfig) {
    if let Ok(v) = std::env::var("PUMPDESK_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Ok(v) = std::env::var("PUMPDESK_PUBLIC_BASE_URL") {
        config.server.public_base_url = v;
    }
    if let Ok(v) = std::env::var("PUMPDESK_CORS_ORIGIN") {
        config.server.cors_allowed_origin = Some(v);
    }
    if let Ok(v) = std::env::var("PUMPDESK_DB_PATH") {
        config.storage.db_path = v;
    }
    if let Ok(v) = std::env::var("PUMPDESK_HTTP_TIMEOUT_SECONDS") {
        match v.parse::<u64>() {
            Ok(n) if n > 0 => config.http.timeout_seconds = n,
            _ => warn!(value = %v, "Ignoring invalid PUMPDESK_HTTP_TIMEOUT_SECONDS"),
        }
    }
    if let Ok(v) = std::env::var("PUMPDESK_ALLOW_MANUAL_TEST_STATE") {
        match v.parse::<bool>() {
            Ok(b) => config.oauth.allow_manual_test_state = b,
            Err(_) => warn!(value = %v, "Ignoring invalid PUMPDESK_ALLOW_MANUAL_TEST_STATE"),
        }
    }
}
