use anyhow::{Context, Result};
use pumpdesk::api::create_router;
use pumpdesk::config::{config_from_env, load_config};
use pumpdesk::portal::Portal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pumpdesk=info".into()),
        )
        .init();

    info!("Pumpdesk starting...");

    // Config file from PUMPDESK_CONFIG or the first argument, else defaults + env
    let config_path = std::env::var("PUMPDESK_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1));
    let config = match &config_path {
        Some(path) => load_config(path).with_context(|| format!("Failed to load config from {}", path))?,
        None => config_from_env(),
    };

    let encryption_key = std::env::var("PUMPDESK_ENCRYPTION_KEY")
        .context("PUMPDESK_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    info!(
        config_file = ?config_path,
        bind_addr = %config.server.bind_addr,
        public_base_url = %config.server.public_base_url,
        db_path = %config.storage.db_path,
        "Configuration loaded"
    );

    let bind_addr = config.server.bind_addr.clone();
    let portal = Portal::open(config, &encryption_key).context("Failed to initialize portal")?;
    info!("Credential store and admin repository initialized");

    // First admin account, only when none exist yet
    match (
        std::env::var("PUMPDESK_BOOTSTRAP_ADMIN_USERNAME"),
        std::env::var("PUMPDESK_BOOTSTRAP_ADMIN_PASSWORD"),
    ) {
        (Ok(username), Ok(password)) => {
            let created = portal
                .admins
                .bootstrap(&username, &password)
                .context("Failed to create bootstrap admin")?;
            if !created {
                info!("Admin users already exist, bootstrap credentials ignored");
            }
        }
        _ => {
            if portal.admins.list().context("Failed to list admin users")?.is_empty() {
                warn!("No admin users exist; set PUMPDESK_BOOTSTRAP_ADMIN_USERNAME and PUMPDESK_BOOTSTRAP_ADMIN_PASSWORD");
            }
        }
    }

    let router = create_router(portal);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(bind_addr = %bind_addr, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Pumpdesk stopped");

    Ok(())
}
