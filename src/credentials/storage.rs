//! SQLite-backed storage for integration settings and tokens.

use super::{IntegrationConfig, SecretBox, TokenSet};
use crate::integration::{Environment, Integration};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Encrypted store for integration settings and OAuth tokens.
///
/// # Schema
/// ```sql
/// CREATE TABLE integration_configs (
///     integration TEXT PRIMARY KEY,     -- "quickbooks" | "gmail"
///     client_id TEXT NOT NULL,
///     client_secret TEXT,               -- Encrypted
///     client_secret_nonce TEXT,
///     account_id TEXT NOT NULL,         -- QuickBooks realm ID
///     environment TEXT NOT NULL,        -- "sandbox" | "production"
///     redirect_uri TEXT NOT NULL,
///     scope TEXT NOT NULL,
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
///
/// CREATE TABLE integration_tokens (
///     integration TEXT PRIMARY KEY,
///     access_token TEXT NOT NULL,       -- Encrypted
///     access_token_nonce TEXT NOT NULL,
///     refresh_token TEXT,               -- Encrypted (optional)
///     refresh_token_nonce TEXT,
///     expires_at TEXT NOT NULL,         -- RFC 3339
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// ```
///
/// All reads and writes go through one connection behind a mutex, so
/// read-modify-write sequences from concurrent requests never interleave
/// inside a statement.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    secrets: SecretBox,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let secrets = SecretBox::from_base64_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS integration_configs (
                integration TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                client_secret TEXT,
                client_secret_nonce TEXT,
                account_id TEXT NOT NULL,
                environment TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS integration_tokens (
                integration TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                access_token_nonce TEXT NOT NULL,
                refresh_token TEXT,
                refresh_token_nonce TEXT,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create credential tables")?;

        Ok(Self {
            conn: Mutex::new(conn),
            secrets,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }

    /// Returns the saved settings, or an empty config if none were saved.
    pub fn load_config(&self, integration: Integration) -> Result<IntegrationConfig> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT client_id, client_secret, client_secret_nonce,
                       account_id, environment, redirect_uri, scope
                FROM integration_configs
                WHERE integration = ?1
                "#,
                params![integration.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .context("Failed to read integration config")?;

        let Some((client_id, secret, secret_nonce, account_id, environment, redirect_uri, scope)) =
            row
        else {
            return Ok(IntegrationConfig::empty(integration));
        };

        let client_secret = self
            .secrets
            .open_columns(secret, secret_nonce)
            .context("Failed to decrypt client secret")?
            .unwrap_or_default();

        Ok(IntegrationConfig {
            client_id,
            client_secret,
            account_id,
            environment: environment.parse::<Environment>()?,
            redirect_uri,
            scope,
        })
    }

    /// Saves settings for an integration, replacing any previous values.
    ///
    /// Credentials are not validated here; bad ones surface when first used.
    pub fn save_config(&self, integration: Integration, config: &IntegrationConfig) -> Result<()> {
        let secret = self
            .secrets
            .seal_optional(Some(config.client_secret.as_str()))
            .context("Failed to encrypt client secret")?;
        let (secret_ciphertext, secret_nonce) = match secret {
            Some(sealed) => (Some(sealed.ciphertext), Some(sealed.nonce)),
            None => (None, None),
        };
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO integration_configs (
                    integration, client_id, client_secret, client_secret_nonce,
                    account_id, environment, redirect_uri, scope,
                    created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                ON CONFLICT(integration) DO UPDATE SET
                    client_id = excluded.client_id,
                    client_secret = excluded.client_secret,
                    client_secret_nonce = excluded.client_secret_nonce,
                    account_id = excluded.account_id,
                    environment = excluded.environment,
                    redirect_uri = excluded.redirect_uri,
                    scope = excluded.scope,
                    updated_at = excluded.updated_at
                "#,
                params![
                    integration.as_str(),
                    config.client_id,
                    secret_ciphertext,
                    secret_nonce,
                    config.account_id,
                    config.environment.as_str(),
                    config.redirect_uri,
                    config.scope,
                    now,
                ],
            )
            .context("Failed to save integration config")?;

        Ok(())
    }

    /// Retrieves tokens for an integration, if any were stored.
    pub fn get_tokens(&self, integration: Integration) -> Result<Option<TokenSet>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT access_token, access_token_nonce,
                       refresh_token, refresh_token_nonce,
                       expires_at
                FROM integration_tokens
                WHERE integration = ?1
                "#,
                params![integration.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to read tokens")?;

        let Some((access, access_nonce, refresh, refresh_nonce, expires_at)) = row else {
            return Ok(None);
        };

        let access_token = self
            .secrets
            .open(&super::Sealed {
                ciphertext: access,
                nonce: access_nonce,
            })
            .context("Failed to decrypt access token")?;

        let refresh_token = self
            .secrets
            .open_columns(refresh, refresh_nonce)
            .context("Failed to decrypt refresh token")?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .context("Failed to parse expires_at timestamp")?;

        Ok(Some(TokenSet {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// Stores tokens for an integration, overwriting the previous set.
    pub fn store_tokens(&self, integration: Integration, tokens: &TokenSet) -> Result<()> {
        let access = self
            .secrets
            .seal(&tokens.access_token)
            .context("Failed to encrypt access token")?;
        let (refresh_ciphertext, refresh_nonce) =
            match self
                .secrets
                .seal_optional(tokens.refresh_token.as_deref())
                .context("Failed to encrypt refresh token")?
            {
                Some(sealed) => (Some(sealed.ciphertext), Some(sealed.nonce)),
                None => (None, None),
            };
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO integration_tokens (
                    integration,
                    access_token, access_token_nonce,
                    refresh_token, refresh_token_nonce,
                    expires_at, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                ON CONFLICT(integration) DO UPDATE SET
                    access_token = excluded.access_token,
                    access_token_nonce = excluded.access_token_nonce,
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    integration.as_str(),
                    access.ciphertext,
                    access.nonce,
                    refresh_ciphertext,
                    refresh_nonce,
                    tokens.expires_at.to_rfc3339(),
                    now,
                ],
            )
            .context("Failed to store tokens")?;

        Ok(())
    }

    /// Deletes tokens for an integration.
    ///
    /// # Returns
    /// * `Ok(true)` - Tokens deleted
    /// * `Ok(false)` - No tokens were stored
    pub fn delete_tokens(&self, integration: Integration) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute(
                "DELETE FROM integration_tokens WHERE integration = ?1",
                params![integration.as_str()],
            )
            .context("Failed to delete tokens")?;

        Ok(rows_affected > 0)
    }
}
