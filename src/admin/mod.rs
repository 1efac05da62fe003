//! Portal administrators.
//!
//! Admin requests authenticate with HTTP Basic against an [`AdminRepository`].
//! Passwords are stored as argon2 PHC strings and never leave this module in
//! plain form.

mod sqlite;

pub use sqlite::SqliteAdminRepository;

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_USERNAME_LENGTH: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage for admin accounts.
pub trait AdminRepository: Send + Sync {
    fn find_by_username(&self, username: &str) -> Result<Option<AdminUser>>;
    fn list(&self) -> Result<Vec<AdminUser>>;
    /// Insert or replace by username
    fn upsert(&self, user: &AdminUser) -> Result<()>;
    /// Delete `username` unless it is the only account left. The check and
    /// the delete happen as one step.
    fn delete_unless_last(&self, username: &str) -> Result<DeleteOutcome>;
}

/// Result of [`AdminRepository::delete_unless_last`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    LastAdmin,
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("admin user not found")]
    NotFound,

    #[error("cannot delete the last admin user")]
    LastAdmin,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Fields an admin may set on an account. `password` is required on create.
#[derive(Clone, Debug, Default)]
pub struct AdminUserInput {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Stored password hash is invalid: {}", e))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {}", e)),
    }
}

fn validate_username(username: &str) -> Result<(), AdminError> {
    let valid = !username.is_empty()
        && username.len() <= MAX_USERNAME_LENGTH
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@'));

    if valid {
        Ok(())
    } else {
        Err(AdminError::InvalidInput(format!(
            "username must be 1-{} characters of letters, digits, '.', '_', '-' or '@'",
            MAX_USERNAME_LENGTH
        )))
    }
}

fn validate_password(password: &str) -> Result<(), AdminError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AdminError::InvalidInput(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Account operations on top of a repository. All methods block (SQLite and
/// argon2); call them from `spawn_blocking` in async code.
#[derive(Clone)]
pub struct AdminAccounts {
    repository: Arc<dyn AdminRepository>,
}

impl AdminAccounts {
    pub fn new(repository: Arc<dyn AdminRepository>) -> Self {
        Self { repository }
    }

    /// The account, if the username exists and the password matches.
    pub fn verify_credentials(&self, username: &str, password: &str) -> Result<Option<AdminUser>> {
        let Some(user) = self.repository.find_by_username(username)? else {
            return Ok(None);
        };

        if verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub fn list(&self) -> Result<Vec<AdminUser>> {
        self.repository.list()
    }

    /// Create or update an account. Returns the stored user and whether it was created.
    pub fn save_user(&self, username: &str, input: AdminUserInput) -> Result<(AdminUser, bool), AdminError> {
        validate_username(username)?;
        let now = Utc::now();

        let email = input
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        let display_name = input
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let password_hash = match input.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let (user, created) = match self.repository.find_by_username(username)? {
            Some(mut existing) => {
                if let Some(display_name) = display_name {
                    existing.display_name = display_name;
                }
                if email.is_some() {
                    existing.email = email;
                }
                if let Some(hash) = password_hash {
                    existing.password_hash = hash;
                }
                existing.updated_at = now;
                (existing, false)
            }
            None => {
                let password_hash = password_hash.ok_or_else(|| {
                    AdminError::InvalidInput("password is required for a new admin".to_string())
                })?;
                let user = AdminUser {
                    username: username.to_string(),
                    display_name: display_name.unwrap_or_else(|| username.to_string()),
                    email,
                    password_hash,
                    created_at: now,
                    updated_at: now,
                };
                (user, true)
            }
        };

        self.repository.upsert(&user)?;
        info!(username = %user.username, created, "Admin user saved");
        Ok((user, created))
    }

    /// Delete an account; the last remaining admin cannot be deleted.
    pub fn delete_user(&self, username: &str) -> Result<(), AdminError> {
        match self.repository.delete_unless_last(username)? {
            DeleteOutcome::Deleted => {
                info!(username = %username, "Admin user deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(AdminError::NotFound),
            DeleteOutcome::LastAdmin => {
                warn!(username = %username, "Refusing to delete the last admin user");
                Err(AdminError::LastAdmin)
            }
        }
    }

    /// Create the first admin when the repository is empty. Returns true if created.
    pub fn bootstrap(&self, username: &str, password: &str) -> Result<bool, AdminError> {
        if !self.repository.list()?.is_empty() {
            return Ok(false);
        }

        self.save_user(
            username,
            AdminUserInput {
                password: Some(password.to_string()),
                ..AdminUserInput::default()
            },
        )?;
        info!(username = %username, "Bootstrap admin user created");
        Ok(true)
    }
}
