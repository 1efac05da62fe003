//! SQLite-backed admin repository.

use super::{AdminRepository, AdminUser, DeleteOutcome};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// # Schema
/// ```sql
/// CREATE TABLE admin_users (
///     username TEXT PRIMARY KEY,
///     display_name TEXT NOT NULL,
///     email TEXT,
///     password_hash TEXT NOT NULL,   -- argon2 PHC string
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// ```
pub struct SqliteAdminRepository {
    conn: Mutex<Connection>,
}

impl SqliteAdminRepository {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS admin_users (
                username TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                email TEXT,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create admin_users table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Admin repository lock poisoned"))
    }
}

const SELECT_COLUMNS: &str =
    "SELECT username, display_name, email, password_hash, created_at, updated_at FROM admin_users";

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp '{}'", value))?
        .with_timezone(&Utc))
}

type RawRow = (String, String, Option<String>, String, String, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_user(raw: RawRow) -> Result<AdminUser> {
    let (username, display_name, email, password_hash, created_at, updated_at) = raw;
    Ok(AdminUser {
        username,
        display_name,
        email,
        password_hash,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

impl AdminRepository for SqliteAdminRepository {
    fn find_by_username(&self, username: &str) -> Result<Option<AdminUser>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("{} WHERE username = ?1", SELECT_COLUMNS),
                params![username],
                read_row,
            )
            .optional()
            .context("Failed to query admin user")?;

        raw.map(into_user).transpose()
    }

    fn list(&self) -> Result<Vec<AdminUser>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY username", SELECT_COLUMNS))
            .context("Failed to prepare admin user query")?;

        let rows = stmt
            .query_map([], read_row)
            .context("Failed to list admin users")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read admin user row")?;

        rows.into_iter().map(into_user).collect()
    }

    fn upsert(&self, user: &AdminUser) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO admin_users
                (username, display_name, email, password_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(username) DO UPDATE SET
                display_name = excluded.display_name,
                email = excluded.email,
                password_hash = excluded.password_hash,
                updated_at = excluded.updated_at
            "#,
            params![
                user.username,
                user.display_name,
                user.email,
                user.password_hash,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )
        .context("Failed to save admin user")?;
        Ok(())
    }

    fn delete_unless_last(&self, username: &str) -> Result<DeleteOutcome> {
        let conn = self.conn()?;
        // Single statement so other connections to the same file cannot interleave
        let rows_affected = conn
            .execute(
                "DELETE FROM admin_users WHERE username = ?1 \
                 AND (SELECT COUNT(*) FROM admin_users) > 1",
                params![username],
            )
            .context("Failed to delete admin user")?;
        if rows_affected > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM admin_users WHERE username = ?1)",
                params![username],
                |row| row.get(0),
            )
            .context("Failed to query admin user")?;
        Ok(if exists {
            DeleteOutcome::LastAdmin
        } else {
            DeleteOutcome::NotFound
        })
    }
}
