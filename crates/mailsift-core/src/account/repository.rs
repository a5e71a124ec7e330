//! Mail account storage repository.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::model::{AccountId, ImapConfig, MailAccount, SyncPolicy};
use crate::{Error, Result};

/// Repository for mail account storage and retrieval.
///
/// Accounts are soft-deactivated, never deleted, so sync history stays
/// attributable.
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mail_accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                imap_host TEXT NOT NULL,
                imap_port INTEGER NOT NULL,
                imap_use_tls INTEGER NOT NULL DEFAULT 1,
                imap_username TEXT NOT NULL,
                imap_folder TEXT NOT NULL DEFAULT 'INBOX',
                password_encrypted TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                sync_interval_secs INTEGER NOT NULL DEFAULT 300,
                max_messages_per_sync INTEGER NOT NULL DEFAULT 50,
                last_sync_uid INTEGER,
                last_sync_at TEXT,
                last_sync_error TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get all accounts, active first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<MailAccount>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, email, imap_host, imap_port, imap_use_tls, imap_username,
                   imap_folder, password_encrypted, enabled, sync_interval_secs,
                   max_messages_per_sync, last_sync_uid, last_sync_at, last_sync_error
            FROM mail_accounts
            ORDER BY enabled DESC, name ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Get all accounts with scheduled syncing enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active(&self) -> Result<Vec<MailAccount>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, email, imap_host, imap_port, imap_use_tls, imap_username,
                   imap_folder, password_encrypted, enabled, sync_interval_secs,
                   max_messages_per_sync, last_sync_uid, last_sync_at, last_sync_error
            FROM mail_accounts
            WHERE enabled = 1
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Get account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: AccountId) -> Result<Option<MailAccount>> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, imap_host, imap_port, imap_use_tls, imap_username,
                   imap_folder, password_encrypted, enabled, sync_interval_secs,
                   max_messages_per_sync, last_sync_uid, last_sync_at, last_sync_error
            FROM mail_accounts
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// Get account by ID, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::AccountNotFound` for unknown ids.
    pub async fn require(&self, id: AccountId) -> Result<MailAccount> {
        self.get(id).await?.ok_or(Error::AccountNotFound(id.0))
    }

    /// Insert a new account, assigning its id.
    ///
    /// The password must already be vault-encrypted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn create(&self, account: &mut MailAccount) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO mail_accounts (
                name, email, imap_host, imap_port, imap_use_tls, imap_username,
                imap_folder, password_encrypted, enabled, sync_interval_secs,
                max_messages_per_sync
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.imap.host)
        .bind(i64::from(account.imap.port))
        .bind(account.imap.use_tls)
        .bind(&account.imap.username)
        .bind(&account.imap.folder)
        .bind(&account.password_encrypted)
        .bind(account.policy.enabled)
        .bind(i64::from(account.policy.interval_secs))
        .bind(i64::from(account.policy.max_messages_per_sync))
        .execute(&self.pool)
        .await?;

        account.id = Some(AccountId::new(result.last_insert_rowid()));
        debug!(account = %account.email, "created mail account");
        Ok(())
    }

    /// Update connection configuration and sync policy for an account.
    ///
    /// Sync state columns are left untouched; they belong to the engine.
    ///
    /// # Errors
    ///
    /// Returns `Error::AccountNotFound` for unknown ids.
    pub async fn update(&self, account: &MailAccount) -> Result<()> {
        let Some(id) = account.id else {
            return Err(Error::Config("cannot update unsaved account".to_string()));
        };

        let result = sqlx::query(
            r"
            UPDATE mail_accounts SET
                name = ?, email = ?, imap_host = ?, imap_port = ?, imap_use_tls = ?,
                imap_username = ?, imap_folder = ?, enabled = ?,
                sync_interval_secs = ?, max_messages_per_sync = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            ",
        )
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.imap.host)
        .bind(i64::from(account.imap.port))
        .bind(account.imap.use_tls)
        .bind(&account.imap.username)
        .bind(&account.imap.folder)
        .bind(account.policy.enabled)
        .bind(i64::from(account.policy.interval_secs))
        .bind(i64::from(account.policy.max_messages_per_sync))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AccountNotFound(id.0));
        }
        Ok(())
    }

    /// Replace the stored (encrypted) password.
    ///
    /// # Errors
    ///
    /// Returns `Error::AccountNotFound` for unknown ids.
    pub async fn rotate_password(&self, id: AccountId, password_encrypted: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE mail_accounts SET password_encrypted = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(password_encrypted)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AccountNotFound(id.0));
        }
        debug!(account_id = id.0, "rotated account credentials");
        Ok(())
    }

    /// Soft-deactivate an account: scheduled syncing stops, history stays.
    ///
    /// # Errors
    ///
    /// Returns `Error::AccountNotFound` for unknown ids.
    pub async fn deactivate(&self, id: AccountId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE mail_accounts SET enabled = 0, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AccountNotFound(id.0));
        }
        Ok(())
    }

    /// Record a successful run: bump the watermark when one was observed,
    /// stamp the sync time, clear any previous error.
    ///
    /// Called only by the sync engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn update_sync_state(
        &self,
        id: AccountId,
        new_watermark: Option<u32>,
    ) -> Result<()> {
        if let Some(uid) = new_watermark {
            sqlx::query(
                r"
                UPDATE mail_accounts
                SET last_sync_uid = ?, last_sync_at = ?, last_sync_error = NULL
                WHERE id = ?
                ",
            )
            .bind(i64::from(uid))
            .bind(Utc::now().to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE mail_accounts SET last_sync_at = ?, last_sync_error = NULL WHERE id = ?",
            )
            .bind(Utc::now().to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Record a failed run without touching the watermark.
    ///
    /// Called only by the sync engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn record_sync_error(&self, id: AccountId, message: &str) -> Result<()> {
        sqlx::query("UPDATE mail_accounts SET last_sync_error = ? WHERE id = ?")
            .bind(message)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Convert a database row to a `MailAccount`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> MailAccount {
    MailAccount {
        id: Some(AccountId::new(row.get("id"))),
        name: row.get("name"),
        email: row.get("email"),
        imap: ImapConfig {
            host: row.get("imap_host"),
            port: row.get::<i64, _>("imap_port") as u16,
            use_tls: row.get::<i64, _>("imap_use_tls") != 0,
            username: row.get("imap_username"),
            folder: row.get("imap_folder"),
        },
        password_encrypted: row.get("password_encrypted"),
        policy: SyncPolicy {
            enabled: row.get::<i64, _>("enabled") != 0,
            interval_secs: row.get::<i64, _>("sync_interval_secs") as u32,
            max_messages_per_sync: row.get::<i64, _>("max_messages_per_sync") as u32,
        },
        last_sync_uid: row
            .get::<Option<i64>, _>("last_sync_uid")
            .map(|uid| uid as u32),
        last_sync_at: row
            .get::<Option<String>, _>("last_sync_at")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc)),
        last_sync_error: row.get("last_sync_error"),
    }
}
