//! Sync run log.
//!
//! One append-only row per sync attempt. A row is opened as `running` when
//! the attempt starts and finalized exactly once with its counts, error
//! list, and duration; nothing updates it afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::account::AccountId;
use crate::{Error, Result};

/// What triggered a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    /// Fired by the account poller.
    Scheduled,
    /// Triggered out-of-band by an administrator.
    Manual,
}

impl RunType {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "manual" => Self::Manual,
            _ => Self::Scheduled,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

/// Terminal (or in-flight) status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The run is still executing.
    Running,
    /// Every message in the batch was ingested.
    Success,
    /// The batch completed with per-message or per-attachment failures.
    Partial,
    /// A connection-level failure aborted the run.
    Error,
}

impl RunStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "success" => Self::Success,
            "partial" => Self::Partial,
            "error" => Self::Error,
            _ => Self::Running,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }
}

/// One structured error recorded during a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunError {
    /// UID of the affected message, when the error is message-scoped.
    pub uid: Option<u32>,
    /// Pipeline stage that failed (connect, parse, persist, attachment).
    pub stage: String,
    /// Human-readable failure description.
    pub message: String,
}

impl RunError {
    /// Creates an error entry.
    #[must_use]
    pub fn new(uid: Option<u32>, stage: &str, message: impl Into<String>) -> Self {
        Self {
            uid,
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    /// Messages fetched and successfully normalized.
    pub fetched: u32,
    /// Messages persisted for the first time.
    pub new_messages: u32,
    /// Known messages whose protocol flags were refreshed.
    pub updated_messages: u32,
    /// Attachments written to the store.
    pub attachments_saved: u32,
}

/// One row of the sync log.
#[derive(Debug, Clone)]
pub struct SyncRun {
    /// Unique identifier.
    pub id: i64,
    /// Account the run belongs to.
    pub account_id: AccountId,
    /// What triggered the run.
    pub run_type: RunType,
    /// Run status.
    pub status: RunStatus,
    /// Accumulated counters.
    pub counts: RunCounts,
    /// Number of recorded errors.
    pub error_count: u32,
    /// Structured error list.
    pub errors: Vec<RunError>,
    /// When the run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<i64>,
}

/// Repository for the append-only sync log.
pub struct SyncLogRepository {
    pool: SqlitePool,
}

impl SyncLogRepository {
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
            CREATE TABLE IF NOT EXISTS email_sync_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                run_type TEXT NOT NULL DEFAULT 'scheduled',
                status TEXT NOT NULL DEFAULT 'running',
                fetched INTEGER NOT NULL DEFAULT 0,
                new_messages INTEGER NOT NULL DEFAULT 0,
                updated_messages INTEGER NOT NULL DEFAULT 0,
                attachments_saved INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                errors_json TEXT NOT NULL DEFAULT '[]',
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_sync_log_account
            ON email_sync_log(account_id, started_at DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Open a `running` row for a new attempt. Returns the row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn start_run(&self, account_id: AccountId, run_type: RunType) -> Result<i64> {
        let result = sqlx::query(
            r"
            INSERT INTO email_sync_log (account_id, run_type, status, started_at)
            VALUES (?, ?, 'running', ?)
            ",
        )
        .bind(account_id.0)
        .bind(run_type.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Finalize a run with its terminal status, counts, and errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not exist or the query fails.
    pub async fn finalize_run(
        &self,
        run_id: i64,
        status: RunStatus,
        counts: RunCounts,
        errors: &[RunError],
        duration_ms: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE email_sync_log SET
                status = ?, fetched = ?, new_messages = ?, updated_messages = ?,
                attachments_saved = ?, error_count = ?, errors_json = ?,
                finished_at = ?, duration_ms = ?
            WHERE id = ?
            ",
        )
        .bind(status.as_str())
        .bind(i64::from(counts.fetched))
        .bind(i64::from(counts.new_messages))
        .bind(i64::from(counts.updated_messages))
        .bind(i64::from(counts.attachments_saved))
        .bind(i64::try_from(errors.len()).unwrap_or(i64::MAX))
        .bind(serde_json::to_string(errors)?)
        .bind(Utc::now().to_rfc3339())
        .bind(duration_ms)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Config(format!("unknown sync run {run_id}")));
        }
        Ok(())
    }

    /// Get a run by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, run_id: i64) -> Result<Option<SyncRun>> {
        let row = sqlx::query("SELECT * FROM email_sync_log WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_run))
    }

    /// Most recent runs for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<SyncRun>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM email_sync_log
            WHERE account_id = ?
            ORDER BY id DESC
            LIMIT ?
            ",
        )
        .bind(account_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_run).collect())
    }
}

/// Convert a database row to a `SyncRun`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> SyncRun {
    let parse_time = |column: &str| -> Option<DateTime<Utc>> {
        row.get::<Option<String>, _>(column)
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    };

    SyncRun {
        id: row.get("id"),
        account_id: AccountId::new(row.get("account_id")),
        run_type: RunType::parse(row.get("run_type")),
        status: RunStatus::parse(row.get("status")),
        counts: RunCounts {
            fetched: row.get::<i64, _>("fetched") as u32,
            new_messages: row.get::<i64, _>("new_messages") as u32,
            updated_messages: row.get::<i64, _>("updated_messages") as u32,
            attachments_saved: row.get::<i64, _>("attachments_saved") as u32,
        },
        error_count: row.get::<i64, _>("error_count") as u32,
        errors: serde_json::from_str(row.get::<String, _>("errors_json").as_str())
            .unwrap_or_default(),
        started_at: parse_time("started_at"),
        finished_at: parse_time("finished_at"),
        duration_ms: row.get("duration_ms"),
    }
}
