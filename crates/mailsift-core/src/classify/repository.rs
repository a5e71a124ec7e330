//! Classification rule storage repository.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{ClassificationRule, MatchMode, RuleType};
use crate::{Error, Result};

/// Repository for classification rules.
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
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
            CREATE TABLE IF NOT EXISTS email_classification_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT NOT NULL,
                match_mode TEXT NOT NULL DEFAULT 'contains',
                rule_type TEXT NOT NULL DEFAULT 'subject_keyword',
                label TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0.8,
                priority INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                times_matched INTEGER NOT NULL DEFAULT 0,
                last_matched_at TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_rules_active_priority
            ON email_classification_rules(active, priority DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get active rules in evaluation order: priority descending, ties
    /// broken by confidence descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active(&self) -> Result<Vec<ClassificationRule>> {
        let rows = sqlx::query(
            r"
            SELECT id, pattern, match_mode, rule_type, label, confidence, priority,
                   active, times_matched, last_matched_at
            FROM email_classification_rules
            WHERE active = 1
            ORDER BY priority DESC, confidence DESC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_rule).collect())
    }

    /// Get all rules, evaluation order first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<ClassificationRule>> {
        let rows = sqlx::query(
            r"
            SELECT id, pattern, match_mode, rule_type, label, confidence, priority,
                   active, times_matched, last_matched_at
            FROM email_classification_rules
            ORDER BY active DESC, priority DESC, confidence DESC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_rule).collect())
    }

    /// Get a rule by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: i64) -> Result<Option<ClassificationRule>> {
        let row = sqlx::query(
            r"
            SELECT id, pattern, match_mode, rule_type, label, confidence, priority,
                   active, times_matched, last_matched_at
            FROM email_classification_rules
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_rule))
    }

    /// Insert a new rule, assigning its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn create(&self, rule: &mut ClassificationRule) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO email_classification_rules
                (pattern, match_mode, rule_type, label, confidence, priority, active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&rule.pattern)
        .bind(rule.match_mode.as_str())
        .bind(rule.rule_type.as_str())
        .bind(&rule.label)
        .bind(rule.confidence)
        .bind(i64::from(rule.priority))
        .bind(rule.active)
        .execute(&self.pool)
        .await?;

        rule.id = Some(result.last_insert_rowid());
        Ok(())
    }

    /// Update an existing rule.
    ///
    /// # Errors
    ///
    /// Returns `Error::RuleNotFound` for unknown ids.
    pub async fn update(&self, rule: &ClassificationRule) -> Result<()> {
        let Some(id) = rule.id else {
            return Err(Error::Config("cannot update unsaved rule".to_string()));
        };

        let result = sqlx::query(
            r"
            UPDATE email_classification_rules SET
                pattern = ?, match_mode = ?, rule_type = ?, label = ?,
                confidence = ?, priority = ?, active = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            ",
        )
        .bind(&rule.pattern)
        .bind(rule.match_mode.as_str())
        .bind(rule.rule_type.as_str())
        .bind(&rule.label)
        .bind(rule.confidence)
        .bind(i64::from(rule.priority))
        .bind(rule.active)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::RuleNotFound(id));
        }
        Ok(())
    }

    /// Delete a rule.
    ///
    /// # Errors
    ///
    /// Returns `Error::RuleNotFound` for unknown ids.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM email_classification_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::RuleNotFound(id));
        }
        Ok(())
    }

    /// Bump a rule's usage counters after a match.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn record_match(&self, id: i64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE email_classification_rules
            SET times_matched = times_matched + 1, last_matched_at = ?
            WHERE id = ?
            ",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Convert a database row to a `ClassificationRule`.
#[allow(clippy::cast_possible_truncation)]
fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> ClassificationRule {
    ClassificationRule {
        id: Some(row.get("id")),
        pattern: row.get("pattern"),
        match_mode: MatchMode::parse(row.get("match_mode")),
        rule_type: RuleType::parse(row.get("rule_type")),
        label: row.get("label"),
        confidence: row.get("confidence"),
        priority: row.get::<i64, _>("priority") as i32,
        active: row.get::<i64, _>("active") != 0,
        times_matched: row.get("times_matched"),
        last_matched_at: row
            .get::<Option<String>, _>("last_matched_at")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}
