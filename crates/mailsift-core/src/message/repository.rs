//! Message and attachment-metadata storage repository.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::model::{Direction, Email, EmailAddress, FlagPatch, MessageFilter};
use crate::account::AccountId;
use crate::attachment::AttachmentRecord;
use crate::classify::Classification;
use crate::{Error, Result};

/// Repository for persisted messages and their attachment metadata.
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
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
            CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                direction TEXT NOT NULL DEFAULT 'inbound',
                message_id TEXT,
                thread_id TEXT NOT NULL DEFAULT '',
                from_json TEXT NOT NULL DEFAULT '[]',
                to_json TEXT NOT NULL DEFAULT '[]',
                cc_json TEXT NOT NULL DEFAULT '[]',
                bcc_json TEXT NOT NULL DEFAULT '[]',
                reply_to_json TEXT NOT NULL DEFAULT '[]',
                subject TEXT NOT NULL DEFAULT '',
                body_text TEXT NOT NULL DEFAULT '',
                body_html TEXT,
                body_html_raw TEXT,
                snippet TEXT NOT NULL DEFAULT '',
                classification TEXT NOT NULL DEFAULT 'unknown',
                classification_confidence REAL NOT NULL DEFAULT 0,
                classified_by_rule INTEGER,
                uid INTEGER NOT NULL,
                folder TEXT NOT NULL,
                flags TEXT NOT NULL DEFAULT '',
                is_read INTEGER NOT NULL DEFAULT 0,
                is_starred INTEGER NOT NULL DEFAULT 0,
                is_archived INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                attachment_count INTEGER NOT NULL DEFAULT 0,
                date TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Message-ID is unique when present.
        sqlx::query(
            r"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_emails_message_id
            ON emails(message_id) WHERE message_id IS NOT NULL
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_account_folder
            ON emails(account_id, folder, uid)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_emails_thread ON emails(thread_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id INTEGER NOT NULL REFERENCES emails(id) ON DELETE CASCADE,
                filename TEXT NOT NULL,
                original_filename TEXT NOT NULL,
                mime_type TEXT NOT NULL DEFAULT 'application/octet-stream',
                size INTEGER NOT NULL DEFAULT 0,
                storage_path TEXT NOT NULL,
                content_id TEXT,
                is_inline INTEGER NOT NULL DEFAULT 0,
                checksum_sha256 TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_attachments_email ON email_attachments(email_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new message, assigning its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or address
    /// serialization fails.
    pub async fn insert(&self, email: &mut Email) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO emails (
                account_id, direction, message_id, thread_id,
                from_json, to_json, cc_json, bcc_json, reply_to_json,
                subject, body_text, body_html, body_html_raw, snippet,
                classification, classification_confidence, classified_by_rule,
                uid, folder, flags, is_read, is_starred, is_archived, is_deleted,
                attachment_count, date
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(email.account_id.0)
        .bind(email.direction.as_str())
        .bind(&email.message_id)
        .bind(&email.thread_id)
        .bind(serde_json::to_string(&email.from)?)
        .bind(serde_json::to_string(&email.to)?)
        .bind(serde_json::to_string(&email.cc)?)
        .bind(serde_json::to_string(&email.bcc)?)
        .bind(serde_json::to_string(&email.reply_to)?)
        .bind(&email.subject)
        .bind(&email.body_text)
        .bind(&email.body_html)
        .bind(&email.body_html_raw)
        .bind(&email.snippet)
        .bind(&email.classification)
        .bind(email.classification_confidence)
        .bind(email.classified_by_rule)
        .bind(i64::from(email.uid))
        .bind(&email.folder)
        .bind(email.flags.join(" "))
        .bind(email.is_read)
        .bind(email.is_starred)
        .bind(email.is_archived)
        .bind(email.is_deleted)
        .bind(i64::from(email.attachment_count))
        .bind(email.date.map(|d| d.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        email.id = Some(result.last_insert_rowid());
        Ok(())
    }

    /// Find a message row id by protocol Message-ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_message_id(&self, message_id: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM emails WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Update only protocol flags for an existing Message-ID.
    ///
    /// This is the dedup path: bodies and classification stay untouched.
    /// The read flag tracks the protocol `\Seen` flag.
    ///
    /// Returns the row id when the Message-ID was known.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn update_protocol_flags(
        &self,
        message_id: &str,
        flags: &[String],
    ) -> Result<Option<i64>> {
        let Some(id) = self.find_by_message_id(message_id).await? else {
            return Ok(None);
        };

        let is_read = flags.iter().any(|f| f == "\\Seen");
        sqlx::query("UPDATE emails SET flags = ?, is_read = ? WHERE id = ?")
            .bind(flags.join(" "))
            .bind(is_read)
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!(message_id, "updated protocol flags for existing message");
        Ok(Some(id))
    }

    /// Get a message by row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: i64) -> Result<Option<Email>> {
        let row = sqlx::query("SELECT * FROM emails WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_email))
    }

    /// Get a message by row id, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::MessageNotFound` for unknown ids.
    pub async fn require(&self, id: i64) -> Result<Email> {
        self.get(id).await?.ok_or(Error::MessageNotFound(id))
    }

    /// List messages matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, filter: &MessageFilter) -> Result<Vec<Email>> {
        let mut sql = String::from("SELECT * FROM emails WHERE 1=1");
        if filter.account_id.is_some() {
            sql.push_str(" AND account_id = ?");
        }
        if filter.folder.is_some() {
            sql.push_str(" AND folder = ?");
        }
        if filter.classification.is_some() {
            sql.push_str(" AND classification = ?");
        }
        if filter.is_read.is_some() {
            sql.push_str(" AND is_read = ?");
        }
        if filter.is_starred.is_some() {
            sql.push_str(" AND is_starred = ?");
        }
        if filter.is_archived.is_some() {
            sql.push_str(" AND is_archived = ?");
        }
        if !filter.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        if filter.search.is_some() {
            sql.push_str(" AND (subject LIKE ? OR from_json LIKE ?)");
        }
        sql.push_str(" ORDER BY date DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(account_id) = filter.account_id {
            query = query.bind(account_id.0);
        }
        if let Some(folder) = &filter.folder {
            query = query.bind(folder);
        }
        if let Some(classification) = &filter.classification {
            query = query.bind(classification);
        }
        if let Some(is_read) = filter.is_read {
            query = query.bind(is_read);
        }
        if let Some(is_starred) = filter.is_starred {
            query = query.bind(is_starred);
        }
        if let Some(is_archived) = filter.is_archived {
            query = query.bind(is_archived);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            query = query.bind(pattern.clone()).bind(pattern);
        }
        query = query.bind(i64::from(filter.limit)).bind(i64::from(filter.offset));

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_email).collect())
    }

    /// Patch user-facing flags on one message.
    ///
    /// # Errors
    ///
    /// Returns `Error::MessageNotFound` for unknown ids.
    pub async fn patch_flags(&self, id: i64, patch: &FlagPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            r"
            UPDATE emails SET
                is_read = COALESCE(?, is_read),
                is_starred = COALESCE(?, is_starred),
                is_archived = COALESCE(?, is_archived),
                is_deleted = COALESCE(?, is_deleted)
            WHERE id = ?
            ",
        )
        .bind(patch.is_read)
        .bind(patch.is_starred)
        .bind(patch.is_archived)
        .bind(patch.is_deleted)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::MessageNotFound(id));
        }
        Ok(())
    }

    /// Patch user-facing flags on many messages. Unknown ids are skipped.
    ///
    /// Returns the number of rows updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn bulk_patch_flags(&self, ids: &[i64], patch: &FlagPatch) -> Result<u64> {
        if patch.is_empty() || ids.is_empty() {
            return Ok(0);
        }

        let mut updated = 0;
        for &id in ids {
            match self.patch_flags(id, patch).await {
                Ok(()) => updated += 1,
                Err(Error::MessageNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(updated)
    }

    /// Replace a message's classification (manual reclassification).
    ///
    /// # Errors
    ///
    /// Returns `Error::MessageNotFound` for unknown ids.
    pub async fn reclassify(&self, id: i64, classification: &Classification) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE emails SET
                classification = ?, classification_confidence = ?, classified_by_rule = ?
            WHERE id = ?
            ",
        )
        .bind(&classification.label)
        .bind(classification.confidence)
        .bind(classification.rule_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::MessageNotFound(id));
        }
        Ok(())
    }

    /// Get all messages of a thread in chronological order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_thread(&self, thread_id: &str) -> Result<Vec<Email>> {
        let rows = sqlx::query(
            "SELECT * FROM emails WHERE thread_id = ? ORDER BY date ASC, id ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_email).collect())
    }

    /// Count messages for an account (tests and admin stats).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_for_account(&self, account_id: AccountId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM emails WHERE account_id = ?")
            .bind(account_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Insert attachment metadata, assigning its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn insert_attachment(&self, attachment: &mut AttachmentRecord) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO email_attachments (
                email_id, filename, original_filename, mime_type, size,
                storage_path, content_id, is_inline, checksum_sha256, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(attachment.email_id)
        .bind(&attachment.filename)
        .bind(&attachment.original_filename)
        .bind(&attachment.mime_type)
        .bind(i64::try_from(attachment.size).unwrap_or(i64::MAX))
        .bind(&attachment.storage_path)
        .bind(&attachment.content_id)
        .bind(attachment.is_inline)
        .bind(&attachment.checksum_sha256)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        attachment.id = Some(result.last_insert_rowid());
        Ok(())
    }

    /// List attachment metadata for one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn attachments_for_message(&self, email_id: i64) -> Result<Vec<AttachmentRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM email_attachments WHERE email_id = ? ORDER BY id ASC",
        )
        .bind(email_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_attachment).collect())
    }

    /// Get attachment metadata by id (the download path).
    ///
    /// # Errors
    ///
    /// Returns `Error::AttachmentNotFound` for unknown ids.
    pub async fn require_attachment(&self, id: i64) -> Result<AttachmentRecord> {
        let row = sqlx::query("SELECT * FROM email_attachments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref()
            .map(row_to_attachment)
            .ok_or(Error::AttachmentNotFound(id))
    }
}

/// Convert a database row to an `Email`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_email(row: &sqlx::sqlite::SqliteRow) -> Email {
    let addresses = |column: &str| -> Vec<EmailAddress> {
        serde_json::from_str(row.get::<String, _>(column).as_str()).unwrap_or_default()
    };
    let flags: String = row.get("flags");

    Email {
        id: Some(row.get("id")),
        account_id: AccountId::new(row.get("account_id")),
        direction: Direction::parse(row.get("direction")),
        message_id: row.get("message_id"),
        thread_id: row.get("thread_id"),
        from: addresses("from_json"),
        to: addresses("to_json"),
        cc: addresses("cc_json"),
        bcc: addresses("bcc_json"),
        reply_to: addresses("reply_to_json"),
        subject: row.get("subject"),
        body_text: row.get("body_text"),
        body_html: row.get("body_html"),
        body_html_raw: row.get("body_html_raw"),
        snippet: row.get("snippet"),
        classification: row.get("classification"),
        classification_confidence: row.get("classification_confidence"),
        classified_by_rule: row.get("classified_by_rule"),
        uid: row.get::<i64, _>("uid") as u32,
        folder: row.get("folder"),
        flags: if flags.is_empty() {
            Vec::new()
        } else {
            flags.split(' ').map(str::to_string).collect()
        },
        is_read: row.get::<i64, _>("is_read") != 0,
        is_starred: row.get::<i64, _>("is_starred") != 0,
        is_archived: row.get::<i64, _>("is_archived") != 0,
        is_deleted: row.get::<i64, _>("is_deleted") != 0,
        attachment_count: row.get::<i64, _>("attachment_count") as u32,
        date: row
            .get::<Option<String>, _>("date")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Convert a database row to an `AttachmentRecord`.
#[allow(clippy::cast_sign_loss)]
fn row_to_attachment(row: &sqlx::sqlite::SqliteRow) -> AttachmentRecord {
    AttachmentRecord {
        id: Some(row.get("id")),
        email_id: row.get("email_id"),
        filename: row.get("filename"),
        original_filename: row.get("original_filename"),
        mime_type: row.get("mime_type"),
        size: row.get::<i64, _>("size") as u64,
        storage_path: row.get("storage_path"),
        content_id: row.get("content_id"),
        is_inline: row.get::<i64, _>("is_inline") != 0,
        checksum_sha256: row.get("checksum_sha256"),
        created_at: row
            .get::<Option<String>, _>("created_at")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_email(account: i64, uid: u32, message_id: &str) -> Email {
        Email {
            account_id: AccountId::new(account),
            message_id: Some(message_id.to_string()),
            thread_id: message_id.to_string(),
            from: vec![EmailAddress {
                name: Some("Ivan".to_string()),
                address: "ivan@bigclient.ru".to_string(),
            }],
            to: vec![EmailAddress {
                name: None,
                address: "sales@tender.ru".to_string(),
            }],
            subject: format!("Subject {uid}"),
            body_text: "body".to_string(),
            snippet: "body".to_string(),
            classification: "unknown".to_string(),
            uid,
            folder: "INBOX".to_string(),
            flags: vec!["\\Seen".to_string()],
            is_read: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = MessageRepository::in_memory().await.unwrap();
        let mut email = sample_email(1, 101, "m1@x.ru");
        repo.insert(&mut email).await.unwrap();

        let loaded = repo.require(email.id.unwrap()).await.unwrap();
        assert_eq!(loaded.message_id.as_deref(), Some("m1@x.ru"));
        assert_eq!(loaded.from[0].address, "ivan@bigclient.ru");
        assert_eq!(loaded.flags, vec!["\\Seen"]);
        assert_eq!(loaded.uid, 101);
    }

    #[tokio::test]
    async fn test_message_id_unique() {
        let repo = MessageRepository::in_memory().await.unwrap();
        let mut first = sample_email(1, 101, "dup@x.ru");
        repo.insert(&mut first).await.unwrap();

        let mut second = sample_email(1, 102, "dup@x.ru");
        assert!(repo.insert(&mut second).await.is_err());
    }

    #[tokio::test]
    async fn test_update_protocol_flags_only() {
        let repo = MessageRepository::in_memory().await.unwrap();
        let mut email = sample_email(1, 101, "m1@x.ru");
        email.flags = vec![];
        email.is_read = false;
        repo.insert(&mut email).await.unwrap();

        let id = repo
            .update_protocol_flags("m1@x.ru", &["\\Seen".to_string(), "\\Flagged".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id, email.id.unwrap());

        let loaded = repo.require(id).await.unwrap();
        assert!(loaded.is_read);
        assert_eq!(loaded.flags, vec!["\\Seen", "\\Flagged"]);
        // Body untouched by the flags-only path.
        assert_eq!(loaded.body_text, "body");
    }

    #[tokio::test]
    async fn test_update_protocol_flags_unknown_id() {
        let repo = MessageRepository::in_memory().await.unwrap();
        let result = repo
            .update_protocol_flags("ghost@x.ru", &["\\Seen".to_string()])
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let repo = MessageRepository::in_memory().await.unwrap();

        let mut a = sample_email(1, 1, "a@x.ru");
        a.classification = "direct_request".to_string();
        repo.insert(&mut a).await.unwrap();

        let mut b = sample_email(1, 2, "b@x.ru");
        b.is_read = false;
        repo.insert(&mut b).await.unwrap();

        let mut c = sample_email(2, 3, "c@x.ru");
        c.is_deleted = true;
        repo.insert(&mut c).await.unwrap();

        let all = repo.list(&MessageFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2, "deleted messages excluded by default");

        let unread = repo
            .list(&MessageFilter {
                is_read: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].message_id.as_deref(), Some("b@x.ru"));

        let classified = repo
            .list(&MessageFilter {
                classification: Some("direct_request".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(classified.len(), 1);

        let with_deleted = repo
            .list(&MessageFilter {
                include_deleted: true,
                account_id: Some(AccountId::new(2)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(with_deleted.len(), 1);
    }

    #[tokio::test]
    async fn test_list_search() {
        let repo = MessageRepository::in_memory().await.unwrap();
        let mut a = sample_email(1, 1, "a@x.ru");
        a.subject = "Тендер на поставку".to_string();
        repo.insert(&mut a).await.unwrap();
        let mut b = sample_email(1, 2, "b@x.ru");
        b.subject = "Invoice".to_string();
        repo.insert(&mut b).await.unwrap();

        let hits = repo
            .list(&MessageFilter {
                search: Some("Тендер".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        // Search also covers the sender.
        let hits = repo
            .list(&MessageFilter {
                search: Some("bigclient".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_patch_and_bulk_patch() {
        let repo = MessageRepository::in_memory().await.unwrap();
        let mut a = sample_email(1, 1, "a@x.ru");
        repo.insert(&mut a).await.unwrap();
        let mut b = sample_email(1, 2, "b@x.ru");
        repo.insert(&mut b).await.unwrap();

        repo.patch_flags(
            a.id.unwrap(),
            &FlagPatch {
                is_starred: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(repo.require(a.id.unwrap()).await.unwrap().is_starred);

        let updated = repo
            .bulk_patch_flags(
                &[a.id.unwrap(), b.id.unwrap(), 999],
                &FlagPatch {
                    is_archived: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated, 2);
        assert!(repo.require(b.id.unwrap()).await.unwrap().is_archived);
    }

    #[tokio::test]
    async fn test_patch_unknown_fails() {
        let repo = MessageRepository::in_memory().await.unwrap();
        let err = repo
            .patch_flags(
                7,
                &FlagPatch {
                    is_read: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MessageNotFound(7)));
    }

    #[tokio::test]
    async fn test_reclassify() {
        let repo = MessageRepository::in_memory().await.unwrap();
        let mut email = sample_email(1, 1, "a@x.ru");
        repo.insert(&mut email).await.unwrap();

        repo.reclassify(
            email.id.unwrap(),
            &Classification {
                label: "platform_tender".to_string(),
                confidence: 1.0,
                rule_id: None,
            },
        )
        .await
        .unwrap();

        let loaded = repo.require(email.id.unwrap()).await.unwrap();
        assert_eq!(loaded.classification, "platform_tender");
        assert!(loaded.classified_by_rule.is_none());
    }

    #[tokio::test]
    async fn test_thread_retrieval_in_order() {
        let repo = MessageRepository::in_memory().await.unwrap();

        for (uid, message_id) in [(1, "m1@x.ru"), (2, "m2@x.ru"), (3, "m3@x.ru")] {
            let mut email = sample_email(1, uid, message_id);
            email.thread_id = "m1@x.ru".to_string();
            email.date = Some(
                chrono::DateTime::parse_from_rfc3339(&format!("2025-07-0{uid}T10:00:00Z"))
                    .unwrap()
                    .with_timezone(&Utc),
            );
            repo.insert(&mut email).await.unwrap();
        }

        let thread = repo.get_thread("m1@x.ru").await.unwrap();
        assert_eq!(thread.len(), 3);
        assert_eq!(thread[0].message_id.as_deref(), Some("m1@x.ru"));
        assert_eq!(thread[2].message_id.as_deref(), Some("m3@x.ru"));
    }

    #[tokio::test]
    async fn test_attachment_metadata_roundtrip() {
        let repo = MessageRepository::in_memory().await.unwrap();
        let mut email = sample_email(1, 1, "a@x.ru");
        repo.insert(&mut email).await.unwrap();

        let mut attachment = AttachmentRecord {
            id: None,
            email_id: email.id.unwrap(),
            filename: "offer.pdf".to_string(),
            original_filename: "Коммерческое предложение.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size: 1024,
            storage_path: "2025-07-01/uuid/offer.pdf".to_string(),
            content_id: None,
            is_inline: false,
            checksum_sha256: "abc123".to_string(),
            created_at: None,
        };
        repo.insert_attachment(&mut attachment).await.unwrap();

        let listed = repo
            .attachments_for_message(email.id.unwrap())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filename, "offer.pdf");

        let fetched = repo.require_attachment(attachment.id.unwrap()).await.unwrap();
        assert_eq!(fetched.storage_path, "2025-07-01/uuid/offer.pdf");

        assert!(matches!(
            repo.require_attachment(999).await.unwrap_err(),
            Error::AttachmentNotFound(999)
        ));
    }
}
