//! Sync engine.
//!
//! Executes one bounded, incremental synchronization for a single account:
//! open a protocol session, fetch the UID range above the watermark,
//! normalize / classify / persist each message, advance the watermark, and
//! write one sync-log row. All failures are absorbed here and converted
//! into log and state updates; nothing propagates up to crash the poller.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::log::{RunCounts, RunError, RunStatus, RunType, SyncLogRepository};
use super::signal::StopSignal;
use super::source::{MailboxSession, MessageSource, RawMessage, SourceError};
use crate::account::{AccountId, AccountRepository, MailAccount};
use crate::attachment::{AttachmentRecord, AttachmentStore};
use crate::classify::{Classifier, EmailFields};
use crate::message::{Direction, Email, MessageRepository, Normalizer};
use crate::vault::Vault;
use crate::Result;

/// Deadline for opening a protocol session.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Seen flag in wire form.
const SEEN_FLAG: &str = "\\Seen";

/// Registry of accounts with an open protocol session.
///
/// Shutdown consults it to report sessions that are still draining; the
/// cooperative checks inside the run close them on their own exit paths.
#[derive(Debug, Clone, Default)]
pub struct ActiveSessions {
    inner: Arc<Mutex<HashSet<i64>>>,
}

impl ActiveSessions {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, id: AccountId) {
        self.inner.lock().await.insert(id.0);
    }

    async fn deregister(&self, id: AccountId) {
        self.inner.lock().await.remove(&id.0);
    }

    /// Account ids with a session currently open.
    pub async fn snapshot(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.inner.lock().await.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Summary of one sync run, mirroring its log row.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Sync-log row id.
    pub run_id: i64,
    /// Terminal status.
    pub status: RunStatus,
    /// Accumulated counters.
    pub counts: RunCounts,
    /// Structured errors.
    pub errors: Vec<RunError>,
    /// Watermark written by this run, if it advanced.
    pub new_watermark: Option<u32>,
    /// Wall-clock duration.
    pub duration: Duration,
}

/// Per-account unit of work over a pluggable message source.
pub struct SyncEngine<S: MessageSource> {
    source: S,
    accounts: Arc<AccountRepository>,
    messages: Arc<MessageRepository>,
    sync_log: Arc<SyncLogRepository>,
    classifier: Arc<Classifier>,
    vault: Arc<Vault>,
    attachments: Arc<AttachmentStore>,
    normalizer: Normalizer,
    shutdown: StopSignal,
    sessions: ActiveSessions,
    run_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

/// What happened to one fetched message.
enum Ingest {
    New {
        attachments_saved: u32,
        attachment_errors: Vec<RunError>,
    },
    Updated,
}

/// How the fetch loop ended.
struct BatchOutcome {
    counts: RunCounts,
    errors: Vec<RunError>,
    max_seen: Option<u32>,
    aborted: Option<SourceError>,
    interrupted: bool,
}

impl<S: MessageSource> SyncEngine<S> {
    /// Creates an engine with explicitly injected collaborators.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        source: S,
        accounts: Arc<AccountRepository>,
        messages: Arc<MessageRepository>,
        sync_log: Arc<SyncLogRepository>,
        classifier: Arc<Classifier>,
        vault: Arc<Vault>,
        attachments: Arc<AttachmentStore>,
        normalizer: Normalizer,
        shutdown: StopSignal,
    ) -> Self {
        Self {
            source,
            accounts,
            messages,
            sync_log,
            classifier,
            vault,
            attachments,
            normalizer,
            shutdown,
            sessions: ActiveSessions::new(),
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Registry of currently open sessions, for shutdown reporting.
    #[must_use]
    pub fn active_sessions(&self) -> ActiveSessions {
        self.sessions.clone()
    }

    /// Runs one bounded incremental sync for an account.
    ///
    /// Holds the account's run lock for the whole attempt, so manual and
    /// scheduled runs for the same account never overlap. Connection-level
    /// failures end the run with status `error`, are recorded on the
    /// account, and leave the watermark untouched; per-message failures are
    /// recorded and skipped, but their UIDs still advance the watermark.
    ///
    /// # Errors
    ///
    /// Returns an error only for repository/infrastructure failures; all
    /// sync-path failures are folded into the returned report.
    pub async fn sync_account(&self, account_id: AccountId, run_type: RunType) -> Result<SyncReport> {
        let lock = self.run_lock(account_id).await;
        let _guard = lock.lock().await;

        let account = self.accounts.require(account_id).await?;
        let started = Instant::now();
        let run_id = self.sync_log.start_run(account_id, run_type).await?;
        info!(account = %account.email, run_id, ?run_type, "sync run started");

        let password = match self.vault.decrypt(&account.password_encrypted) {
            Ok(password) => password,
            Err(e) => {
                return self
                    .abort_run(run_id, account_id, RunCounts::default(), Vec::new(), started, "vault", &format!("credential decryption failed: {e}"))
                    .await;
            }
        };

        if self.shutdown.is_triggered() {
            return self
                .abort_run(run_id, account_id, RunCounts::default(), Vec::new(), started, "connect", "shutdown in progress")
                .await;
        }

        let session = match tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.source.connect(&account, &password),
        )
        .await
        {
            Err(_) => {
                return self
                    .abort_run(run_id, account_id, RunCounts::default(), Vec::new(), started, "connect", &format!("connect timed out after {CONNECT_TIMEOUT:?}"))
                    .await;
            }
            Ok(Err(e)) => {
                return self
                    .abort_run(run_id, account_id, RunCounts::default(), Vec::new(), started, "connect", &e.to_string())
                    .await;
            }
            Ok(Ok(session)) => session,
        };

        self.sessions.register(account_id).await;
        let outcome = self.run_batch(session, &account).await;
        self.sessions.deregister(account_id).await;

        if let Some(source_error) = outcome.aborted {
            return self
                .abort_run(run_id, account_id, outcome.counts, outcome.errors, started, "fetch", &source_error.to_string())
                .await;
        }

        // The watermark moves only after the whole bounded batch has been
        // iterated; a shutdown-interrupted batch leaves it in place and the
        // dedup path absorbs the re-fetch on the next run.
        let previous = account.last_sync_uid.unwrap_or(0);
        let new_watermark = if outcome.interrupted {
            None
        } else {
            outcome.max_seen.filter(|&uid| uid > previous)
        };
        self.accounts
            .update_sync_state(account_id, new_watermark)
            .await?;

        let status = if outcome.errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };
        let duration = started.elapsed();
        self.sync_log
            .finalize_run(
                run_id,
                status,
                outcome.counts,
                &outcome.errors,
                duration_ms(duration),
            )
            .await?;

        info!(
            account = %account.email,
            run_id,
            fetched = outcome.counts.fetched,
            new = outcome.counts.new_messages,
            updated = outcome.counts.updated_messages,
            errors = outcome.errors.len(),
            watermark = ?new_watermark,
            "sync run finished"
        );

        Ok(SyncReport {
            run_id,
            status,
            counts: outcome.counts,
            errors: outcome.errors,
            new_watermark,
            duration,
        })
    }

    /// Connect-and-status probe without fetching anything.
    ///
    /// # Errors
    ///
    /// Returns the connection-level failure, including credential
    /// decryption problems.
    pub async fn test_connection(&self, account_id: AccountId) -> Result<()> {
        let account = self.accounts.require(account_id).await?;
        let password = self
            .vault
            .decrypt(&account.password_encrypted)
            .map_err(|e| SourceError::Connection(format!("credential decryption failed: {e}")))
            .map_err(crate::Error::from)?;
        self.test_connection_with(&account, &password).await
    }

    /// Probe against supplied configuration and plaintext credentials.
    ///
    /// # Errors
    ///
    /// Returns the connection-level failure.
    pub async fn test_connection_with(&self, account: &MailAccount, password: &str) -> Result<()> {
        let session = tokio::time::timeout(CONNECT_TIMEOUT, self.source.connect(account, password))
            .await
            .map_err(|_| {
                crate::Error::from(SourceError::Timeout(format!(
                    "connect timed out after {CONNECT_TIMEOUT:?}"
                )))
            })??;
        session.close().await;
        Ok(())
    }

    /// Iterates the batch: search, fetch, ingest. Always closes the
    /// session before returning.
    async fn run_batch(&self, mut session: S::Session, account: &MailAccount) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            counts: RunCounts::default(),
            errors: Vec::new(),
            max_seen: None,
            aborted: None,
            interrupted: false,
        };

        let mut uids = match session.uids_since(account.last_sync_uid).await {
            Ok(uids) => uids,
            Err(e) => {
                session.close().await;
                outcome.aborted = Some(e);
                return outcome;
            }
        };
        uids.truncate(account.policy.max_messages_per_sync as usize);
        debug!(account = %account.email, pending = uids.len(), "incremental fetch range computed");

        for uid in uids {
            if self.shutdown.is_triggered() {
                info!(account = %account.email, "shutdown requested, leaving batch early");
                outcome.interrupted = true;
                break;
            }

            let raw = match session.fetch(uid).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    // Expunged between search and fetch; still observed.
                    outcome.max_seen = Some(outcome.max_seen.map_or(uid, |m| m.max(uid)));
                    continue;
                }
                Err(e) => {
                    outcome.aborted = Some(e);
                    break;
                }
            };

            // Every iterated UID participates in watermark advancement,
            // parse failures included: forward progress over completeness.
            outcome.max_seen = Some(outcome.max_seen.map_or(uid, |m| m.max(uid)));

            match self.ingest(account, &raw).await {
                Ok(Ingest::New {
                    attachments_saved,
                    attachment_errors,
                }) => {
                    outcome.counts.fetched += 1;
                    outcome.counts.new_messages += 1;
                    outcome.counts.attachments_saved += attachments_saved;
                    outcome.errors.extend(attachment_errors);
                }
                Ok(Ingest::Updated) => {
                    outcome.counts.fetched += 1;
                    outcome.counts.updated_messages += 1;
                }
                Err(run_error) => {
                    warn!(account = %account.email, uid, "message ingestion failed: {}", run_error.message);
                    outcome.errors.push(run_error);
                }
            }
        }

        session.close().await;
        outcome
    }

    /// Normalizes, classifies, and persists one fetched message.
    #[allow(clippy::cast_possible_truncation)]
    async fn ingest(&self, account: &MailAccount, raw: &RawMessage) -> std::result::Result<Ingest, RunError> {
        let normalized = self
            .normalizer
            .normalize(&raw.body)
            .map_err(|e| RunError::new(Some(raw.uid), "parse", e.to_string()))?;

        // Dedup: an existing Message-ID only gets its protocol flags
        // refreshed, never bodies or classification.
        if let Some(message_id) = &normalized.message_id {
            match self.messages.update_protocol_flags(message_id, &raw.flags).await {
                Ok(Some(_)) => return Ok(Ingest::Updated),
                Ok(None) => {}
                Err(e) => return Err(RunError::new(Some(raw.uid), "persist", e.to_string())),
            }
        }

        let from_address = normalized
            .from
            .first()
            .map(|a| a.address.clone())
            .unwrap_or_default();
        let classification = self
            .classifier
            .classify(&EmailFields {
                from: &from_address,
                subject: &normalized.subject,
                body: &normalized.body_text,
                headers: &normalized.headers_raw,
            })
            .await
            .map_err(|e| RunError::new(Some(raw.uid), "classify", e.to_string()))?;

        // Attachment content goes to disk before the row insert; a failed
        // write is isolated and the message still persists.
        let mut stored = Vec::new();
        let mut attachment_errors = Vec::new();
        if !normalized.attachments.is_empty() {
            match self.attachments.allocate_message_dir().await {
                Ok(message_dir) => {
                    for attachment in &normalized.attachments {
                        match self
                            .attachments
                            .write(&message_dir, attachment.filename.as_deref(), &attachment.data)
                            .await
                        {
                            Ok(file) => stored.push((file, attachment)),
                            Err(e) => attachment_errors.push(RunError::new(
                                Some(raw.uid),
                                "attachment",
                                format!("{}: {e}", attachment.filename.as_deref().unwrap_or("unnamed")),
                            )),
                        }
                    }
                }
                Err(e) => attachment_errors.push(RunError::new(
                    Some(raw.uid),
                    "attachment",
                    format!("could not allocate attachment directory: {e}"),
                )),
            }
        }

        let mut email = Email {
            id: None,
            account_id: account.id.unwrap_or(AccountId::new(0)),
            direction: Direction::Inbound,
            message_id: normalized.message_id.clone(),
            thread_id: normalized.thread_id.clone(),
            from: normalized.from.clone(),
            to: normalized.to.clone(),
            cc: normalized.cc.clone(),
            bcc: normalized.bcc.clone(),
            reply_to: normalized.reply_to.clone(),
            subject: normalized.subject.clone(),
            body_text: normalized.body_text.clone(),
            body_html: normalized.body_html.clone(),
            body_html_raw: normalized.body_html_raw.clone(),
            snippet: normalized.snippet.clone(),
            classification: String::new(),
            classification_confidence: 0.0,
            classified_by_rule: None,
            uid: raw.uid,
            folder: account.imap.folder.clone(),
            flags: raw.flags.clone(),
            is_read: raw.flags.iter().any(|f| f == SEEN_FLAG),
            is_starred: false,
            is_archived: false,
            is_deleted: false,
            attachment_count: stored.len() as u32,
            date: normalized.date,
        };
        email.set_classification(&classification);

        self.messages
            .insert(&mut email)
            .await
            .map_err(|e| RunError::new(Some(raw.uid), "persist", e.to_string()))?;
        let email_id = email.id.unwrap_or_default();

        let mut attachments_saved = 0u32;
        for (file, attachment) in stored {
            let mut record = AttachmentRecord {
                id: None,
                email_id,
                filename: file.filename,
                original_filename: attachment
                    .filename
                    .clone()
                    .unwrap_or_else(|| "attachment.bin".to_string()),
                mime_type: attachment.mime_type.clone(),
                size: file.size,
                storage_path: file.relative_path,
                content_id: attachment.content_id.clone(),
                is_inline: attachment.is_inline,
                checksum_sha256: file.checksum_sha256,
                created_at: None,
            };
            match self.messages.insert_attachment(&mut record).await {
                Ok(()) => attachments_saved += 1,
                Err(e) => attachment_errors.push(RunError::new(
                    Some(raw.uid),
                    "attachment",
                    format!("{}: {e}", record.filename),
                )),
            }
        }

        Ok(Ingest::New {
            attachments_saved,
            attachment_errors,
        })
    }

    /// Ends a run on the connection-level failure path: the account keeps
    /// the error, the watermark stays, the log row turns terminal.
    async fn abort_run(
        &self,
        run_id: i64,
        account_id: AccountId,
        counts: RunCounts,
        mut errors: Vec<RunError>,
        started: Instant,
        stage: &str,
        message: &str,
    ) -> Result<SyncReport> {
        warn!(account_id = account_id.0, run_id, stage, "sync run aborted: {message}");
        errors.push(RunError::new(None, stage, message));

        self.accounts.record_sync_error(account_id, message).await?;
        let duration = started.elapsed();
        self.sync_log
            .finalize_run(run_id, RunStatus::Error, counts, &errors, duration_ms(duration))
            .await?;

        Ok(SyncReport {
            run_id,
            status: RunStatus::Error,
            counts,
            errors,
            new_watermark: None,
            duration,
        })
    }

    /// Per-account run lock, created on first use.
    async fn run_lock(&self, account_id: AccountId) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().await;
        Arc::clone(locks.entry(account_id.0).or_default())
    }
}

/// Clamps a duration into the log row's millisecond column.
fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::MailAccount;
    use crate::classify::{ClassificationRule, Classifier, MatchMode, RuleRepository, RuleType};
    use crate::sanitize::Sanitizer;
    use crate::sync::testing::FakeSource;

    struct Harness {
        engine: Arc<SyncEngine<FakeSource>>,
        source: FakeSource,
        accounts: Arc<AccountRepository>,
        messages: Arc<MessageRepository>,
        sync_log: Arc<SyncLogRepository>,
        classifier: Arc<Classifier>,
        vault: Arc<Vault>,
        account_id: AccountId,
        shutdown: StopSignal,
        _attachment_dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let source = FakeSource::new();
        let accounts = Arc::new(AccountRepository::in_memory().await.unwrap());
        let messages = Arc::new(MessageRepository::in_memory().await.unwrap());
        let sync_log = Arc::new(SyncLogRepository::in_memory().await.unwrap());
        let classifier = Arc::new(Classifier::new(Arc::new(
            RuleRepository::in_memory().await.unwrap(),
        )));
        let vault = Arc::new(Vault::new("test-master-secret"));
        let attachment_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AttachmentStore::new(attachment_dir.path()));
        let shutdown = StopSignal::new();

        let mut account = MailAccount::with_email("sales@tender.ru");
        account.password_encrypted = vault.encrypt("imap-password").unwrap();
        accounts.create(&mut account).await.unwrap();

        let engine = Arc::new(SyncEngine::new(
            source.clone(),
            Arc::clone(&accounts),
            Arc::clone(&messages),
            Arc::clone(&sync_log),
            Arc::clone(&classifier),
            Arc::clone(&vault),
            store,
            Normalizer::new(Sanitizer::new()),
            shutdown.clone(),
        ));

        Harness {
            engine,
            source,
            accounts,
            messages,
            sync_log,
            classifier,
            vault,
            account_id: account.id.unwrap(),
            shutdown,
            _attachment_dir: attachment_dir,
        }
    }

    fn mime(message_id: &str, subject: &str) -> Vec<u8> {
        format!(
            "From: Ivan <ivan@bigclient.ru>\r\n\
             To: sales@tender.ru\r\n\
             Message-ID: <{message_id}>\r\n\
             Subject: {subject}\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             Hello there"
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_watermark_passes_failed_message() {
        // Watermark 100; 101 and 103 parse, 102 does not. The run reports
        // fetched=2 errors=1, persists 101 and 103, and the watermark
        // still lands on 103.
        let h = harness().await;
        let id = h.account_id;
        h.accounts.update_sync_state(id, Some(100)).await.unwrap();

        h.source.put_message(id.0, 101, &[], &mime("m101@x.ru", "one")).await;
        h.source.put_message(id.0, 102, &[], b"this is not mime at all").await;
        h.source.put_message(id.0, 103, &[], &mime("m103@x.ru", "three")).await;

        let report = h.engine.sync_account(id, RunType::Manual).await.unwrap();

        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.counts.fetched, 2);
        assert_eq!(report.counts.new_messages, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].uid, Some(102));
        assert_eq!(report.errors[0].stage, "parse");
        assert_eq!(report.new_watermark, Some(103));

        let account = h.accounts.require(id).await.unwrap();
        assert_eq!(account.last_sync_uid, Some(103));
        assert!(account.last_sync_error.is_none());

        assert!(h.messages.find_by_message_id("m101@x.ru").await.unwrap().is_some());
        assert!(h.messages.find_by_message_id("m103@x.ru").await.unwrap().is_some());
        assert_eq!(h.messages.count_for_account(id).await.unwrap(), 2);

        let run = h.sync_log.get(report.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(run.counts.fetched, 2);
        assert_eq!(run.error_count, 1);
    }

    #[tokio::test]
    async fn test_rerun_with_no_new_mail_is_idempotent() {
        let h = harness().await;
        let id = h.account_id;
        h.source.put_message(id.0, 5, &[], &mime("m5@x.ru", "hi")).await;

        let first = h.engine.sync_account(id, RunType::Manual).await.unwrap();
        assert_eq!(first.counts.new_messages, 1);
        assert_eq!(first.new_watermark, Some(5));

        let second = h.engine.sync_account(id, RunType::Manual).await.unwrap();
        assert_eq!(second.status, RunStatus::Success);
        assert_eq!(second.counts.new_messages, 0);
        assert_eq!(second.counts.fetched, 0);
        assert!(second.new_watermark.is_none());

        let account = h.accounts.require(id).await.unwrap();
        assert_eq!(account.last_sync_uid, Some(5));
        assert_eq!(h.messages.count_for_account(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_message_id_updates_flags_only() {
        let h = harness().await;
        let id = h.account_id;

        h.source.put_message(id.0, 1, &[], &mime("dup@x.ru", "original")).await;
        h.engine.sync_account(id, RunType::Manual).await.unwrap();

        // The same Message-ID arrives again under a new UID, now seen.
        h.source
            .put_message(id.0, 2, &["\\Seen"], &mime("dup@x.ru", "copy"))
            .await;
        let report = h.engine.sync_account(id, RunType::Manual).await.unwrap();

        assert_eq!(report.counts.updated_messages, 1);
        assert_eq!(report.counts.new_messages, 0);
        assert_eq!(h.messages.count_for_account(id).await.unwrap(), 1);

        let email_id = h.messages.find_by_message_id("dup@x.ru").await.unwrap().unwrap();
        let email = h.messages.require(email_id).await.unwrap();
        assert!(email.is_read);
        // Body stays from the first ingestion.
        assert_eq!(email.subject, "original");
    }

    #[tokio::test]
    async fn test_connection_failure_aborts_and_retries() {
        let h = harness().await;
        let id = h.account_id;
        h.source.put_message(id.0, 7, &[], &mime("m7@x.ru", "hi")).await;
        h.source.fail_connect(id.0, "connection refused").await;

        let report = h.engine.sync_account(id, RunType::Scheduled).await.unwrap();
        assert_eq!(report.status, RunStatus::Error);
        assert!(report.new_watermark.is_none());

        let account = h.accounts.require(id).await.unwrap();
        assert!(account.last_sync_error.as_deref().unwrap().contains("connection refused"));
        assert!(account.last_sync_uid.is_none());

        // The next tick retries independently and succeeds.
        h.source.heal_connect(id.0).await;
        let retry = h.engine.sync_account(id, RunType::Scheduled).await.unwrap();
        assert_eq!(retry.status, RunStatus::Success);
        assert_eq!(retry.counts.new_messages, 1);

        let account = h.accounts.require(id).await.unwrap();
        assert!(account.last_sync_error.is_none());
        assert_eq!(account.last_sync_uid, Some(7));
    }

    #[tokio::test]
    async fn test_auth_failure_recorded() {
        let h = harness().await;
        let id = h.account_id;
        h.source.expect_password("a-different-password").await;

        let report = h.engine.sync_account(id, RunType::Scheduled).await.unwrap();
        assert_eq!(report.status, RunStatus::Error);

        let account = h.accounts.require(id).await.unwrap();
        assert!(account.last_sync_error.as_deref().unwrap().contains("Authentication"));
    }

    #[tokio::test]
    async fn test_vault_failure_is_connection_level() {
        let h = harness().await;
        let id = h.account_id;
        h.accounts.rotate_password(id, "not-valid-ciphertext").await.unwrap();

        let report = h.engine.sync_account(id, RunType::Manual).await.unwrap();
        assert_eq!(report.status, RunStatus::Error);
        assert_eq!(report.errors[0].stage, "vault");

        let account = h.accounts.require(id).await.unwrap();
        assert!(account.last_sync_error.as_deref().unwrap().contains("decryption"));
    }

    #[tokio::test]
    async fn test_per_run_message_cap() {
        let h = harness().await;
        let id = h.account_id;

        let mut account = h.accounts.require(id).await.unwrap();
        account.policy.max_messages_per_sync = 2;
        h.accounts.update(&account).await.unwrap();

        for uid in 1..=3u32 {
            h.source
                .put_message(id.0, uid, &[], &mime(&format!("m{uid}@x.ru"), "s"))
                .await;
        }

        let first = h.engine.sync_account(id, RunType::Scheduled).await.unwrap();
        assert_eq!(first.counts.new_messages, 2);
        assert_eq!(first.new_watermark, Some(2));

        let second = h.engine.sync_account(id, RunType::Scheduled).await.unwrap();
        assert_eq!(second.counts.new_messages, 1);
        assert_eq!(second.new_watermark, Some(3));
    }

    #[tokio::test]
    async fn test_attachments_stored_with_metadata() {
        let h = harness().await;
        let id = h.account_id;

        let raw = b"From: ivan@bigclient.ru\r\n\
Message-ID: <att@x.ru>\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\
\r\n\
--B\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attached\r\n\
--B\r\n\
Content-Type: application/pdf; name=\"offer.pdf\"\r\n\
Content-Disposition: attachment; filename=\"offer.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERg==\r\n\
--B--\r\n";
        h.source.put_message(id.0, 1, &[], raw).await;

        let report = h.engine.sync_account(id, RunType::Manual).await.unwrap();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.counts.attachments_saved, 1);

        let email_id = h.messages.find_by_message_id("att@x.ru").await.unwrap().unwrap();
        let email = h.messages.require(email_id).await.unwrap();
        assert_eq!(email.attachment_count, 1);

        let attachments = h.messages.attachments_for_message(email_id).await.unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "offer.pdf");
        assert_eq!(attachments[0].size, 4);
        assert_eq!(attachments[0].mime_type, "application/pdf");
        assert_eq!(attachments[0].checksum_sha256.len(), 64);
    }

    #[tokio::test]
    async fn test_classification_applied_on_ingest() {
        let h = harness().await;
        let id = h.account_id;

        let mut rule = ClassificationRule::new(
            RuleType::Domain,
            MatchMode::Contains,
            "bigclient.ru",
            "direct_request",
        );
        rule.priority = 10;
        h.classifier.create_rule(&mut rule).await.unwrap();

        h.source.put_message(id.0, 1, &[], &mime("c@x.ru", "Тендер №5")).await;
        h.engine.sync_account(id, RunType::Manual).await.unwrap();

        let email_id = h.messages.find_by_message_id("c@x.ru").await.unwrap().unwrap();
        let email = h.messages.require(email_id).await.unwrap();
        assert_eq!(email.classification, "direct_request");
        assert_eq!(email.classified_by_rule, rule.id);
    }

    #[tokio::test]
    async fn test_shutdown_blocks_new_connections() {
        let h = harness().await;
        let id = h.account_id;
        h.shutdown.trigger();

        let report = h.engine.sync_account(id, RunType::Scheduled).await.unwrap();
        assert_eq!(report.status, RunStatus::Error);
        assert_eq!(h.source.connect_count(id.0).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_never_overlap() {
        let h = harness().await;
        let id = h.account_id;
        h.source.put_message(id.0, 1, &[], &mime("m1@x.ru", "s")).await;

        let (first, second) = tokio::join!(
            h.engine.sync_account(id, RunType::Scheduled),
            h.engine.sync_account(id, RunType::Manual),
        );
        first.unwrap();
        second.unwrap();

        // The run lock serialized them: one row, two completed runs.
        assert_eq!(h.messages.count_for_account(id).await.unwrap(), 1);
        let runs = h.sync_log.list_for_account(id, 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.status != RunStatus::Running));
    }

    #[tokio::test]
    async fn test_connection_probe() {
        let h = harness().await;
        assert!(h.engine.test_connection(h.account_id).await.is_ok());

        h.source.fail_connect(h.account_id.0, "refused").await;
        let err = h.engine.test_connection(h.account_id).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Source(SourceError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_with_supplied_credentials() {
        let h = harness().await;
        h.source.expect_password("probe-password").await;

        let account = h.accounts.require(h.account_id).await.unwrap();
        assert!(h.engine.test_connection_with(&account, "probe-password").await.is_ok());
        assert!(h.engine.test_connection_with(&account, "wrong").await.is_err());
        // Stored credentials still decrypt through the vault.
        assert_eq!(h.vault.decrypt(&account.password_encrypted).unwrap(), "imap-password");
    }
}
