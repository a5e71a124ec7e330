//! Mail account model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a mail account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IMAP server configuration for an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (default: 993 for TLS, 143 without).
    pub port: u16,
    /// Whether to connect with implicit TLS.
    pub use_tls: bool,
    /// Username for authentication.
    pub username: String,
    /// Mailbox folder to synchronize.
    pub folder: String,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 993,
            use_tls: true,
            username: String::new(),
            folder: "INBOX".to_string(),
        }
    }
}

impl ImapConfig {
    /// Get the default port for a TLS setting.
    #[must_use]
    pub const fn default_port(use_tls: bool) -> u16 {
        if use_tls { 993 } else { 143 }
    }
}

/// Sync policy knobs for an account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Whether scheduled syncing is enabled.
    pub enabled: bool,
    /// Seconds between scheduled runs.
    pub interval_secs: u32,
    /// Maximum messages ingested per run.
    pub max_messages_per_sync: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            max_messages_per_sync: 50,
        }
    }
}

/// A configured mailbox account.
///
/// `last_sync_uid` is the watermark: the highest protocol UID observed for
/// the account, the exclusive lower bound of the next incremental fetch.
/// The watermark, `last_sync_at` and `last_sync_error` are mutated only by
/// the sync engine.
#[derive(Debug, Clone, Default)]
pub struct MailAccount {
    /// Unique identifier (None for unsaved accounts).
    pub id: Option<AccountId>,
    /// Display name for the account.
    pub name: String,
    /// Email address of the mailbox.
    pub email: String,
    /// IMAP connection configuration.
    pub imap: ImapConfig,
    /// Vault-encrypted password; never plaintext.
    pub password_encrypted: String,
    /// Sync policy.
    pub policy: SyncPolicy,
    /// Watermark: highest observed protocol UID.
    pub last_sync_uid: Option<u32>,
    /// Completion time of the last successful run.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Error text of the last failed run, cleared on success.
    pub last_sync_error: Option<String>,
}

impl MailAccount {
    /// Create an account with defaults for the given address.
    #[must_use]
    pub fn with_email(email: &str) -> Self {
        let mut account = Self {
            email: email.to_string(),
            ..Self::default()
        };
        if let Some(domain) = email.split('@').nth(1) {
            account.name = domain.to_string();
            account.imap.host = format!("imap.{domain}");
        }
        account.imap.username = email.to_string();
        account
    }
}
