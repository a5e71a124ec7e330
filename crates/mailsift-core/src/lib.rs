//! # mailsift-core
//!
//! Mail ingestion and classification core for the `mailsift` back office.
//!
//! This crate provides:
//! - Mailbox account management with vault-encrypted credentials
//! - **Sync Engine** - bounded incremental synchronization per account
//! - **Account Poller** - one self-rescheduling task per active mailbox
//! - Message normalization (dedup, threading, snippets)
//! - HTML sanitization for untrusted message bodies
//! - Rule-based classification with a cached, invalidatable rule set
//! - Attachment storage with SHA-256 integrity checksums
//! - Append-only sync run log

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod attachment;
pub mod classify;
mod config;
mod error;
pub mod message;
pub mod sanitize;
pub mod sync;
pub mod vault;

pub use account::{
    AccountId, AccountRepository, ImapConfig, MailAccount, SyncPolicy, ValidationError,
    ValidationResult, validate_account,
};
pub use attachment::{AttachmentRecord, AttachmentStore, StoredFile};
pub use classify::{
    Classification, ClassificationRule, Classifier, EmailFields, MatchMode, RuleRepository,
    RuleType,
};
pub use config::Config;
pub use error::{Error, Result};
pub use message::{
    Direction, Email, EmailAddress, FlagPatch, MessageFilter, MessageRepository, NormalizedEmail,
    Normalizer,
};
pub use sanitize::Sanitizer;
pub use sync::{
    ActiveSessions, ImapSource, MailboxSession, MessageSource, Poller, RawMessage, RunCounts,
    RunError, RunStatus, RunType, SourceError, StopSignal, SyncEngine, SyncLogRepository,
    SyncReport, SyncRun,
};
pub use vault::{Vault, VaultError};
