//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailsift_imap::Error),

    /// MIME parsing failed.
    #[error("MIME error: {0}")]
    Mime(#[from] mailsift_mime::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    /// Message not found.
    #[error("Message not found: {0}")]
    MessageNotFound(i64),

    /// Attachment not found.
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(i64),

    /// Classification rule not found.
    #[error("Classification rule not found: {0}")]
    RuleNotFound(i64),

    /// Invalid administrative input.
    #[error("Validation failed: {0:?}")]
    Validation(Vec<crate::account::ValidationError>),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential vault error.
    #[error("Vault error: {0}")]
    Vault(#[from] crate::vault::VaultError),

    /// Connection-level sync failure.
    #[error("Sync error: {0}")]
    Source(#[from] crate::sync::SourceError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
