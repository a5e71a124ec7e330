//! Account validation.
//!
//! Administrative input errors are reported synchronously and distinctly
//! from internal failures: callers get the full list of invalid fields.

use super::model::MailAccount;

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Account name is empty.
    EmptyName,
    /// Email address is empty.
    EmptyEmail,
    /// Email address format is invalid.
    InvalidEmail,
    /// IMAP host is empty.
    EmptyHost,
    /// IMAP port is invalid.
    InvalidPort,
    /// IMAP username is empty.
    EmptyUsername,
    /// Folder name is empty.
    EmptyFolder,
    /// Sync interval is zero.
    InvalidInterval,
    /// Per-run message cap is zero.
    InvalidMessageCap,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyName => "Account name is required",
            Self::EmptyEmail => "Email address is required",
            Self::InvalidEmail => "Invalid email address format",
            Self::EmptyHost => "IMAP server is required",
            Self::InvalidPort => "IMAP port must be 1-65535",
            Self::EmptyUsername => "IMAP username is required",
            Self::EmptyFolder => "Folder name is required",
            Self::InvalidInterval => "Sync interval must be positive",
            Self::InvalidMessageCap => "Per-run message cap must be positive",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyName => "name",
            Self::EmptyEmail | Self::InvalidEmail => "email",
            Self::EmptyHost => "imap_host",
            Self::InvalidPort => "imap_port",
            Self::EmptyUsername => "imap_username",
            Self::EmptyFolder => "folder",
            Self::InvalidInterval => "sync_interval_secs",
            Self::InvalidMessageCap => "max_messages_per_sync",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// # Errors
///
/// Returns a vector of `ValidationError` covering every invalid field.
pub fn validate_account(account: &MailAccount) -> ValidationResult {
    let mut errors = Vec::new();

    if account.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    if account.email.trim().is_empty() {
        errors.push(ValidationError::EmptyEmail);
    } else if !is_valid_email(&account.email) {
        errors.push(ValidationError::InvalidEmail);
    }

    if account.imap.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if account.imap.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if account.imap.username.trim().is_empty() {
        errors.push(ValidationError::EmptyUsername);
    }
    if account.imap.folder.trim().is_empty() {
        errors.push(ValidationError::EmptyFolder);
    }

    if account.policy.interval_secs == 0 {
        errors.push(ValidationError::InvalidInterval);
    }
    if account.policy.max_messages_per_sync == 0 {
        errors.push(ValidationError::InvalidMessageCap);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Basic email shape check: one `@` with non-empty local and domain parts.
fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        _ => false,
    }
}
