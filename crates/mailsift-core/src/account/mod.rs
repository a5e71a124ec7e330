//! Mail account management: model, validation, and storage.

mod model;
mod repository;
mod validation;

pub use model::{AccountId, ImapConfig, MailAccount, SyncPolicy};
pub use repository::AccountRepository;
pub use validation::{ValidationError, ValidationResult, validate_account};
