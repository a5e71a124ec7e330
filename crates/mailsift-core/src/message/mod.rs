//! Persisted messages: model, storage, and the MIME normalizer.

mod model;
mod normalizer;
mod repository;

pub use model::{DEFAULT_PAGE_SIZE, Direction, Email, EmailAddress, FlagPatch, MessageFilter};
pub use normalizer::{AttachmentContent, NormalizedEmail, Normalizer};
pub use repository::MessageRepository;
