//! Rule-based message classification: models, storage, and the cached
//! evaluation engine.

mod engine;
mod model;
mod repository;

pub use engine::Classifier;
pub use model::{Classification, ClassificationRule, EmailFields, MatchMode, RuleType};
pub use repository::RuleRepository;
