//! Mailbox synchronization: the per-account sync engine, the poller that
//! schedules it, the run log, and the cooperative stop signal.

mod engine;
mod log;
mod poller;
mod signal;
mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{ActiveSessions, SyncEngine, SyncReport};
pub use log::{RunCounts, RunError, RunStatus, RunType, SyncLogRepository, SyncRun};
pub use poller::Poller;
pub use signal::StopSignal;
pub use source::{ImapSource, MailboxSession, MessageSource, RawMessage, SourceError};
