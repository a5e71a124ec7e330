//! Account poller.
//!
//! Owns exactly one recurring task per active account, registered in a
//! poller-owned map keyed by account id. Rescheduling is self-rescheduling,
//! not fixed-rate: the next tick is armed only after the current engine
//! invocation completes, so a slow mailbox can never pile up overlapping
//! runs. Accounts schedule fully independently of each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::SyncEngine;
use super::log::RunType;
use super::signal::StopSignal;
use super::source::MessageSource;
use crate::account::{AccountId, AccountRepository};
use crate::Result;

/// One registered account schedule.
struct PollTask {
    cancel: StopSignal,
    handle: JoinHandle<()>,
}

/// Registry of per-account polling tasks.
pub struct Poller<S: MessageSource> {
    engine: Arc<SyncEngine<S>>,
    accounts: Arc<AccountRepository>,
    shutdown: StopSignal,
    tasks: Mutex<HashMap<i64, PollTask>>,
}

impl<S: MessageSource> Poller<S> {
    /// Creates a poller over the given engine.
    #[must_use]
    pub fn new(
        engine: Arc<SyncEngine<S>>,
        accounts: Arc<AccountRepository>,
        shutdown: StopSignal,
    ) -> Self {
        Self {
            engine,
            accounts,
            shutdown,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts the recurring schedule for one account.
    ///
    /// A no-op when a schedule for the id is already running.
    pub async fn start(&self, account_id: AccountId, interval: Duration) {
        let mut tasks = self.tasks.lock().await;

        if let Some(existing) = tasks.get(&account_id.0)
            && !existing.handle.is_finished()
        {
            debug!(account_id = account_id.0, "poll schedule already running");
            return;
        }

        let cancel = StopSignal::new();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.engine),
            account_id,
            interval,
            cancel.clone(),
            self.shutdown.clone(),
        ));
        tasks.insert(account_id.0, PollTask { cancel, handle });
        info!(account_id = account_id.0, ?interval, "poll schedule started");
    }

    /// Cancels one account's pending tick. Idempotent.
    ///
    /// An in-flight run is not aborted; the loop exits at its next
    /// boundary check.
    pub async fn stop(&self, account_id: AccountId) {
        if let Some(task) = self.tasks.lock().await.remove(&account_id.0) {
            task.cancel.trigger();
            info!(account_id = account_id.0, "poll schedule stopped");
        }
    }

    /// Cancels every pending tick; used at process shutdown.
    pub async fn stop_all(&self) {
        let mut tasks = self.tasks.lock().await;
        let count = tasks.len();
        for (_, task) in tasks.drain() {
            task.cancel.trigger();
        }
        if count > 0 {
            info!(count, "all poll schedules stopped");
        }
    }

    /// Whether a schedule is currently registered for the account.
    pub async fn is_running(&self, account_id: AccountId) -> bool {
        self.tasks
            .lock()
            .await
            .get(&account_id.0)
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Starts schedules for every enabled account. Returns how many were
    /// started.
    ///
    /// # Errors
    ///
    /// Returns an error if the account listing fails.
    pub async fn start_all_active(&self) -> Result<usize> {
        let active = self.accounts.list_active().await?;
        let mut started = 0;
        for account in active {
            if let Some(id) = account.id {
                self.start(id, Duration::from_secs(u64::from(account.policy.interval_secs)))
                    .await;
                started += 1;
            }
        }
        Ok(started)
    }

    /// Restarts one account's schedule after an admin mutation: stops any
    /// existing task, then re-arms it if the account is still enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the account lookup fails.
    pub async fn rearm(&self, account_id: AccountId) -> Result<()> {
        self.stop(account_id).await;
        let account = self.accounts.require(account_id).await?;
        if account.policy.enabled {
            self.start(
                account_id,
                Duration::from_secs(u64::from(account.policy.interval_secs)),
            )
            .await;
        }
        Ok(())
    }
}

/// The per-account loop: run, then sleep, then repeat.
async fn poll_loop<S: MessageSource>(
    engine: Arc<SyncEngine<S>>,
    account_id: AccountId,
    interval: Duration,
    cancel: StopSignal,
    shutdown: StopSignal,
) {
    loop {
        if shutdown.is_triggered() || cancel.is_triggered() {
            break;
        }

        // Engine failures are absorbed; a broken run never kills the loop.
        match engine.sync_account(account_id, RunType::Scheduled).await {
            Ok(report) => debug!(
                account_id = account_id.0,
                status = report.status.as_str(),
                fetched = report.counts.fetched,
                "scheduled sync finished"
            ),
            Err(e) => warn!(account_id = account_id.0, "scheduled sync failed: {e}"),
        }

        // Arm the next tick only now that the run has completed.
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = cancel.wait() => break,
            () = shutdown.wait() => break,
        }
    }
    debug!(account_id = account_id.0, "poll loop exited");
}
