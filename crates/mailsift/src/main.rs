//! mailsift - mail ingestion and classification daemon.
//!
//! Polls configured IMAP mailboxes, normalizes and classifies inbound
//! messages, and persists them with their attachments. Runs until
//! interrupted, then shuts down cooperatively.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailsift_core::{
    AccountRepository, AttachmentStore, Classifier, Config, ImapSource, MessageRepository,
    Normalizer, Poller, RuleRepository, Sanitizer, StopSignal, SyncEngine, SyncLogRepository,
    Vault,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mailsift");
    config.validate().context("invalid configuration")?;

    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    std::fs::create_dir_all(&config.attachment_root)
        .context("failed to create attachment root")?;

    let accounts = Arc::new(
        AccountRepository::new(&config.database_path)
            .await
            .context("failed to open account repository")?,
    );
    let messages = Arc::new(
        MessageRepository::new(&config.database_path)
            .await
            .context("failed to open message repository")?,
    );
    let sync_log = Arc::new(
        SyncLogRepository::new(&config.database_path)
            .await
            .context("failed to open sync log")?,
    );
    let rules = Arc::new(
        RuleRepository::new(&config.database_path)
            .await
            .context("failed to open rule repository")?,
    );

    let vault = Arc::new(Vault::new(&config.master_secret));
    let classifier = Arc::new(Classifier::new(rules));
    let store = Arc::new(AttachmentStore::new(config.attachment_root.clone()));
    let shutdown = StopSignal::new();

    let engine = Arc::new(SyncEngine::new(
        ImapSource,
        Arc::clone(&accounts),
        messages,
        sync_log,
        classifier,
        vault,
        store,
        Normalizer::new(Sanitizer::new()),
        shutdown.clone(),
    ));
    let sessions = engine.active_sessions();

    let poller = Poller::new(engine, accounts, shutdown.clone());
    let started = poller
        .start_all_active()
        .await
        .context("failed to start account schedules")?;
    info!(accounts = started, "account polling started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    // Cooperative shutdown: stop arming new ticks, flag running loops, and
    // report sessions still draining their current message.
    shutdown.trigger();
    poller.stop_all().await;

    let open = sessions.snapshot().await;
    if !open.is_empty() {
        warn!(accounts = ?open, "waiting on open mailbox sessions to close");
    }

    info!("mailsift stopped");
    Ok(())
}
