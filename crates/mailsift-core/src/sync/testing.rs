//! In-memory message source for engine and poller tests.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::source::{MailboxSession, MessageSource, RawMessage, SourceError};
use crate::account::MailAccount;

#[derive(Default)]
struct FakeState {
    mailboxes: HashMap<i64, Vec<RawMessage>>,
    fail_connect: HashMap<i64, String>,
    connects: Vec<i64>,
    expected_password: Option<String>,
}

/// Scriptable in-memory source keyed by account id.
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one message to an account's mailbox.
    pub async fn put_message(&self, account_id: i64, uid: u32, flags: &[&str], body: &[u8]) {
        let mut state = self.state.lock().await;
        state.mailboxes.entry(account_id).or_default().push(RawMessage {
            uid,
            flags: flags.iter().map(ToString::to_string).collect(),
            body: body.to_vec(),
        });
    }

    /// Makes connects for an account fail with a connection error.
    pub async fn fail_connect(&self, account_id: i64, message: &str) {
        self.state
            .lock()
            .await
            .fail_connect
            .insert(account_id, message.to_string());
    }

    /// Clears a previously scripted connect failure.
    pub async fn heal_connect(&self, account_id: i64) {
        self.state.lock().await.fail_connect.remove(&account_id);
    }

    /// Requires this password on connect, anything else is rejected.
    pub async fn expect_password(&self, password: &str) {
        self.state.lock().await.expected_password = Some(password.to_string());
    }

    /// How many times an account connected.
    pub async fn connect_count(&self, account_id: i64) -> usize {
        self.state
            .lock()
            .await
            .connects
            .iter()
            .filter(|&&id| id == account_id)
            .count()
    }
}

pub struct FakeSession {
    messages: Vec<RawMessage>,
}

impl MessageSource for FakeSource {
    type Session = FakeSession;

    async fn connect(
        &self,
        account: &MailAccount,
        password: &str,
    ) -> Result<FakeSession, SourceError> {
        let account_id = account.id.map_or(0, |id| id.0);
        let mut state = self.state.lock().await;
        state.connects.push(account_id);

        if let Some(message) = state.fail_connect.get(&account_id) {
            return Err(SourceError::Connection(message.clone()));
        }
        if let Some(expected) = &state.expected_password
            && expected != password
        {
            return Err(SourceError::Authentication("invalid credentials".to_string()));
        }

        Ok(FakeSession {
            messages: state.mailboxes.get(&account_id).cloned().unwrap_or_default(),
        })
    }
}

impl MailboxSession for FakeSession {
    async fn uids_since(&mut self, watermark: Option<u32>) -> Result<Vec<u32>, SourceError> {
        let floor = watermark.unwrap_or(0);
        let mut uids: Vec<u32> = self
            .messages
            .iter()
            .map(|m| m.uid)
            .filter(|&uid| uid > floor)
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch(&mut self, uid: u32) -> Result<Option<RawMessage>, SourceError> {
        Ok(self.messages.iter().find(|m| m.uid == uid).cloned())
    }

    async fn close(self) {}
}
