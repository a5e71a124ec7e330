//! Message source abstraction.
//!
//! The sync engine talks to mailboxes through [`MessageSource`] /
//! [`MailboxSession`], so tests substitute an in-memory source and the
//! production path plugs in [`ImapSource`] over `mailsift-imap`.

use std::future::Future;

use thiserror::Error;
use tracing::debug;

use mailsift_imap::{Client, ImapStream, Selected, connect_plain, connect_tls};

use crate::account::MailAccount;

/// Connection-level failures surfaced by a source.
///
/// All of these abort the current run; per-message problems are reported
/// through the fetch results instead.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Could not reach or negotiate with the server.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Connect or command exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Server broke protocol expectations.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// One raw message as delivered by the protocol.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Protocol UID.
    pub uid: u32,
    /// Protocol flags in wire form.
    pub flags: Vec<String>,
    /// Raw RFC 822 bytes.
    pub body: Vec<u8>,
}

/// An open, folder-selected mailbox session.
pub trait MailboxSession: Send {
    /// UIDs strictly above the watermark, ascending.
    fn uids_since(
        &mut self,
        watermark: Option<u32>,
    ) -> impl Future<Output = Result<Vec<u32>, SourceError>> + Send;

    /// Fetches one message. `None` when the UID vanished between search
    /// and fetch.
    fn fetch(
        &mut self,
        uid: u32,
    ) -> impl Future<Output = Result<Option<RawMessage>, SourceError>> + Send;

    /// Closes the session, logging out politely. Never fails.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Factory opening sessions against an account's configured mailbox.
pub trait MessageSource: Send + Sync + 'static {
    /// Session type produced by this source.
    type Session: MailboxSession;

    /// Connects, authenticates, and selects the account's folder.
    fn connect(
        &self,
        account: &MailAccount,
        password: &str,
    ) -> impl Future<Output = Result<Self::Session, SourceError>> + Send;
}

/// Production source backed by the IMAP client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapSource;

/// A selected IMAP session.
pub struct ImapSession {
    client: Client<ImapStream, Selected>,
}

impl MessageSource for ImapSource {
    type Session = ImapSession;

    async fn connect(
        &self,
        account: &MailAccount,
        password: &str,
    ) -> Result<ImapSession, SourceError> {
        let stream = if account.imap.use_tls {
            connect_tls(&account.imap.host, account.imap.port).await
        } else {
            connect_plain(&account.imap.host, account.imap.port).await
        }
        .map_err(map_imap_error)?;

        let client = Client::from_stream(stream).await.map_err(map_imap_error)?;
        let client = client
            .login(&account.imap.username, password)
            .await
            .map_err(map_imap_error)?;
        let (client, status) = client
            .select(&account.imap.folder)
            .await
            .map_err(map_imap_error)?;

        debug!(
            host = %account.imap.host,
            folder = %account.imap.folder,
            exists = status.exists,
            "opened IMAP session"
        );
        Ok(ImapSession { client })
    }
}

impl MailboxSession for ImapSession {
    async fn uids_since(&mut self, watermark: Option<u32>) -> Result<Vec<u32>, SourceError> {
        self.client
            .uid_search_since(watermark)
            .await
            .map_err(map_imap_error)
    }

    async fn fetch(&mut self, uid: u32) -> Result<Option<RawMessage>, SourceError> {
        let Some(data) = self.client.uid_fetch_full(uid).await.map_err(map_imap_error)? else {
            return Ok(None);
        };

        let Some(body) = data.body else {
            return Err(SourceError::Protocol(format!(
                "FETCH response for UID {uid} carried no body"
            )));
        };

        Ok(Some(RawMessage {
            uid: data.uid.unwrap_or(uid),
            flags: data.flags.as_strings(),
            body,
        }))
    }

    async fn close(self) {
        if let Err(e) = self.client.logout().await {
            debug!("IMAP logout failed: {e}");
        }
    }
}

/// Maps IMAP client errors onto the source taxonomy.
fn map_imap_error(error: mailsift_imap::Error) -> SourceError {
    use mailsift_imap::Error;
    match error {
        Error::Auth(text) => SourceError::Authentication(text),
        Error::Io(e) => SourceError::Connection(e.to_string()),
        Error::Tls(e) => SourceError::Connection(e.to_string()),
        Error::InvalidDnsName(e) => SourceError::Connection(e.to_string()),
        Error::Bye(text) => SourceError::Connection(format!("server closed connection: {text}")),
        Error::No(text) | Error::Bad(text) => SourceError::Protocol(text),
        Error::Protocol(text) => SourceError::Protocol(text),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let auth = map_imap_error(mailsift_imap::Error::Auth("denied".to_string()));
        assert!(matches!(auth, SourceError::Authentication(_)));

        let io = map_imap_error(mailsift_imap::Error::Io(std::io::Error::other("reset")));
        assert!(matches!(io, SourceError::Connection(_)));

        let no = map_imap_error(mailsift_imap::Error::No("denied".to_string()));
        assert!(matches!(no, SourceError::Protocol(_)));
    }
}
