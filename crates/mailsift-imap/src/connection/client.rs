//! Type-state IMAP client connection.
//!
//! The type parameter tracks the connection state at compile time:
//! `NotAuthenticated` → `Authenticated` → `Selected`. Each state only
//! exposes the operations that are valid in it, which is exactly the
//! command set the sync engine needs.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::framed::FramedStream;
use crate::command::{self, TagGenerator};
use crate::parser::{self, FetchData};
use crate::types::MailboxStatus;
use crate::{Error, Result};

/// Initial state after connecting, before LOGIN.
#[derive(Debug)]
pub struct NotAuthenticated;

/// State after a successful LOGIN.
#[derive(Debug)]
pub struct Authenticated;

/// State after a successful SELECT.
#[derive(Debug)]
pub struct Selected;

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Transitions to another state, keeping the stream and tag counter.
    fn transition<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tags: self.tags,
            _state: PhantomData,
        }
    }

    /// Sends a command and reads responses until its tagged completion.
    async fn round_trip(&mut self, tag: &str, cmd: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.stream.write_command(cmd).await?;
        let responses = self.stream.read_until_tagged(tag).await?;
        check_tagged(&responses, tag)?;
        Ok(responses)
    }

    /// Sends a NOOP command to keep the connection alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn noop(&mut self) -> Result<()> {
        let tag = self.tags.next();
        self.round_trip(&tag, &command::noop(&tag)).await?;
        Ok(())
    }

    /// Sends LOGOUT and drops the connection.
    ///
    /// Valid in any state. The server answers with BYE before the tagged
    /// OK; both are tolerated.
    ///
    /// # Errors
    ///
    /// Returns an error if writing the command fails.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.tags.next();
        self.stream.write_command(&command::logout(&tag)).await?;

        // Read the BYE/OK exchange leniently: some servers close early.
        match self.stream.read_until_tagged(&tag).await {
            Ok(_) | Err(Error::Io(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream, reading the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is missing or is a BYE.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        if let Some(text) = parser::parse_bye(&greeting) {
            return Err(Error::Bye(text));
        }
        if !greeting.starts_with(b"* OK") && !greeting.starts_with(b"* PREAUTH") {
            return Err(Error::Protocol(format!(
                "unexpected greeting: {}",
                String::from_utf8_lossy(&greeting).trim()
            )));
        }

        Ok(Self {
            stream: framed,
            tags: TagGenerator::new(),
            _state: PhantomData,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// Returns `Error::Auth` if the server rejects the credentials.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let tag = self.tags.next();
        let cmd = command::login(&tag, username, password);

        self.stream.write_command(&cmd).await?;
        let responses = self.stream.read_until_tagged(&tag).await?;

        check_tagged(&responses, &tag).map_err(|e| match e {
            Error::No(text) | Error::Bad(text) => Error::Auth(text),
            other => other,
        })?;

        debug!(username, "IMAP login succeeded");
        Ok(self.transition())
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox does not exist or cannot be opened.
    pub async fn select(mut self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxStatus)> {
        let tag = self.tags.next();
        let responses = self.round_trip(&tag, &command::select(&tag, mailbox)).await?;
        let status = parser::fold_mailbox_status(&responses);

        debug!(mailbox, exists = status.exists, "selected mailbox");
        Ok((self.transition(), status))
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Searches for UIDs strictly above the watermark, ascending.
    ///
    /// Servers answer `UID n:*` with at least the last message even when
    /// its UID is at or below `n`; such UIDs are filtered out here.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn uid_search_since(&mut self, watermark: Option<u32>) -> Result<Vec<u32>> {
        let tag = self.tags.next();
        let responses = self
            .round_trip(&tag, &command::uid_search_since(&tag, watermark))
            .await?;

        let mut uids: Vec<u32> = responses
            .iter()
            .filter_map(|r| parser::parse_search(r))
            .flatten()
            .filter(|&uid| watermark.is_none_or(|w| uid > w))
            .collect();
        uids.sort_unstable();
        uids.dedup();

        Ok(uids)
    }

    /// Fetches flags and the full raw message for one UID.
    ///
    /// Returns `None` if the server reports nothing for the UID (expunged
    /// between search and fetch).
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn uid_fetch_full(&mut self, uid: u32) -> Result<Option<FetchData>> {
        let tag = self.tags.next();
        let responses = self
            .round_trip(&tag, &command::uid_fetch_full(&tag, uid))
            .await?;

        Ok(responses.iter().find_map(|r| parser::parse_fetch(r)))
    }
}

/// Checks the tagged completion in a response batch.
fn check_tagged(responses: &[Vec<u8>], tag: &str) -> Result<()> {
    for response in responses.iter().rev() {
        if let Some((status, text)) = parser::parse_tagged(response, tag) {
            return parser::require_ok(status, text);
        }
    }
    Err(Error::Protocol("missing tagged response".to_string()))
}
