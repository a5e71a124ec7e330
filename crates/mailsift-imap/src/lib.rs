//! # mailsift-imap
//!
//! A minimal async IMAP client scoped to incremental mailbox ingestion:
//! connect, LOGIN, SELECT, UID SEARCH above a watermark, UID FETCH of full
//! messages, NOOP, LOGOUT. Full protocol conformance is a non-goal.
//!
//! ## Features
//!
//! - **Type-state connection management**: compile-time enforcement of
//!   valid state transitions (`NotAuthenticated` → `Authenticated` →
//!   `Selected`)
//! - **TLS via rustls**: secure connections without an OpenSSL dependency
//! - **Literal-aware framing**: CRLF lines with `{n}` literals
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsift_imap::{Client, connect_tls};
//!
//! let stream = connect_tls("imap.example.com", 993).await?;
//! let client = Client::from_stream(stream).await?;
//! let client = client.login("user@example.com", "password").await?;
//! let (mut client, status) = client.select("INBOX").await?;
//!
//! for uid in client.uid_search_since(Some(100)).await? {
//!     if let Some(data) = client.uid_fetch_full(uid).await? {
//!         println!("uid {uid}: {} bytes", data.body.map_or(0, |b| b.len()));
//!     }
//! }
//! client.logout().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, FramedStream, ImapStream, NotAuthenticated, Selected, connect_plain,
    connect_tls,
};
pub use error::{Error, Result};
pub use parser::FetchData;
pub use types::{Flag, Flags, MailboxStatus};
