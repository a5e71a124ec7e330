//! # mailsift-mime
//!
//! MIME message parsing for the mailsift ingestion pipeline.
//!
//! ## Features
//!
//! - **Message parsing**: RFC 822 header block plus recursive multipart body
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words
//! - **Addresses**: mailbox and address-list parsing (`Name <addr>`)
//! - **Attachments**: filename/disposition/content-id detection on parts
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsift_mime::Message;
//!
//! let raw = b"From: sender@example.com\r\n\
//!             Subject: Test\r\n\
//!             Content-Type: text/plain\r\n\
//!             \r\n\
//!             Hello, World!";
//!
//! let message = Message::parse(raw)?;
//! println!("Subject: {}", message.subject().unwrap_or_default());
//! for part in message.attachment_parts() {
//!     println!("attachment: {:?}", part.filename());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use address::{Mailbox, parse_address_list, parse_mailbox};
pub use content_type::{ContentDisposition, ContentType};
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Message, Part, TransferEncoding};
