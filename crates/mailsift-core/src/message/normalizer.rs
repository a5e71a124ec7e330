//! Message normalizer.
//!
//! Converts a raw MIME object plus its protocol envelope (UID, flags) into
//! the persisted message shape: decoded envelope, plain and sanitized HTML
//! bodies, snippet, thread id, and attachment contents ready for storage.

use chrono::{DateTime, Utc};
use mailsift_mime::{Message, Part};

use super::model::EmailAddress;
use crate::Result;
use crate::sanitize::Sanitizer;

/// Snippet length in characters.
const SNIPPET_LENGTH: usize = 250;

/// One attachment's content and metadata, decoded and ready to store.
#[derive(Debug, Clone)]
pub struct AttachmentContent {
    /// Filename as transmitted, if any.
    pub filename: Option<String>,
    /// MIME type of the part.
    pub mime_type: String,
    /// Content-ID for inline references.
    pub content_id: Option<String>,
    /// Whether the part was declared inline.
    pub is_inline: bool,
    /// Decoded content bytes.
    pub data: Vec<u8>,
}

/// The normalized shape of one inbound message.
#[derive(Debug, Clone)]
pub struct NormalizedEmail {
    /// Protocol Message-ID, angle brackets stripped.
    pub message_id: Option<String>,
    /// Thread identifier (see [`Normalizer::normalize`]).
    pub thread_id: String,
    /// From participants.
    pub from: Vec<EmailAddress>,
    /// To participants.
    pub to: Vec<EmailAddress>,
    /// CC participants.
    pub cc: Vec<EmailAddress>,
    /// BCC participants.
    pub bcc: Vec<EmailAddress>,
    /// Reply-To participants.
    pub reply_to: Vec<EmailAddress>,
    /// Decoded subject.
    pub subject: String,
    /// Plain-text body (derived from HTML when no text part exists).
    pub body_text: String,
    /// Sanitized HTML body.
    pub body_html: Option<String>,
    /// HTML body as transmitted.
    pub body_html_raw: Option<String>,
    /// Whitespace-collapsed preview of the plain-text body.
    pub snippet: String,
    /// Date header.
    pub date: Option<DateTime<Utc>>,
    /// Raw header block, for header-type classification rules.
    pub headers_raw: String,
    /// Attachment contents.
    pub attachments: Vec<AttachmentContent>,
}

/// Turns raw MIME bytes into the persisted message shape.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    sanitizer: Sanitizer,
}

impl Normalizer {
    /// Creates a normalizer with the given sanitizer.
    #[must_use]
    pub fn new(sanitizer: Sanitizer) -> Self {
        Self { sanitizer }
    }

    /// Normalizes one raw message.
    ///
    /// Thread id resolution: the first References entry, else In-Reply-To,
    /// else the message's own Message-ID, all compared with angle brackets
    /// stripped. A message carrying none of the three gets an empty thread
    /// id.
    ///
    /// # Errors
    ///
    /// Returns an error if the raw bytes cannot be parsed as a MIME
    /// message.
    pub fn normalize(&self, raw: &[u8]) -> Result<NormalizedEmail> {
        let message = Message::parse(raw)?;

        let message_id = message.message_id().filter(|id| !id.is_empty());
        let thread_id = message
            .references()
            .into_iter()
            .next()
            .or_else(|| message.in_reply_to())
            .or_else(|| message_id.clone())
            .unwrap_or_default();

        let body_text_part = message
            .find_text_part("plain")
            .and_then(|part| part.body_text().ok());
        let body_html_raw = message
            .find_text_part("html")
            .and_then(|part| part.body_text().ok());

        // HTML-only messages still get a plain body for snippets and
        // body-keyword classification.
        let body_text = body_text_part.unwrap_or_else(|| {
            body_html_raw
                .as_deref()
                .map(|html| htmd::convert(html).unwrap_or_default())
                .unwrap_or_default()
        });

        let body_html = body_html_raw
            .as_deref()
            .map(|html| self.sanitizer.sanitize(html));

        let snippet = make_snippet(&body_text);
        let attachments = message
            .attachment_parts()
            .into_iter()
            .map(attachment_content)
            .collect();

        Ok(NormalizedEmail {
            message_id,
            thread_id,
            from: address_list(&message, "from"),
            to: address_list(&message, "to"),
            cc: address_list(&message, "cc"),
            bcc: address_list(&message, "bcc"),
            reply_to: address_list(&message, "reply-to"),
            subject: message.subject().unwrap_or_default(),
            body_text,
            body_html,
            body_html_raw,
            snippet,
            date: message.date(),
            headers_raw: message.headers.to_raw(),
            attachments,
        })
    }
}

/// Extracts a header address list into the persisted shape.
fn address_list(message: &Message, header: &str) -> Vec<EmailAddress> {
    message
        .address_list(header)
        .iter()
        .map(EmailAddress::from)
        .collect()
}

/// Decodes one attachment part; transfer-decoding failures fall back to
/// the raw bytes rather than losing the part.
fn attachment_content(part: &Part) -> AttachmentContent {
    AttachmentContent {
        filename: part.filename(),
        mime_type: part.content_type().essence(),
        content_id: part.content_id(),
        is_inline: part
            .content_disposition()
            .is_some_and(|cd| cd.is_inline()),
        data: part.decode_body().unwrap_or_else(|_| part.body.clone()),
    }
}

/// First ~250 characters of the plain text, whitespace collapsed.
fn make_snippet(body_text: &str) -> String {
    let collapsed = body_text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SNIPPET_LENGTH).collect()
}
