//! MIME message parsing.
//!
//! Parses raw RFC 822 messages into a header block plus a tree of parts,
//! with helpers for the accessors the ingestion pipeline needs: bodies,
//! attachment parts, threading headers.

use chrono::{DateTime, Utc};

use crate::address::{Mailbox, parse_address_list};
use crate::content_type::{ContentDisposition, ContentType};
use crate::encoding::{decode_base64, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }
}

/// One node in the MIME part tree.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Raw body bytes (still transfer-encoded) for leaf parts.
    pub body: Vec<u8>,
    /// Child parts for multipart nodes.
    pub children: Vec<Part>,
}

impl Part {
    /// Gets the content type, defaulting to text/plain.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|v| ContentType::parse(v).ok())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// Gets the content disposition if present.
    #[must_use]
    pub fn content_disposition(&self) -> Option<ContentDisposition> {
        self.headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
    }

    /// Gets the Content-ID with surrounding angle brackets stripped.
    #[must_use]
    pub fn content_id(&self) -> Option<String> {
        self.headers
            .get("content-id")
            .map(|v| v.trim().trim_start_matches('<').trim_end_matches('>').to_string())
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&String::from_utf8_lossy(&self.body)),
            TransferEncoding::QuotedPrintable => {
                decode_quoted_printable(&String::from_utf8_lossy(&self.body))
            }
            _ => Ok(self.body.clone()),
        }
    }

    /// Gets the decoded body as text, lossily for non-UTF-8 charsets.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.decode_body()?).into_owned())
    }

    /// Returns the filename for this part, from the disposition or the
    /// legacy Content-Type `name` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        if let Some(cd) = self.content_disposition()
            && let Some(name) = cd.filename()
        {
            return Some(crate::encoding::decode_header_value(name));
        }
        self.content_type()
            .name()
            .map(crate::encoding::decode_header_value)
    }

    /// Whether this part carries an attachment.
    ///
    /// Any part with a filename or a non-inline disposition counts.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        if self.filename().is_some() {
            return true;
        }
        self.content_disposition()
            .is_some_and(|cd| !cd.is_inline())
    }

    /// Depth-first iteration over leaf parts.
    pub fn leaves(&self) -> Vec<&Part> {
        if self.children.is_empty() {
            vec![self]
        } else {
            self.children.iter().flat_map(Part::leaves).collect()
        }
    }
}

/// A parsed MIME message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Top-level headers.
    pub headers: Headers,
    /// Root part holding the body tree.
    pub root: Part,
}

impl Message {
    /// Parses a raw RFC 822 message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message has no header/body separator and no
    /// parseable headers.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (header_bytes, body) = split_header_block(raw);
        let header_text = String::from_utf8_lossy(header_bytes);
        let headers = Headers::parse(&header_text);

        if headers.iter().next().is_none() {
            return Err(Error::Parse("no headers found".to_string()));
        }

        let root = parse_part(headers.clone(), body, 0)?;
        Ok(Self { headers, root })
    }

    /// Gets the Message-ID with angle brackets stripped.
    #[must_use]
    pub fn message_id(&self) -> Option<String> {
        self.headers.get("message-id").map(strip_angle_brackets)
    }

    /// Gets the In-Reply-To identifier with angle brackets stripped.
    #[must_use]
    pub fn in_reply_to(&self) -> Option<String> {
        self.headers.get("in-reply-to").map(strip_angle_brackets)
    }

    /// Gets all References identifiers with angle brackets stripped.
    #[must_use]
    pub fn references(&self) -> Vec<String> {
        self.headers
            .get("references")
            .map(|v| v.split_whitespace().map(strip_angle_brackets).collect())
            .unwrap_or_default()
    }

    /// Gets the decoded Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers.get_decoded("subject")
    }

    /// Gets the Date header parsed as RFC 2822.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.headers
            .get("date")
            .and_then(|v| DateTime::parse_from_rfc2822(v.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Parses an address-list header (from/to/cc/bcc/reply-to).
    #[must_use]
    pub fn address_list(&self, header: &str) -> Vec<Mailbox> {
        self.headers
            .get(header)
            .map(parse_address_list)
            .unwrap_or_default()
    }

    /// Finds the first text part of the given subtype that is not an
    /// attachment.
    #[must_use]
    pub fn find_text_part(&self, sub_type: &str) -> Option<&Part> {
        self.root
            .leaves()
            .into_iter()
            .find(|p| p.content_type().is("text", sub_type) && !p.is_attachment())
    }

    /// Returns all attachment parts.
    #[must_use]
    pub fn attachment_parts(&self) -> Vec<&Part> {
        self.root
            .leaves()
            .into_iter()
            .filter(|p| p.is_attachment())
            .collect()
    }
}

/// Maximum multipart nesting depth accepted before giving up.
const MAX_DEPTH: usize = 16;

/// Parses a part, recursing into multipart bodies.
fn parse_part(headers: Headers, body: &[u8], depth: usize) -> Result<Part> {
    if depth >= MAX_DEPTH {
        return Err(Error::Parse("multipart nesting too deep".to_string()));
    }

    let content_type = headers
        .get("content-type")
        .and_then(|v| ContentType::parse(v).ok())
        .unwrap_or_else(ContentType::text_plain);

    let Some(boundary) = content_type
        .is_multipart()
        .then(|| content_type.boundary().map(str::to_string))
        .flatten()
    else {
        return Ok(Part {
            headers,
            body: body.to_vec(),
            children: Vec::new(),
        });
    };

    let mut children = Vec::new();
    for raw_child in split_multipart(body, &boundary) {
        let (child_headers, child_body) = split_header_block(raw_child);
        let child_headers = Headers::parse(&String::from_utf8_lossy(child_headers));
        children.push(parse_part(child_headers, child_body, depth + 1)?);
    }

    Ok(Part {
        headers,
        body: Vec::new(),
        children,
    })
}

/// Splits raw bytes into header block and body at the first blank line.
fn split_header_block(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(idx) = find_subslice(raw, b"\r\n\r\n") {
        (&raw[..idx], &raw[idx + 4..])
    } else if let Some(idx) = find_subslice(raw, b"\n\n") {
        (&raw[..idx], &raw[idx + 2..])
    } else {
        (raw, &[])
    }
}

/// Splits a multipart body into its raw parts using the boundary.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut parts = Vec::new();
    let mut pos = 0;
    let mut part_start: Option<usize> = None;

    while let Some(idx) = find_subslice(&body[pos..], delimiter) {
        let line_start = pos + idx;
        let after = line_start + delimiter.len();

        if let Some(start) = part_start {
            // Strip the CRLF preceding the boundary line.
            let mut end = line_start;
            if end >= 2 && &body[end - 2..end] == b"\r\n" {
                end -= 2;
            } else if end >= 1 && body[end - 1] == b'\n' {
                end -= 1;
            }
            if end > start {
                parts.push(&body[start..end]);
            }
        }

        // Closing delimiter ends the scan.
        if body[after..].starts_with(b"--") {
            return parts;
        }

        // Part content starts after the boundary line's CRLF.
        let mut start = after;
        if body[start..].starts_with(b"\r\n") {
            start += 2;
        } else if body[start..].starts_with(b"\n") {
            start += 1;
        }
        part_start = Some(start);
        pos = start;
    }

    // Unterminated multipart: take what's there.
    if let Some(start) = part_start
        && start < body.len()
    {
        parts.push(&body[start..]);
    }

    parts
}

/// Finds the first occurrence of `needle` in `haystack`.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Strips surrounding angle brackets and whitespace from an identifier.
fn strip_angle_brackets(s: &str) -> String {
    s.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"From: a@b.com\r\n\
Message-ID: <one@b.com>\r\n\
Subject: Hello\r\n\
Content-Type: text/plain\r\n\
\r\n\
Body here";

    #[test]
    fn test_parse_simple() {
        let msg = Message::parse(SIMPLE).unwrap();
        assert_eq!(msg.message_id().unwrap(), "one@b.com");
        assert_eq!(msg.subject().unwrap(), "Hello");
        let text = msg.find_text_part("plain").unwrap();
        assert_eq!(text.body_text().unwrap(), "Body here");
    }

    #[test]
    fn test_parse_no_headers_fails() {
        assert!(Message::parse(b"just some text without colons\r\n").is_err());
    }

    fn multipart_fixture() -> Vec<u8> {
        b"From: a@b.com\r\n\
Message-ID: <two@b.com>\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: multipart/alternative; boundary=\"INNER\"\r\n\
\r\n\
--INNER\r\n\
Content-Type: text/plain\r\n\
\r\n\
plain body\r\n\
--INNER\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>html body</p>\r\n\
--INNER--\r\n\
--XYZ\r\n\
Content-Type: application/pdf; name=\"offer.pdf\"\r\n\
Content-Disposition: attachment; filename=\"offer.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERg==\r\n\
--XYZ--\r\n"
            .to_vec()
    }

    #[test]
    fn test_parse_nested_multipart() {
        let msg = Message::parse(&multipart_fixture()).unwrap();
        assert_eq!(msg.find_text_part("plain").unwrap().body_text().unwrap(), "plain body");
        assert_eq!(
            msg.find_text_part("html").unwrap().body_text().unwrap(),
            "<p>html body</p>"
        );
    }

    #[test]
    fn test_attachment_detection() {
        let msg = Message::parse(&multipart_fixture()).unwrap();
        let attachments = msg.attachment_parts();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename().unwrap(), "offer.pdf");
        assert_eq!(attachments[0].decode_body().unwrap(), b"%PDF");
    }

    #[test]
    fn test_inline_image_with_filename_is_attachment() {
        let raw = b"Content-Type: multipart/related; boundary=\"B\"\r\n\
From: a@b.com\r\n\
\r\n\
--B\r\n\
Content-Type: image/png\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
Content-ID: <logo@local>\r\n\
\r\n\
PNGDATA\r\n\
--B--\r\n";
        let msg = Message::parse(raw).unwrap();
        let attachments = msg.attachment_parts();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].content_id().unwrap(), "logo@local");
        assert!(attachments[0].content_disposition().unwrap().is_inline());
    }

    #[test]
    fn test_references_and_reply_to() {
        let raw = b"From: a@b.com\r\n\
Message-ID: <m3@b.com>\r\n\
References: <m1@b.com> <m2@b.com>\r\n\
In-Reply-To: <m2@b.com>\r\n\
\r\n\
body";
        let msg = Message::parse(raw).unwrap();
        assert_eq!(msg.references(), vec!["m1@b.com", "m2@b.com"]);
        assert_eq!(msg.in_reply_to().unwrap(), "m2@b.com");
    }

    #[test]
    fn test_date_parsing() {
        let raw = b"From: a@b.com\r\n\
Date: Tue, 1 Jul 2025 10:52:37 +0300\r\n\
\r\n\
body";
        let msg = Message::parse(raw).unwrap();
        let date = msg.date().unwrap();
        assert_eq!(date.to_rfc3339(), "2025-07-01T07:52:37+00:00");
    }

    #[test]
    fn test_address_list_accessor() {
        let raw = b"From: Ivan <ivan@x.ru>\r\nTo: a@y.ru, b@z.ru\r\n\r\nbody";
        let msg = Message::parse(raw).unwrap();
        assert_eq!(msg.address_list("from")[0].address, "ivan@x.ru");
        assert_eq!(msg.address_list("to").len(), 2);
        assert!(msg.address_list("cc").is_empty());
    }

    #[test]
    fn test_lf_only_separator() {
        let msg = Message::parse(b"From: a@b.com\nSubject: x\n\nbody").unwrap();
        assert_eq!(msg.find_text_part("plain").unwrap().body_text().unwrap(), "body");
    }

    #[test]
    fn test_quoted_printable_body() {
        let raw = b"From: a@b.com\r\n\
Content-Type: text/plain\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
H=C3=A9llo";
        let msg = Message::parse(raw).unwrap();
        assert_eq!(msg.find_text_part("plain").unwrap().body_text().unwrap(), "Héllo");
    }
}
