//! IMAP command construction.
//!
//! Covers the command set the sync engine actually issues: LOGIN, SELECT,
//! UID SEARCH, UID FETCH, NOOP, LOGOUT.

use std::sync::atomic::{AtomicU32, Ordering};

/// Tag generator for IMAP commands.
///
/// Generates unique sequential tags in the format "A0001", "A0002", etc.
#[derive(Debug, Default)]
pub struct TagGenerator {
    counter: AtomicU32,
}

impl TagGenerator {
    /// Creates a new tag generator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
        }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("A{:04}", n + 1)
    }
}

/// Serializes a LOGIN command.
#[must_use]
pub fn login(tag: &str, username: &str, password: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(tag.as_bytes());
    buf.extend_from_slice(b" LOGIN ");
    write_astring(&mut buf, username);
    buf.push(b' ');
    write_astring(&mut buf, password);
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Serializes a SELECT command.
#[must_use]
pub fn select(tag: &str, mailbox: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(tag.as_bytes());
    buf.extend_from_slice(b" SELECT ");
    write_astring(&mut buf, mailbox);
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Serializes a UID SEARCH for UIDs strictly above a watermark.
///
/// With no watermark the whole mailbox (`UID 1:*`) is searched.
#[must_use]
pub fn uid_search_since(tag: &str, watermark: Option<u32>) -> Vec<u8> {
    let lower = watermark.map_or(1, |w| w.saturating_add(1));
    format!("{tag} UID SEARCH UID {lower}:*\r\n").into_bytes()
}

/// Serializes a UID FETCH of flags plus the full raw message.
///
/// `BODY.PEEK[]` avoids setting `\Seen` on the server as a side effect.
#[must_use]
pub fn uid_fetch_full(tag: &str, uid: u32) -> Vec<u8> {
    format!("{tag} UID FETCH {uid} (UID FLAGS BODY.PEEK[])\r\n").into_bytes()
}

/// Serializes a NOOP command.
#[must_use]
pub fn noop(tag: &str) -> Vec<u8> {
    format!("{tag} NOOP\r\n").into_bytes()
}

/// Serializes a LOGOUT command.
#[must_use]
pub fn logout(tag: &str) -> Vec<u8> {
    format!("{tag} LOGOUT\r\n").into_bytes()
}

/// Writes an astring (atom or quoted string).
fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Returns true if the byte needs quoting.
const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}
