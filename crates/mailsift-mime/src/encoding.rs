//! MIME decoding utilities.
//!
//! mailsift only ingests mail, so this module covers the decode side of
//! Base64, Quoted-Printable, and RFC 2047 encoded words.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decodes Base64 data, tolerating embedded whitespace and line folds.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// Soft line breaks (`=` at end of line) are removed; `=XX` sequences are
/// decoded to their byte value.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();

    while let Some(b) = bytes.next() {
        if b != b'=' {
            result.push(b);
            continue;
        }

        // Soft line break: =\r\n or =\n
        if bytes.peek() == Some(&b'\r') {
            bytes.next();
            if bytes.peek() == Some(&b'\n') {
                bytes.next();
            }
            continue;
        }
        if bytes.peek() == Some(&b'\n') {
            bytes.next();
            continue;
        }

        let hi = bytes.next();
        let lo = bytes.next();
        match (hi, lo) {
            (Some(hi), Some(lo)) => {
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex)
                    .map_err(|e| Error::InvalidEncoding(format!("Invalid escape: {e}")))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
                result.push(byte);
            }
            _ => {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(result)
}

/// Decodes a header value containing RFC 2047 encoded words.
///
/// Encoded words have the form `=?charset?encoding?encoded-text?=` and may
/// be mixed with plain text. Unknown charsets are decoded lossily as UTF-8;
/// malformed words are passed through unchanged rather than failing the
/// whole header.
#[must_use]
pub fn decode_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut last_was_encoded = false;

    while let Some(start) = rest.find("=?") {
        let (plain, tail) = rest.split_at(start);

        // Whitespace between adjacent encoded words is ignored (RFC 2047 §6.2).
        if !(last_was_encoded && plain.chars().all(char::is_whitespace)) {
            out.push_str(plain);
        }

        match decode_encoded_word(tail) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &tail[consumed..];
                last_was_encoded = true;
            }
            None => {
                out.push_str("=?");
                rest = &tail[2..];
                last_was_encoded = false;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Decodes a single encoded word at the start of `text`.
///
/// Returns the decoded string and the number of bytes consumed.
fn decode_encoded_word(text: &str) -> Option<(String, usize)> {
    let inner = text.strip_prefix("=?")?;
    let end = inner.find("?=")?;
    let word = &inner[..end];
    let consumed = 2 + end + 2;

    let mut parts = word.splitn(3, '?');
    let _charset = parts.next()?;
    let encoding = parts.next()?;
    let payload = parts.next()?;

    let bytes = match encoding {
        "B" | "b" => decode_base64(payload).ok()?,
        "Q" | "q" => {
            // Q encoding uses underscore for space.
            let payload = payload.replace('_', " ");
            decode_quoted_printable(&payload).ok()?
        }
        _ => return None,
    };

    Some((String::from_utf8_lossy(&bytes).into_owned(), consumed))
}
