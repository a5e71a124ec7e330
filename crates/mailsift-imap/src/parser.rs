//! Response parsing for the commands the client issues.
//!
//! IMAP responses are CRLF lines, possibly carrying a `{n}` literal with
//! `n` bytes of raw data following the line. The framed stream hands this
//! module one complete response at a time (line plus any literal bytes).

use crate::error::{Error, Result};
use crate::types::{Flags, MailboxStatus};

/// Status of a tagged completion response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggedStatus {
    /// Command completed successfully.
    Ok,
    /// Command failed.
    No,
    /// Command was malformed or rejected.
    Bad,
}

/// Data extracted from a FETCH response.
#[derive(Debug, Clone, Default)]
pub struct FetchData {
    /// Message UID.
    pub uid: Option<u32>,
    /// Message flags.
    pub flags: Flags,
    /// Raw message body (the `BODY[]` literal).
    pub body: Option<Vec<u8>>,
}

/// Parses a tagged completion response for `tag`.
///
/// Returns `None` if the response is not the tagged line we are waiting
/// for.
#[must_use]
pub fn parse_tagged(response: &[u8], tag: &str) -> Option<(TaggedStatus, String)> {
    let line = first_line(response);
    let rest = line.strip_prefix(tag)?.strip_prefix(' ')?;

    let (status, text) = match rest.split_once(' ') {
        Some((word, text)) => (word, text),
        None => (rest, ""),
    };

    let status = match status {
        "OK" => TaggedStatus::Ok,
        "NO" => TaggedStatus::No,
        "BAD" => TaggedStatus::Bad,
        _ => return None,
    };

    Some((status, text.trim().to_string()))
}

/// Converts a tagged completion into a `Result`, mapping NO/BAD to errors.
///
/// # Errors
///
/// Returns `Error::No` or `Error::Bad` for failed completions.
pub fn require_ok(status: TaggedStatus, text: String) -> Result<()> {
    match status {
        TaggedStatus::Ok => Ok(()),
        TaggedStatus::No => Err(Error::No(text)),
        TaggedStatus::Bad => Err(Error::Bad(text)),
    }
}

/// Returns the BYE text if the response is an untagged BYE.
#[must_use]
pub fn parse_bye(response: &[u8]) -> Option<String> {
    first_line(response)
        .strip_prefix("* BYE")
        .map(|text| text.trim().to_string())
}

/// Parses an untagged `* SEARCH n n n` response.
#[must_use]
pub fn parse_search(response: &[u8]) -> Option<Vec<u32>> {
    let line = first_line(response);
    let rest = line.strip_prefix("* SEARCH")?;
    Some(
        rest.split_whitespace()
            .filter_map(|n| n.parse().ok())
            .collect(),
    )
}

/// Parses an untagged `* n EXISTS` response.
#[must_use]
pub fn parse_exists(response: &[u8]) -> Option<u32> {
    let line = first_line(response);
    let rest = line.strip_prefix("* ")?;
    let (count, keyword) = rest.split_once(' ')?;
    if keyword.trim() == "EXISTS" {
        count.parse().ok()
    } else {
        None
    }
}

/// Parses a `[UIDVALIDITY n]` response code from an untagged OK line.
#[must_use]
pub fn parse_uid_validity(response: &[u8]) -> Option<u32> {
    let line = first_line(response);
    if !line.starts_with("* OK") {
        return None;
    }
    let start = line.find("[UIDVALIDITY ")?;
    let rest = &line[start + "[UIDVALIDITY ".len()..];
    let end = rest.find(']')?;
    rest[..end].trim().parse().ok()
}

/// Folds untagged SELECT responses into a mailbox status.
pub fn fold_mailbox_status(responses: &[Vec<u8>]) -> MailboxStatus {
    let mut status = MailboxStatus::default();
    for response in responses {
        if let Some(exists) = parse_exists(response) {
            status.exists = exists;
        }
        if let Some(validity) = parse_uid_validity(response) {
            status.uid_validity = Some(validity);
        }
    }
    status
}

/// Parses an untagged FETCH response.
///
/// Handles attribute order variance: `UID` and `FLAGS` are looked up both
/// before the body literal and in the trailer after it.
#[must_use]
pub fn parse_fetch(response: &[u8]) -> Option<FetchData> {
    let header_end = response
        .windows(2)
        .position(|w| w == b"\r\n")
        .map_or(response.len(), |p| p + 2);
    let header = String::from_utf8_lossy(&response[..header_end]);

    if !header.contains(" FETCH ") || !header.starts_with("* ") {
        return None;
    }

    let mut data = FetchData::default();

    // A literal at the end of the header line carries the message body.
    let mut trailer = String::new();
    if let Some(len) = literal_length(&header) {
        let body_start = header_end;
        let body_end = body_start.checked_add(len)?;
        if body_end > response.len() {
            return None;
        }
        data.body = Some(response[body_start..body_end].to_vec());
        trailer = String::from_utf8_lossy(&response[body_end..]).into_owned();
    }

    for section in [header.as_ref(), trailer.as_str()] {
        if data.uid.is_none() {
            data.uid = scan_uid(section);
        }
        if data.flags.0.is_empty()
            && let Some(flags) = scan_flags(section)
        {
            data.flags = flags;
        }
    }

    Some(data)
}

/// Extracts a trailing `{n}` literal length from a response line.
fn literal_length(line: &str) -> Option<usize> {
    let line = line.trim_end();
    let open = line.rfind('{')?;
    let inner = line[open + 1..].strip_suffix('}')?;
    inner.trim_end_matches('+').parse().ok()
}

/// Scans for `UID <n>` in a FETCH attribute section.
fn scan_uid(section: &str) -> Option<u32> {
    let start = section.find("UID ")?;
    let rest = &section[start + 4..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Scans for `FLAGS (...)` in a FETCH attribute section.
fn scan_flags(section: &str) -> Option<Flags> {
    let start = section.find("FLAGS (")?;
    let rest = &section[start + 7..];
    let end = rest.find(')')?;
    Some(Flags::parse(&rest[..end]))
}

/// Returns the first line of a response as a string, without CRLF.
fn first_line(response: &[u8]) -> std::borrow::Cow<'_, str> {
    let end = response
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(response.len());
    String::from_utf8_lossy(&response[..end])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Flag;

    #[test]
    fn test_parse_tagged_ok() {
        let (status, text) = parse_tagged(b"A0001 OK LOGIN completed\r\n", "A0001").unwrap();
        assert_eq!(status, TaggedStatus::Ok);
        assert_eq!(text, "LOGIN completed");
    }

    #[test]
    fn test_parse_tagged_no() {
        let (status, _) = parse_tagged(b"A0002 NO [AUTHENTICATIONFAILED] nope\r\n", "A0002").unwrap();
        assert_eq!(status, TaggedStatus::No);
        assert!(require_ok(status, "nope".to_string()).is_err());
    }

    #[test]
    fn test_parse_tagged_wrong_tag() {
        assert!(parse_tagged(b"A0001 OK done\r\n", "A0002").is_none());
        assert!(parse_tagged(b"* OK untagged\r\n", "A0001").is_none());
    }

    #[test]
    fn test_parse_search() {
        assert_eq!(parse_search(b"* SEARCH 101 102 103\r\n").unwrap(), vec![101, 102, 103]);
        assert_eq!(parse_search(b"* SEARCH\r\n").unwrap(), Vec::<u32>::new());
        assert!(parse_search(b"* 3 EXISTS\r\n").is_none());
    }

    #[test]
    fn test_parse_exists() {
        assert_eq!(parse_exists(b"* 17 EXISTS\r\n").unwrap(), 17);
        assert!(parse_exists(b"* SEARCH 1\r\n").is_none());
    }

    #[test]
    fn test_parse_uid_validity() {
        let line = b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n";
        assert_eq!(parse_uid_validity(line).unwrap(), 3_857_529_045);
    }

    #[test]
    fn test_fold_mailbox_status() {
        let responses = vec![
            b"* 23 EXISTS\r\n".to_vec(),
            b"* OK [UIDVALIDITY 99] ok\r\n".to_vec(),
        ];
        let status = fold_mailbox_status(&responses);
        assert_eq!(status.exists, 23);
        assert_eq!(status.uid_validity, Some(99));
    }

    #[test]
    fn test_parse_fetch_with_literal() {
        let mut response = b"* 1 FETCH (UID 101 FLAGS (\\Seen) BODY[] {11}\r\n".to_vec();
        response.extend_from_slice(b"raw message");
        response.extend_from_slice(b")\r\n");

        let data = parse_fetch(&response).unwrap();
        assert_eq!(data.uid, Some(101));
        assert!(data.flags.contains(&Flag::Seen));
        assert_eq!(data.body.unwrap(), b"raw message");
    }

    #[test]
    fn test_parse_fetch_flags_after_literal() {
        let mut response = b"* 2 FETCH (UID 55 BODY[] {4}\r\n".to_vec();
        response.extend_from_slice(b"data");
        response.extend_from_slice(b" FLAGS (\\Flagged))\r\n");

        let data = parse_fetch(&response).unwrap();
        assert_eq!(data.uid, Some(55));
        assert!(data.flags.contains(&Flag::Flagged));
    }

    #[test]
    fn test_parse_fetch_truncated_literal() {
        let response = b"* 1 FETCH (UID 1 BODY[] {100}\r\nshort".to_vec();
        assert!(parse_fetch(&response).is_none());
    }

    #[test]
    fn test_parse_fetch_not_fetch() {
        assert!(parse_fetch(b"* 3 EXPUNGE\r\n").is_none());
    }
}
