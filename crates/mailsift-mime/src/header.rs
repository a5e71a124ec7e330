//! MIME header handling.

use crate::encoding::decode_header_value;
use std::collections::HashMap;
use std::fmt;

/// Collection of email headers.
///
/// Header names are case-insensitive; lookups are normalized to lowercase.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
    /// Names in first-seen order, for raw reconstruction.
    order: Vec<String>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        if !self.headers.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.headers.entry(name).or_default().push(value.into());
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets the first value for a header with RFC 2047 encoded words decoded.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_header_value)
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().flat_map(|name| {
            self.headers
                .get(name)
                .into_iter()
                .flatten()
                .map(move |v| (name.as_str(), v.as_str()))
        })
    }

    /// Reconstructs the raw header block, one `Name: value` line per entry.
    ///
    /// Used by rule evaluation against the whole header block.
    #[must_use]
    pub fn to_raw(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.iter() {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Parses headers from raw text.
    ///
    /// Continuation lines (starting with space or tab) are unfolded into the
    /// preceding header. Parsing is lenient: lines without a colon are
    /// skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current_name: Option<String> = None;
        let mut current_value = String::new();

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if current_name.is_some() {
                    current_value.push(' ');
                    current_value.push_str(line.trim());
                }
                continue;
            }

            if let Some(name) = current_name.take() {
                headers.add(name, current_value.trim().to_string());
                current_value.clear();
            }

            if let Some((name, value)) = line.split_once(':') {
                current_name = Some(name.trim().to_string());
                current_value = value.trim().to_string();
            }
        }

        if let Some(name) = current_name {
            headers.add(name, current_value.trim().to_string());
        }

        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let headers = Headers::parse("From: a@b.com\r\nSubject: Test\r\n");
        assert_eq!(headers.get("from"), Some("a@b.com"));
        assert_eq!(headers.get("Subject"), Some("Test"));
    }

    #[test]
    fn test_parse_continuation() {
        let headers = Headers::parse("Subject: long\r\n subject line\r\n");
        assert_eq!(headers.get("subject"), Some("long subject line"));
    }

    #[test]
    fn test_parse_stops_at_blank_line() {
        let headers = Headers::parse("From: a@b.com\r\n\r\nNot-A-Header: body\r\n");
        assert_eq!(headers.get("from"), Some("a@b.com"));
        assert!(headers.get("not-a-header").is_none());
    }

    #[test]
    fn test_multiple_values() {
        let mut headers = Headers::new();
        headers.add("Received", "one");
        headers.add("Received", "two");
        assert_eq!(headers.get_all("received"), vec!["one", "two"]);
        assert_eq!(headers.get("received"), Some("one"));
    }

    #[test]
    fn test_get_decoded() {
        let headers = Headers::parse("Subject: =?utf-8?B?SMOpbGxv?=\r\n");
        assert_eq!(headers.get_decoded("subject").unwrap(), "Héllo");
    }

    #[test]
    fn test_to_raw_preserves_order() {
        let headers = Headers::parse("From: a@b.com\r\nTo: c@d.com\r\n");
        let raw = headers.to_raw();
        assert!(raw.find("from:").unwrap() < raw.find("to:").unwrap());
    }
}
