//! Email address parsing.
//!
//! Parses address headers of the forms `addr@example.com`,
//! `Name <addr@example.com>`, `"Quoted, Name" <addr@example.com>` and
//! comma-separated lists thereof.

use crate::encoding::decode_header_value;

/// Mailbox (optional display name + address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, RFC 2047 decoded.
    pub name: Option<String>,
    /// Email address.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox with just an address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Returns the domain part of the address, lowercased.
    #[must_use]
    pub fn domain(&self) -> Option<String> {
        self.address
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase())
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Parses a single mailbox from a header fragment.
///
/// Returns `None` for fragments with no address-like content.
#[must_use]
pub fn parse_mailbox(fragment: &str) -> Option<Mailbox> {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return None;
    }

    if let Some(open) = fragment.rfind('<') {
        let close = fragment[open..].find('>').map(|i| open + i)?;
        let address = fragment[open + 1..close].trim().to_string();
        if address.is_empty() {
            return None;
        }

        let name_part = fragment[..open].trim().trim_matches('"').trim();
        let name = if name_part.is_empty() {
            None
        } else {
            Some(decode_header_value(name_part))
        };

        return Some(Mailbox {
            name,
            address: address.to_lowercase(),
        });
    }

    // Bare address form.
    if fragment.contains('@') {
        return Some(Mailbox::new(fragment.to_lowercase()));
    }

    None
}

/// Parses a comma-separated address list header value.
///
/// Commas inside quoted display names and inside angle brackets do not
/// split entries. Fragments that don't contain an address are dropped.
#[must_use]
pub fn parse_address_list(value: &str) -> Vec<Mailbox> {
    split_addresses(value)
        .iter()
        .filter_map(|fragment| parse_mailbox(fragment))
        .collect()
}

/// Splits an address list on commas, honoring quotes and angle brackets.
fn split_addresses(value: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_brackets = false;

    for c in value.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '<' if !in_quotes => {
                in_brackets = true;
                current.push(c);
            }
            '>' if !in_quotes => {
                in_brackets = false;
                current.push(c);
            }
            ',' if !in_quotes && !in_brackets => {
                fragments.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        fragments.push(current);
    }

    fragments
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_address() {
        let mb = parse_mailbox("user@example.com").unwrap();
        assert!(mb.name.is_none());
        assert_eq!(mb.address, "user@example.com");
    }

    #[test]
    fn test_named_address() {
        let mb = parse_mailbox("Ivan Petrov <ivan@bigclient.ru>").unwrap();
        assert_eq!(mb.name.as_deref(), Some("Ivan Petrov"));
        assert_eq!(mb.address, "ivan@bigclient.ru");
    }

    #[test]
    fn test_quoted_name_with_comma() {
        let list = parse_address_list("\"Petrov, Ivan\" <ivan@example.com>");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name.as_deref(), Some("Petrov, Ivan"));
    }

    #[test]
    fn test_encoded_name() {
        let mb = parse_mailbox("=?utf-8?B?0JjQstCw0L0=?= <ivan@example.com>").unwrap();
        assert_eq!(mb.name.as_deref(), Some("Иван"));
    }

    #[test]
    fn test_address_lowercased() {
        let mb = parse_mailbox("Ivan <IVAN@Example.COM>").unwrap();
        assert_eq!(mb.address, "ivan@example.com");
    }

    #[test]
    fn test_list() {
        let list = parse_address_list("a@x.com, B <b@y.com>,c@z.com");
        assert_eq!(list.len(), 3);
        assert_eq!(list[1].address, "b@y.com");
    }

    #[test]
    fn test_garbage_dropped() {
        assert!(parse_address_list("undisclosed-recipients:;").is_empty());
        assert!(parse_mailbox("").is_none());
    }

    #[test]
    fn test_domain() {
        let mb = parse_mailbox("ivan@BigClient.RU").unwrap();
        assert_eq!(mb.domain().unwrap(), "bigclient.ru");
    }
}
