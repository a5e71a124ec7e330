//! Core IMAP types used by the sync engine.

/// A message flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Message recently arrived.
    Recent,
    /// Any other flag or keyword.
    Custom(String),
}

impl Flag {
    /// Parses a flag from its wire form (e.g. `\Seen`).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "\\Seen" => Self::Seen,
            "\\Answered" => Self::Answered,
            "\\Flagged" => Self::Flagged,
            "\\Deleted" => Self::Deleted,
            "\\Draft" => Self::Draft,
            "\\Recent" => Self::Recent,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Returns the wire form of the flag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Custom(s) => s,
        }
    }
}

/// An ordered set of message flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags(pub Vec<Flag>);

impl Flags {
    /// Parses the contents of a parenthesized flag list.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self(list.split_whitespace().map(Flag::parse).collect())
    }

    /// Checks whether a flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.0.contains(flag)
    }

    /// Returns the wire forms of all flags.
    #[must_use]
    pub fn as_strings(&self) -> Vec<String> {
        self.0.iter().map(|f| f.as_str().to_string()).collect()
    }
}

/// Status of a selected mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// UIDVALIDITY of the mailbox, if reported.
    pub uid_validity: Option<u32>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_roundtrip() {
        for flag in [Flag::Seen, Flag::Answered, Flag::Flagged, Flag::Deleted] {
            assert_eq!(Flag::parse(flag.as_str()), flag);
        }
    }

    #[test]
    fn test_custom_flag() {
        let flag = Flag::parse("$Important");
        assert_eq!(flag, Flag::Custom("$Important".to_string()));
        assert_eq!(flag.as_str(), "$Important");
    }

    #[test]
    fn test_flags_parse() {
        let flags = Flags::parse("\\Seen \\Flagged $Label");
        assert!(flags.contains(&Flag::Seen));
        assert!(flags.contains(&Flag::Flagged));
        assert!(!flags.contains(&Flag::Deleted));
        assert_eq!(flags.as_strings(), vec!["\\Seen", "\\Flagged", "$Label"]);
    }
}
