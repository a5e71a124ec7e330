//! Persisted message model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::classify::Classification;

/// One envelope participant: display name plus address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name, if transmitted.
    pub name: Option<String>,
    /// Email address, lowercased.
    pub address: String,
}

impl From<&mailsift_mime::Mailbox> for EmailAddress {
    fn from(mailbox: &mailsift_mime::Mailbox) -> Self {
        Self {
            name: mailbox.name.clone(),
            address: mailbox.address.clone(),
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Received by a monitored mailbox.
    #[default]
    Inbound,
    /// Sent from a monitored mailbox.
    Outbound,
}

impl Direction {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "outbound" => Self::Outbound,
            _ => Self::Inbound,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// A persisted mail message.
///
/// One row per unique protocol Message-ID. Re-ingestion of an existing
/// Message-ID updates only protocol flags, never bodies or classification.
#[derive(Debug, Clone, Default)]
pub struct Email {
    /// Unique identifier (None before insertion).
    pub id: Option<i64>,
    /// Owning account.
    pub account_id: AccountId,
    /// Message direction.
    pub direction: Direction,
    /// Protocol Message-ID, angle brackets stripped.
    pub message_id: Option<String>,
    /// Stable identifier grouping a message with its replies.
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
    /// Plain-text body.
    pub body_text: String,
    /// Sanitized HTML body.
    pub body_html: Option<String>,
    /// HTML body as transmitted, retained for audit.
    pub body_html_raw: Option<String>,
    /// Short plain-text preview for list views.
    pub snippet: String,
    /// Assigned classification label.
    pub classification: String,
    /// Confidence of the classification.
    pub classification_confidence: f64,
    /// Rule that produced the classification, if any.
    pub classified_by_rule: Option<i64>,
    /// Protocol UID within the folder.
    pub uid: u32,
    /// Folder the message was fetched from.
    pub folder: String,
    /// Protocol flags as transmitted.
    pub flags: Vec<String>,
    /// Read flag (user-mutable after ingestion).
    pub is_read: bool,
    /// Starred flag.
    pub is_starred: bool,
    /// Archived flag.
    pub is_archived: bool,
    /// Soft-deleted flag.
    pub is_deleted: bool,
    /// Number of stored attachments.
    pub attachment_count: u32,
    /// Date header of the message.
    pub date: Option<DateTime<Utc>>,
}

impl Email {
    /// Applies a classification result.
    pub fn set_classification(&mut self, classification: &Classification) {
        self.classification = classification.label.clone();
        self.classification_confidence = classification.confidence;
        self.classified_by_rule = classification.rule_id;
    }
}

/// Default page size for message listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Filter for message listings.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    /// Restrict to one account.
    pub account_id: Option<AccountId>,
    /// Restrict to one folder.
    pub folder: Option<String>,
    /// Restrict to one classification label.
    pub classification: Option<String>,
    /// Restrict by read state.
    pub is_read: Option<bool>,
    /// Restrict by starred state.
    pub is_starred: Option<bool>,
    /// Restrict by archived state.
    pub is_archived: Option<bool>,
    /// Include soft-deleted messages.
    pub include_deleted: bool,
    /// Case-insensitive substring over subject and sender.
    pub search: Option<String>,
    /// Page size.
    pub limit: u32,
    /// Page offset.
    pub offset: u32,
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self {
            account_id: None,
            folder: None,
            classification: None,
            is_read: None,
            is_starred: None,
            is_archived: None,
            include_deleted: false,
            search: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// Partial update of user-facing message flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagPatch {
    /// New read state.
    pub is_read: Option<bool>,
    /// New starred state.
    pub is_starred: Option<bool>,
    /// New archived state.
    pub is_archived: Option<bool>,
    /// New soft-deleted state.
    pub is_deleted: Option<bool>,
}

impl FlagPatch {
    /// True when the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.is_read.is_none()
            && self.is_starred.is_none()
            && self.is_archived.is_none()
            && self.is_deleted.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_roundtrip() {
        for direction in [Direction::Inbound, Direction::Outbound] {
            assert_eq!(Direction::parse(direction.as_str()), direction);
        }
    }

    #[test]
    fn test_email_address_display() {
        let with_name = EmailAddress {
            name: Some("Ivan".to_string()),
            address: "ivan@x.ru".to_string(),
        };
        assert_eq!(with_name.to_string(), "Ivan <ivan@x.ru>");

        let bare = EmailAddress {
            name: None,
            address: "ivan@x.ru".to_string(),
        };
        assert_eq!(bare.to_string(), "ivan@x.ru");
    }

    #[test]
    fn test_flag_patch_empty() {
        assert!(FlagPatch::default().is_empty());
        assert!(
            !FlagPatch {
                is_read: Some(true),
                ..Default::default()
            }
            .is_empty()
        );
    }

    #[test]
    fn test_set_classification() {
        let mut email = Email::default();
        email.set_classification(&Classification {
            label: "direct_request".to_string(),
            confidence: 0.9,
            rule_id: Some(3),
        });
        assert_eq!(email.classification, "direct_request");
        assert_eq!(email.classified_by_rule, Some(3));
    }
}
