//! Classification rule data models.

use chrono::{DateTime, Utc};
use tracing::warn;

/// How a rule pattern is compared against a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Field equals the pattern.
    Exact,
    /// Field contains the pattern.
    #[default]
    Contains,
    /// Field starts with the pattern.
    StartsWith,
    /// Field ends with the pattern.
    EndsWith,
    /// Pattern is a regular expression.
    Regex,
}

impl MatchMode {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "exact" => Self::Exact,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "regex" => Self::Regex,
            _ => Self::Contains,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
        }
    }
}

/// Which message field a rule evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleType {
    /// Domain extracted from the from-address.
    Domain,
    /// Subject text.
    #[default]
    SubjectKeyword,
    /// Plain-text body.
    BodyKeyword,
    /// Raw header block.
    Header,
    /// Full from-address.
    FromPattern,
    /// First match among from-address, subject, and domain.
    Combined,
}

impl RuleType {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "domain" => Self::Domain,
            "body_keyword" => Self::BodyKeyword,
            "header" => Self::Header,
            "from_pattern" => Self::FromPattern,
            "combined" => Self::Combined,
            _ => Self::SubjectKeyword,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::SubjectKeyword => "subject_keyword",
            Self::BodyKeyword => "body_keyword",
            Self::Header => "header",
            Self::FromPattern => "from_pattern",
            Self::Combined => "combined",
        }
    }
}

/// Message fields a rule set is evaluated against.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailFields<'a> {
    /// Sender address.
    pub from: &'a str,
    /// Decoded subject.
    pub subject: &'a str,
    /// Plain-text body.
    pub body: &'a str,
    /// Raw header block.
    pub headers: &'a str,
}

impl EmailFields<'_> {
    /// Domain part of the from-address, lowercased.
    #[must_use]
    pub fn domain(&self) -> Option<String> {
        self.from
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase())
    }
}

/// An administrator-defined classification rule.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    /// Unique identifier (None for unsaved rules).
    pub id: Option<i64>,
    /// Pattern to compare against the field.
    pub pattern: String,
    /// How the pattern is compared.
    pub match_mode: MatchMode,
    /// Which field is evaluated.
    pub rule_type: RuleType,
    /// Label assigned on match (e.g. "direct_request", "platform_tender").
    pub label: String,
    /// Confidence assigned on match, 0.0..=1.0.
    pub confidence: f64,
    /// Evaluation priority; higher evaluates first.
    pub priority: i32,
    /// Whether the rule participates in classification.
    pub active: bool,
    /// How many messages this rule has classified.
    pub times_matched: i64,
    /// When this rule last matched.
    pub last_matched_at: Option<DateTime<Utc>>,
}

impl ClassificationRule {
    /// Create a rule with the given essentials and default bookkeeping.
    #[must_use]
    pub fn new(rule_type: RuleType, match_mode: MatchMode, pattern: &str, label: &str) -> Self {
        Self {
            id: None,
            pattern: pattern.to_string(),
            match_mode,
            rule_type,
            label: label.to_string(),
            confidence: 0.8,
            priority: 0,
            active: true,
            times_matched: 0,
            last_matched_at: None,
        }
    }

    /// Evaluate this rule against message fields.
    #[must_use]
    pub fn matches(&self, fields: &EmailFields<'_>) -> bool {
        match self.rule_type {
            RuleType::Domain => fields
                .domain()
                .is_some_and(|domain| self.pattern_matches(&domain)),
            RuleType::SubjectKeyword => self.pattern_matches(fields.subject),
            RuleType::BodyKeyword => self.pattern_matches(fields.body),
            RuleType::Header => self.pattern_matches(fields.headers),
            RuleType::FromPattern => self.pattern_matches(fields.from),
            RuleType::Combined => {
                self.pattern_matches(fields.from)
                    || self.pattern_matches(fields.subject)
                    || fields
                        .domain()
                        .is_some_and(|domain| self.pattern_matches(&domain))
            }
        }
    }

    /// Compare the pattern against one field value.
    ///
    /// All modes except `Regex` are case-insensitive. An invalid regex
    /// never matches.
    fn pattern_matches(&self, value: &str) -> bool {
        if let MatchMode::Regex = self.match_mode {
            return match regex::Regex::new(&self.pattern) {
                Ok(re) => re.is_match(value),
                Err(e) => {
                    warn!(pattern = %self.pattern, "invalid rule regex: {e}");
                    false
                }
            };
        }

        let value = value.to_lowercase();
        let pattern = self.pattern.to_lowercase();
        match self.match_mode {
            MatchMode::Exact => value == pattern,
            MatchMode::Contains => value.contains(&pattern),
            MatchMode::StartsWith => value.starts_with(&pattern),
            MatchMode::EndsWith => value.ends_with(&pattern),
            MatchMode::Regex => unreachable!(),
        }
    }
}

/// Result of classifying a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Assigned label.
    pub label: String,
    /// Confidence of the assignment.
    pub confidence: f64,
    /// Rule that produced the label, if any.
    pub rule_id: Option<i64>,
}

impl Classification {
    /// Label used when no rule matches.
    pub const UNKNOWN: &'static str = "unknown";

    /// The no-match classification.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            label: Self::UNKNOWN.to_string(),
            confidence: 0.0,
            rule_id: None,
        }
    }
}
