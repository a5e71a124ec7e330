//! Attachment metadata model.

use chrono::{DateTime, Utc};

/// Stored metadata for one message attachment.
///
/// The binary content lives on the filesystem under the attachment root;
/// `storage_path` is relative to that root. Rows are immutable once
/// written and removed only by cascading message deletion.
#[derive(Debug, Clone)]
pub struct AttachmentRecord {
    /// Unique identifier (None before insertion).
    pub id: Option<i64>,
    /// Owning message row id.
    pub email_id: i64,
    /// Sanitized filename used on disk.
    pub filename: String,
    /// Filename as transmitted, for display.
    pub original_filename: String,
    /// MIME type of the content.
    pub mime_type: String,
    /// Content size in bytes.
    pub size: u64,
    /// Path relative to the attachment root.
    pub storage_path: String,
    /// Content-ID for inline references, angle brackets stripped.
    pub content_id: Option<String>,
    /// Whether the part was declared inline.
    pub is_inline: bool,
    /// SHA-256 of the content, hex encoded.
    pub checksum_sha256: String,
    /// When the attachment was written.
    pub created_at: Option<DateTime<Utc>>,
}
