//! Attachment file store.
//!
//! Attachment bytes are written under a configurable root, one directory
//! per message partitioned as `YYYY-MM-DD/<uuid>/`, so colliding filenames
//! from different messages never meet. Filenames are reduced to a safe
//! character set before writing; a SHA-256 checksum is recorded for
//! integrity verification (checksums do not deduplicate storage).

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::Result;

/// Fallback name for attachments with no usable filename.
const FALLBACK_FILENAME: &str = "attachment.bin";

/// Writes attachment content to the partitioned directory tree.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

/// A written attachment: where it landed and what it hashed to.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Sanitized filename used on disk.
    pub filename: String,
    /// Path relative to the store root.
    pub relative_path: String,
    /// Content size in bytes.
    pub size: u64,
    /// SHA-256 of the content, hex encoded.
    pub checksum_sha256: String,
}

impl AttachmentStore {
    /// Creates a store rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocates a fresh directory for one message's attachments,
    /// partitioned by date then a random identifier.
    ///
    /// Returns the path relative to the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn allocate_message_dir(&self) -> Result<String> {
        let relative = format!("{}/{}", Utc::now().format("%Y-%m-%d"), Uuid::new_v4());
        fs::create_dir_all(self.root.join(&relative)).await?;
        Ok(relative)
    }

    /// Writes one attachment into a previously allocated message directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write(
        &self,
        message_dir: &str,
        original_filename: Option<&str>,
        content: &[u8],
    ) -> Result<StoredFile> {
        let filename = sanitize_filename(original_filename);
        let relative_path = format!("{message_dir}/{filename}");

        fs::write(self.root.join(&relative_path), content).await?;

        let checksum = hex_digest(content);
        debug!(path = %relative_path, size = content.len(), "stored attachment");

        Ok(StoredFile {
            filename,
            relative_path,
            size: content.len() as u64,
            checksum_sha256: checksum,
        })
    }

    /// Reads attachment content back by its relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn read(&self, relative_path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.root.join(relative_path)).await?)
    }

    /// Verifies stored content against its recorded checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn verify(&self, relative_path: &str, checksum_sha256: &str) -> Result<bool> {
        let content = self.read(relative_path).await?;
        Ok(hex_digest(&content) == checksum_sha256)
    }
}

/// Reduces a filename to `[A-Za-z0-9._-]`, defending against path
/// traversal and filesystem-hostile names.
fn sanitize_filename(original: Option<&str>) -> String {
    let Some(original) = original else {
        return FALLBACK_FILENAME.to_string();
    };

    // Drop any path components the sender smuggled in.
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);

    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = sanitized.trim_matches(['.', '_']).to_string();
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed
    }
}

/// Hex-encoded SHA-256 of content.
fn hex_digest(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write as _;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain() {
        assert_eq!(sanitize_filename(Some("report.pdf")), "report.pdf");
        // Non-ASCII maps to underscores, which are then trimmed from the ends.
        assert_eq!(sanitize_filename(Some("Смета 2025.xlsx")), "2025.xlsx");
        assert_eq!(sanitize_filename(Some("счет на оплату.pdf")), "pdf");
    }

    #[test]
    fn test_sanitize_path_traversal() {
        assert_eq!(sanitize_filename(Some("../../etc/passwd")), "passwd");
        assert_eq!(sanitize_filename(Some("..\\..\\boot.ini")), "boot.ini");
    }

    #[test]
    fn test_sanitize_degenerate() {
        assert_eq!(sanitize_filename(Some("...")), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(Some("")), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(None), FALLBACK_FILENAME);
    }

    #[test]
    fn test_hex_digest_known_value() {
        // SHA-256 of the empty string.
        assert_eq!(
            hex_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path());

        let message_dir = store.allocate_message_dir().await.unwrap();
        let stored = store
            .write(&message_dir, Some("offer.pdf"), b"%PDF-1.4 content")
            .await
            .unwrap();

        assert_eq!(stored.filename, "offer.pdf");
        assert_eq!(stored.size, 16);
        assert!(stored.relative_path.ends_with("/offer.pdf"));

        let content = store.read(&stored.relative_path).await.unwrap();
        assert_eq!(content, b"%PDF-1.4 content");
        assert!(store
            .verify(&stored.relative_path, &stored.checksum_sha256)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_same_filename_different_messages() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path());

        let first_dir = store.allocate_message_dir().await.unwrap();
        let second_dir = store.allocate_message_dir().await.unwrap();
        assert_ne!(first_dir, second_dir);

        let first = store.write(&first_dir, Some("a.txt"), b"one").await.unwrap();
        let second = store.write(&second_dir, Some("a.txt"), b"two").await.unwrap();

        assert_eq!(store.read(&first.relative_path).await.unwrap(), b"one");
        assert_eq!(store.read(&second.relative_path).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_verify_detects_tamper() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path());

        let message_dir = store.allocate_message_dir().await.unwrap();
        let stored = store.write(&message_dir, Some("a.txt"), b"data").await.unwrap();

        tokio::fs::write(dir.path().join(&stored.relative_path), b"tampered")
            .await
            .unwrap();
        assert!(!store
            .verify(&stored.relative_path, &stored.checksum_sha256)
            .await
            .unwrap());
    }
}
