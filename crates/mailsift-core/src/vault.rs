//! Credential vault.
//!
//! Mailbox passwords are stored encrypted with AES-256-GCM. The cipher key
//! is derived by hashing an operator-supplied master secret with SHA-256,
//! so the secret itself is never held beyond construction and plaintext
//! credentials are never persisted. Ciphertext is transported as
//! `base64(nonce || ciphertext)`.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Nonce size for AES-GCM (96 bits).
const NONCE_SIZE: usize = 12;

/// Errors that can occur in vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encrypt(String),

    /// Decryption failed (wrong key or corrupted ciphertext).
    #[error("Decryption failed: {0}")]
    Decrypt(String),

    /// Ciphertext is not valid base64 or is too short.
    #[error("Invalid ciphertext format: {0}")]
    InvalidFormat(String),
}

/// Result type for vault operations.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

/// Symmetric cipher for credentials at rest.
pub struct Vault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").finish_non_exhaustive()
    }
}

impl Vault {
    /// Creates a vault keyed from the master secret.
    #[must_use]
    pub fn new(master_secret: &str) -> Self {
        let key: [u8; 32] = Sha256::digest(master_secret.as_bytes()).into();
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    /// Encrypts a plaintext credential.
    ///
    /// Each call uses a fresh random nonce, so encrypting the same
    /// plaintext twice yields different ciphertexts.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails or the plaintext is empty.
    pub fn encrypt(&self, plaintext: &str) -> VaultResult<String> {
        if plaintext.is_empty() {
            return Err(VaultError::Encrypt("empty plaintext".to_string()));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::Encrypt(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypts a credential produced by [`Vault::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns an error on malformed input or AEAD verification failure
    /// (wrong master secret, tampered ciphertext).
    pub fn decrypt(&self, encrypted: &str) -> VaultResult<String> {
        let combined = BASE64
            .decode(encrypted)
            .map_err(|e| VaultError::InvalidFormat(format!("invalid base64: {e}")))?;

        if combined.len() <= NONCE_SIZE {
            return Err(VaultError::InvalidFormat(format!(
                "ciphertext too short: {} bytes",
                combined.len()
            )));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| VaultError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| VaultError::Decrypt(format!("plaintext is not UTF-8: {e}")))
    }
}
