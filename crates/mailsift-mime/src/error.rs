//! Error types for MIME parsing.

use thiserror::Error;

/// Errors that can occur while parsing MIME messages.
#[derive(Debug, Error)]
pub enum Error {
    /// Message could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Content-Type header is malformed.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Transfer encoding is malformed or unsupported.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decoding failed.
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes are not valid UTF-8.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
