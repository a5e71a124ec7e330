//! Service configuration.
//!
//! Loaded from a TOML file with environment overrides. The master secret
//! is usually supplied through `MAILSIFT_MASTER_SECRET` rather than the
//! file.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{Error, Result};

/// Environment variable naming the config file.
const CONFIG_ENV: &str = "MAILSIFT_CONFIG";

/// Environment override for the master secret.
const MASTER_SECRET_ENV: &str = "MAILSIFT_MASTER_SECRET";

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the SQLite database file.
    pub database_path: String,
    /// Root directory for attachment content.
    pub attachment_root: PathBuf,
    /// Master secret the credential vault derives its key from.
    pub master_secret: String,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailsift");
        Self {
            database_path: data_dir.join("mailsift.db").to_string_lossy().into_owned(),
            attachment_root: data_dir.join("attachments"),
            master_secret: String::new(),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from disk and environment.
    ///
    /// Reads the file named by `MAILSIFT_CONFIG` (or
    /// `<config_dir>/mailsift/config.toml`), falling back to defaults when
    /// no file exists, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when a config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).map_or_else(
            |_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mailsift")
                    .join("config.toml")
            },
            PathBuf::from,
        );

        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            Self::from_toml(&text)?
        } else {
            Self::default()
        };

        if let Ok(secret) = std::env::var(MASTER_SECRET_ENV) {
            config.master_secret = secret;
        }

        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("invalid config file: {e}")))
    }

    /// Checks the fields a running daemon cannot do without.
    ///
    /// # Errors
    ///
    /// Returns an error when the master secret is missing.
    pub fn validate(&self) -> Result<()> {
        if self.master_secret.is_empty() {
            return Err(Error::Config(format!(
                "master secret is not set; provide it via {MASTER_SECRET_ENV} or the config file"
            )));
        }
        Ok(())
    }
}
