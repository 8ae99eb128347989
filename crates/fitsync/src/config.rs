//! API credential loading
//!
//! The key itself is entered and validated elsewhere; this module only
//! finds it. Priority: JSON file in the fitsync config directory, then
//! the runtime environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Credentials filename in the fitsync config directory
const CREDENTIALS_FILE: &str = "api-credentials.json";
/// Environment variable holding the API key
const API_KEY_ENV: &str = "FITSYNC_API_KEY";

/// Opaque API key for the workout-tracking service.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
}

#[derive(Deserialize)]
struct CredentialFile {
    api_key: String,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Load credentials, preferring the config file over the environment.
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            let file: CredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Ok(Self {
                api_key: file.api_key,
            });
        }
        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file: CredentialFile = config::load_json_file(path)?;
        Ok(Self {
            api_key: file.api_key,
        })
    }

    /// Parse credentials from a JSON string (`{"api_key": "..."}`)
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Ok(Self {
            api_key: file.api_key,
        })
    }

    /// Load credentials from the environment
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .with_context(|| format!("{API_KEY_ENV} environment variable not set"))?;
        Ok(Self { api_key })
    }

    /// Get the default credentials file path
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    /// Check if credentials are available (file or environment)
    pub fn is_available() -> bool {
        config::config_exists(CREDENTIALS_FILE) || std::env::var(API_KEY_ENV).is_ok()
    }

    /// The service issues 36-character UUID keys; anything else is
    /// usually a paste error worth flagging before the first request.
    pub fn looks_valid(&self) -> bool {
        self.api_key.len() == 36
            && self
                .api_key
                .chars()
                .all(|c| c.is_ascii_hexdigit() || c == '-')
    }
}
