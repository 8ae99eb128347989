//! Configuration loading for fitsync
//!
//! Provides utilities for reading and writing files in the shared fitsync
//! config directory (~/.config/fitsync/). The core crate uses this for API
//! credentials and for the default location of durable sync state.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Get the fitsync config directory (~/.config/fitsync/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("fitsync"))
}

/// Get the path to a file within the fitsync config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Check if a file exists in the fitsync config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the fitsync config directory exists, creating it if needed
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Load and parse a JSON file from the fitsync config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Save a value as pretty-printed JSON in the fitsync config directory
pub fn save_json<T: serde::Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = ensure_config_dir()?;
    let path = dir.join(filename);
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("fitsync"));
    }

    #[test]
    fn test_config_path() {
        let path = config_path("credentials.json");
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("fitsync/credentials.json"));
    }
}
