//! User settings read from `$HOME/.release-chain/settings.json`.
//!
//! The file supplies fallback values for environment variables, so a user
//! can pin a backend endpoint once instead of exporting it in every shell.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Settings loaded from `$HOME/.release-chain/settings.json`.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Environment variable fallbacks.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Settings {
    /// Loads settings from the default location.
    pub fn load() -> Result<Self> {
        let settings_path = Self::settings_path()?;
        Self::load_from_path(&settings_path)
    }

    /// Loads settings from a specific path. A missing file yields empty settings.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        serde_json::from_str::<Self>(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Returns the default settings path.
    pub fn settings_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

        Ok(home_dir.join(".release-chain").join("settings.json"))
    }

    /// Returns an environment variable, falling back to the settings file.
    pub fn get_env_var(&self, key: &str) -> Option<String> {
        env::var(key)
            .ok()
            .or_else(|| self.env.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn load_from_path() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_settings(
            &dir,
            r#"{ "env": { "RELEASE_CHAIN_AI_MODEL": "llama3:8b" } }"#,
        );

        let settings = Settings::load_from_path(&path)?;
        assert_eq!(
            settings.env.get("RELEASE_CHAIN_AI_MODEL").map(String::as_str),
            Some("llama3:8b")
        );
        Ok(())
    }

    #[test]
    fn missing_file_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let settings = Settings::load_from_path(dir.path().join("absent.json"))?;
        assert!(settings.env.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_file_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_settings(&dir, "{ not json");
        let err = Settings::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings file"));
        Ok(())
    }

    #[test]
    fn environment_takes_precedence() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_settings(
            &dir,
            r#"{ "env": { "RC_SETTINGS_TEST_VAR": "from_file" } }"#,
        );
        let settings = Settings::load_from_path(&path)?;

        env::set_var("RC_SETTINGS_TEST_VAR", "from_env");
        assert_eq!(
            settings.get_env_var("RC_SETTINGS_TEST_VAR").as_deref(),
            Some("from_env")
        );

        env::remove_var("RC_SETTINGS_TEST_VAR");
        assert_eq!(
            settings.get_env_var("RC_SETTINGS_TEST_VAR").as_deref(),
            Some("from_file")
        );
        assert!(settings.get_env_var("RC_SETTINGS_TEST_UNSET").is_none());
        Ok(())
    }
}
