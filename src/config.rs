//! Configuration: project file, user settings and environment overrides.

pub mod settings;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::generation::GenerationParams;

pub use settings::Settings;

/// Project configuration file looked up in the repository root.
pub const CONFIG_FILE_NAME: &str = ".release-chain.yaml";

/// Overrides the backend endpoint.
pub const ENDPOINT_ENV: &str = "RELEASE_CHAIN_AI_ENDPOINT";
/// Overrides the backend model.
pub const MODEL_ENV: &str = "RELEASE_CHAIN_AI_MODEL";
/// Overrides the backend timeout, in seconds.
pub const TIMEOUT_ENV: &str = "RELEASE_CHAIN_AI_TIMEOUT";

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "codellama:7b";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_TOKENS: u32 = 2000;
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Text generation backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Whether to call the backend at all; templates are used when false.
    pub enabled: bool,
    /// Base URL of the Ollama-compatible endpoint.
    pub endpoint: String,
    /// Model name passed to the backend.
    pub model: String,
    /// Deadline for one backend call.
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GenerationConfig {
    /// Sampling parameters for backend calls.
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }

    /// Parses and checks the endpoint URL.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid backend endpoint: {}", self.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Invalid backend endpoint: {} (expected an http or https URL)",
                self.endpoint
            );
        }
        Ok(url)
    }

    /// Applies environment overrides, falling back to the settings file.
    pub fn apply_overrides(&mut self, settings: &Settings) -> Result<()> {
        if let Some(endpoint) = settings.get_env_var(ENDPOINT_ENV) {
            debug!(endpoint = %endpoint, "Backend endpoint overridden");
            self.endpoint = endpoint;
        }
        if let Some(model) = settings.get_env_var(MODEL_ENV) {
            debug!(model = %model, "Backend model overridden");
            self.model = model;
        }
        if let Some(timeout) = settings.get_env_var(TIMEOUT_ENV) {
            let secs: u64 = timeout
                .trim()
                .parse()
                .with_context(|| format!("{TIMEOUT_ENV} must be a whole number of seconds, got {timeout:?}"))?;
            self.timeout = Duration::from_secs(secs);
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Git side effects of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Commit version and release files after a release.
    pub auto_commit: bool,
    /// Tag the release commit.
    pub auto_tag: bool,
    /// Append `Refs #N` to commit messages on issue branches.
    pub include_issue_link: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            auto_commit: true,
            auto_tag: true,
            include_issue_link: true,
        }
    }
}

/// Release file locations, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Release notes, overwritten on every release.
    pub release_notes: PathBuf,
    /// Changelog, prepended on every release.
    pub changelog: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            release_notes: PathBuf::from("release-notes.md"),
            changelog: PathBuf::from("CHANGELOG.md"),
        }
    }
}

/// Contents of `.release-chain.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseChainConfig {
    /// Backend settings.
    pub ai: GenerationConfig,
    /// Commit and tag behaviour.
    pub git: GitConfig,
    /// Release file locations.
    pub files: FilesConfig,
}

impl ReleaseChainConfig {
    /// Loads a configuration file. A missing file yields defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parses YAML configuration text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Loads the file at `path` (or `.release-chain.yaml` under `repo_root`),
    /// then applies environment overrides and validates the endpoint.
    pub fn resolve(repo_root: &Path, path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(|| repo_root.join(CONFIG_FILE_NAME), Path::to_path_buf);
        let mut config = Self::load_from_path(&path)?;

        let settings = Settings::load().unwrap_or_else(|e| {
            debug!("Ignoring unreadable settings file: {e:#}");
            Settings::default()
        });
        config.ai.apply_overrides(&settings)?;
        config.ai.endpoint_url()?;

        Ok(config)
    }
}
