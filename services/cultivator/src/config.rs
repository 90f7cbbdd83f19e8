//! Configuration document
//!
//! A flat YAML mapping read once at startup and handed to each component's
//! constructor.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;

/// Config file read when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Public GitHub REST endpoint.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Options controlling a cultivator run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of all repository mirrors (`<cache_dir>/<owner>/<repo>`).
    pub cache_dir: PathBuf,
    /// GitHub App ID.
    pub integration_id: u64,
    /// PEM-encoded RSA private key of the App.
    pub private_key_file: PathBuf,
    /// Check executables, run in listed order.
    pub checks: Vec<String>,
    /// GitHub REST base URL (GitHub Enterprise or a test server).
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
    /// Git executable used for every mirror operation.
    #[serde(default = "default_git_binary")]
    pub git_binary: PathBuf,
    /// Commit author name; derived from the App slug when unset.
    #[serde(default)]
    pub committer_name: Option<String>,
    /// Commit author email; derived from the App slug when unset.
    #[serde(default)]
    pub committer_email: Option<String>,
}

fn default_github_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}

impl Config {
    /// Read, parse and validate the config file at `path`.
    ///
    /// Relative `cache_dir` and `private_key_file` entries are resolved
    /// against the directory holding the config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading config");

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            config.cache_dir = resolve(base, &config.cache_dir);
            config.private_key_file = resolve(base, &config.private_key_file);
        }

        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;

        Ok(config)
    }

    /// Parse a config document without touching the filesystem.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    fn validate(&self) -> Result<(), String> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache_dir must not be empty".to_string());
        }
        if self.private_key_file.as_os_str().is_empty() {
            return Err("private_key_file must not be empty".to_string());
        }
        if self.integration_id == 0 {
            return Err("integration_id must be a GitHub App ID".to_string());
        }
        if let Some(pos) = self.checks.iter().position(|c| c.trim().is_empty()) {
            return Err(format!("checks[{pos}] is empty"));
        }
        if self.github_api_url.trim().is_empty() {
            return Err("github_api_url must not be empty".to_string());
        }
        Ok(())
    }

    /// Mirror location for a repository full name (`owner/name`).
    pub fn mirror_path(&self, full_name: &str) -> PathBuf {
        full_name
            .split('/')
            .fold(self.cache_dir.clone(), |path, part| path.join(part))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() && !path.as_os_str().is_empty() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
