//! Error types for cultivator.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors raised while loading or validating the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML or is missing required keys.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A key parsed but holds an unusable value.
    #[error("invalid config at {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Errors that can occur while running checks against the fleet.
#[derive(Debug, Error)]
pub enum CultivatorError {
    /// Missing or unusable configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Private key could not be loaded or a JWT could not be signed.
    #[error("GitHub App authentication failed: {0}")]
    Auth(String),

    /// An installation access token could not be minted.
    #[error("failed to mint token for installation {installation_id}: {source}")]
    InstallationToken {
        installation_id: u64,
        #[source]
        source: Box<CultivatorError>,
    },

    /// GitHub answered with a non-success status.
    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Network-level error during HTTP communication.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A git invocation exited unsuccessfully or could not be spawned.
    #[error("git {command} failed: {detail}")]
    Git { command: String, detail: String },

    /// A check process could not be spawned or exited non-zero.
    #[error("check {check} failed ({status}): {stderr}")]
    CheckFailed {
        check: String,
        status: String,
        stderr: String,
    },

    /// A check exited zero but its stdout was not a Change document.
    #[error("check {check} produced invalid output: {source}")]
    CheckOutput {
        check: String,
        #[source]
        source: serde_json::Error,
    },

    /// A check produced a Change that cannot be reconciled.
    #[error("check {check} produced an unusable change: {reason}")]
    InvalidChange { check: String, reason: String },

    /// More than one open pull request exists for a single head ref.
    #[error("found {count} open pull requests for {head}, refusing to proceed")]
    DuplicatePullRequests { head: String, count: usize },

    /// A `--keep-going` run finished with some targets failed.
    #[error("{failed} target run(s) failed")]
    TargetsFailed { failed: usize },

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = CultivatorError> = std::result::Result<T, E>;

impl CultivatorError {
    /// Create an API error from status code and message.
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a git error for the given subcommand.
    pub fn git(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Git {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Wrap a failed token exchange; signing failures stay `Auth`.
    pub(crate) fn token_mint(installation_id: u64, source: CultivatorError) -> Self {
        match source {
            Self::Auth(_) => source,
            source => Self::InstallationToken {
                installation_id,
                source: Box::new(source),
            },
        }
    }

    pub(crate) fn check_failed(check: &str, status: Option<ExitStatus>, stderr: &str) -> Self {
        Self::CheckFailed {
            check: check.to_string(),
            status: status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "not started".to_string()),
            stderr: stderr.trim().to_string(),
        }
    }

    /// Whether the failure only concerns the target being processed.
    ///
    /// Configuration and authentication failures poison every later target,
    /// and duplicate pull requests are a hard stop regardless of mode.
    pub fn is_target_scoped(&self) -> bool {
        matches!(
            self,
            Self::Api { .. }
                | Self::Network(_)
                | Self::Git { .. }
                | Self::CheckFailed { .. }
                | Self::CheckOutput { .. }
                | Self::InvalidChange { .. }
                | Self::Io(_)
        )
    }
}
