//! Git CLI runner
//!
//! Every git operation shells out to the configured git binary with captured
//! output. Arguments and stderr are scrubbed of embedded credentials before
//! they are logged or returned in errors.

use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use crate::auth::redact_url;
use crate::error::{CultivatorError, Result};

/// Handle on the git executable.
#[derive(Debug, Clone)]
pub struct Git {
    binary: PathBuf,
}

impl Default for Git {
    fn default() -> Self {
        Self::new("git")
    }
}

impl Git {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn output(&self, dir: &Path, args: &[&str]) -> Result<Output> {
        let shown: Vec<String> = args.iter().map(|a| redact_url(a)).collect();
        debug!(dir = %dir.display(), args = ?shown, "Running git");

        Command::new(&self.binary)
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CultivatorError::git(
                    subcommand(args),
                    format!("failed to run {}: {e}", self.binary.display()),
                )
            })
    }

    /// Run git in `dir`, returning stdout; non-zero exit is an error.
    pub async fn run(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = self.output(dir, args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                format!("exit status {}", output.status)
            } else {
                scrub_credentials(stderr.trim())
            };
            return Err(CultivatorError::git(subcommand(args), detail));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run git in `dir` and report only whether it exited zero.
    pub async fn succeeds(&self, dir: &Path, args: &[&str]) -> Result<bool> {
        Ok(self.output(dir, args).await?.status.success())
    }
}

fn subcommand(args: &[&str]) -> String {
    args.iter()
        .find(|a| !a.starts_with('-') && !a.contains('='))
        .unwrap_or(&"")
        .to_string()
}

/// Replace the secret half of any `user:secret@` userinfo in `text`.
pub fn scrub_credentials(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(scheme) = rest.find("://") {
        let (head, tail) = rest.split_at(scheme + 3);
        out.push_str(head);

        let authority_end = tail
            .find(|c: char| c == '/' || c.is_whitespace() || c == '\'' || c == '"')
            .unwrap_or(tail.len());
        let authority = &tail[..authority_end];

        match (authority.rfind('@'), authority.find(':')) {
            (Some(at), Some(colon)) if colon < at => {
                out.push_str(&authority[..colon]);
                out.push_str(":<redacted>");
                out.push_str(&authority[at..]);
            }
            _ => out.push_str(authority),
        }
        rest = &tail[authority_end..];
    }

    out.push_str(rest);
    out
}
