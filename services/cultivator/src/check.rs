//! Check execution
//!
//! A check is any executable. It runs with the mirror root as its working
//! directory and the scratch directory as its only argument, and on success
//! prints one JSON [`Change`] to stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::error::{CultivatorError, Result};
use crate::target::Target;

/// The pull request a check asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Pull request title.
    pub name: String,
    /// Head branch the modifications are pushed to.
    pub branch: String,
    /// Pull request description.
    pub body: String,
    #[serde(rename = "commit_msg")]
    pub commit_message: String,
}

impl Change {
    /// Parse a check's stdout.
    pub fn parse(check: &str, stdout: &str) -> Result<Self> {
        serde_json::from_str(stdout).map_err(|source| CultivatorError::CheckOutput {
            check: check.to_string(),
            source,
        })
    }

    /// Reject changes that cannot become a pull request against `default_branch`.
    pub fn validate(&self, check: &str, default_branch: &str) -> Result<()> {
        let reason = if self.name.trim().is_empty() {
            "name is empty".to_string()
        } else if self.branch.trim().is_empty() {
            "branch is empty".to_string()
        } else if self.branch == default_branch {
            format!("branch {} is the default branch", self.branch)
        } else {
            return Ok(());
        };

        Err(CultivatorError::InvalidChange {
            check: check.to_string(),
            reason,
        })
    }
}

/// Spawns checks against target mirrors.
#[derive(Debug, Default, Clone)]
pub struct CheckRunner;

impl CheckRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `check` in the target's mirror and return its validated Change.
    #[instrument(skip(self, target, scratch), fields(repo = %target.repo.full_name))]
    pub async fn run(&self, check: &str, target: &Target, scratch: &Path) -> Result<Change> {
        let program = resolve_program(check)?;
        info!(program = %program.display(), "Running check");

        let output = Command::new(&program)
            .arg(scratch)
            .current_dir(&target.local_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CultivatorError::check_failed(check, None, &e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "Check stderr");
        }

        if !output.status.success() {
            return Err(CultivatorError::check_failed(
                check,
                Some(output.status),
                &stderr,
            ));
        }

        let change = Change::parse(check, &String::from_utf8_lossy(&output.stdout))?;
        change.validate(check, &target.repo.default_branch)?;
        debug!(branch = %change.branch, "Check produced change");
        Ok(change)
    }
}

/// Pin relative paths like `./checks/bump` to the orchestrator's working
/// directory; the child runs inside the mirror. Bare names go through `PATH`.
fn resolve_program(check: &str) -> Result<PathBuf> {
    let path = Path::new(check);
    if path.is_relative() && path.components().count() > 1 {
        Ok(std::env::current_dir()?.join(path))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(name: &str, branch: &str) -> Change {
        Change {
            name: name.to_string(),
            branch: branch.to_string(),
            body: "details".to_string(),
            commit_message: "bump".to_string(),
        }
    }

    #[test]
    fn test_parse_uses_commit_msg_key() {
        let parsed = Change::parse(
            "bump-deps",
            r#"{"name":"Bump deps","branch":"cultivator/deps","body":"...","commit_msg":"bump"}"#,
        )
        .unwrap();
        assert_eq!(parsed.commit_message, "bump");
        assert_eq!(parsed.branch, "cultivator/deps");
    }

    #[test]
    fn test_serialized_change_parses_back_exactly() {
        let original = Change {
            name: "Fix \"quotes\" and ünïcode".to_string(),
            branch: "cultivator/lint".to_string(),
            body: "line one\nline two\n".to_string(),
            commit_message: "lint: fix\n\nlonger description".to_string(),
        };
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"commit_msg\""));
        assert_eq!(Change::parse("lint", &json).unwrap(), original);
    }

    #[test]
    fn test_parse_rejects_trailing_output() {
        let err = Change::parse(
            "noisy",
            "{\"name\":\"a\",\"branch\":\"b\",\"body\":\"\",\"commit_msg\":\"c\"}\ndone\n",
        )
        .unwrap_err();
        assert!(matches!(err, CultivatorError::CheckOutput { .. }));
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let err = Change::parse("partial", r#"{"name":"a","branch":"b","body":""}"#).unwrap_err();
        assert!(err.to_string().contains("commit_msg"));
    }

    #[test]
    fn test_validate() {
        assert!(change("Bump deps", "cultivator/deps").validate("c", "main").is_ok());

        for (candidate, reason) in [
            (change("", "cultivator/deps"), "name is empty"),
            (change("Bump", "  "), "branch is empty"),
            (change("Bump", "main"), "branch main is the default branch"),
        ] {
            match candidate.validate("c", "main") {
                Err(CultivatorError::InvalidChange { reason: got, .. }) => assert_eq!(got, reason),
                other => panic!("expected invalid change, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_resolve_program() {
        assert_eq!(resolve_program("lint-fix").unwrap(), PathBuf::from("lint-fix"));
        assert_eq!(
            resolve_program("/opt/checks/bump").unwrap(),
            PathBuf::from("/opt/checks/bump")
        );
        assert_eq!(
            resolve_program("./checks/bump").unwrap(),
            std::env::current_dir().unwrap().join("./checks/bump")
        );
    }
}
