//! Mirror synchronization
//!
//! Each target keeps a persistent working copy under the cache directory.
//! Before every check the mirror is forced back to the remote default branch:
//! diverged refs are overwritten, local edits and untracked files are
//! discarded. The result is equivalent to a fresh clone.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::auth::redact_url;
use crate::error::Result;
use crate::git::Git;
use crate::target::Target;

/// What a sync did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No mirror existed; a fresh clone was made.
    Cloned,
    /// An existing mirror was reset to the remote default branch.
    Refreshed,
    /// The remote has no default branch yet (empty repository).
    Empty,
}

/// Whether `path` holds a git working copy.
pub fn mirror_exists(path: &Path) -> bool {
    path.join(".git").is_dir()
}

pub struct MirrorSynchronizer {
    git: Git,
}

impl MirrorSynchronizer {
    pub fn new(git: Git) -> Self {
        Self { git }
    }

    /// Bring the target's mirror in line with `origin/<default_branch>`.
    #[instrument(skip_all, fields(repo = %target.repo.full_name))]
    pub async fn sync(&self, target: &mut Target) -> Result<SyncOutcome> {
        if mirror_exists(&target.local_path) {
            self.refresh(target).await
        } else {
            self.clone_mirror(target).await
        }
    }

    async fn clone_mirror(&self, target: &mut Target) -> Result<SyncOutcome> {
        let path = target.local_path.clone();

        if path.exists() {
            // Leftovers from an interrupted clone; git refuses a non-empty destination.
            warn!(path = %path.display(), "Removing incomplete mirror");
            tokio::fs::remove_dir_all(&path).await?;
        }
        tokio::fs::create_dir_all(&path).await?;

        let url = target.remote_url().await?;
        info!(
            url = %redact_url(&url),
            path = %path.display(),
            "Cloning repository"
        );
        self.git.run(&path, &["clone", "--quiet", &url, "."]).await?;
        target.fetched = true;

        if self.has_remote_default(target).await? {
            Ok(SyncOutcome::Cloned)
        } else {
            info!(path = %path.display(), "Cloned an empty repository");
            Ok(SyncOutcome::Empty)
        }
    }

    async fn refresh(&self, target: &mut Target) -> Result<SyncOutcome> {
        let path = target.local_path.clone();
        info!(path = %path.display(), "Refreshing mirror");

        // Credentials expire, so the remote URL is rewritten on every sync.
        let url = target.remote_url().await?;
        self.git
            .run(&path, &["remote", "set-url", "origin", &url])
            .await?;

        if !target.fetched {
            self.git
                .run(
                    &path,
                    &[
                        "fetch",
                        "--quiet",
                        "--force",
                        "--prune",
                        "origin",
                        "+refs/heads/*:refs/remotes/origin/*",
                        "+refs/tags/*:refs/tags/*",
                    ],
                )
                .await?;
            target.fetched = true;
        }

        let outcome = if self.has_remote_default(target).await? {
            let branch = &target.repo.default_branch;
            let remote_ref = format!("refs/remotes/origin/{branch}");
            self.git
                .run(&path, &["checkout", "--quiet", "--force", "-B", branch, &remote_ref])
                .await?;
            self.git
                .run(&path, &["reset", "--quiet", "--hard", &remote_ref])
                .await?;
            SyncOutcome::Refreshed
        } else {
            SyncOutcome::Empty
        };

        self.git.run(&path, &["clean", "-ffdxq"]).await?;
        Ok(outcome)
    }

    async fn has_remote_default(&self, target: &Target) -> Result<bool> {
        let remote_ref = format!("refs/remotes/origin/{}", target.repo.default_branch);
        self.git
            .succeeds(
                &target.local_path,
                &["rev-parse", "--verify", "--quiet", &remote_ref],
            )
            .await
    }
}
