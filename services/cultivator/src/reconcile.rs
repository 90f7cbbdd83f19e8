//! Pull request reconciliation
//!
//! After a check runs, the mirror's working tree decides what happens on
//! GitHub:
//!
//! - clean tree: close the open pull request for the change's branch, if any
//! - dirty tree: commit, force-push the branch, then create or refresh the
//!   pull request
//!
//! The open pull requests for `<owner>:<branch>` are the only state consulted,
//! so a reconcile can be repeated safely after a crash. More than one open
//! pull request for a head ref is never resolved automatically.

use tracing::{info, instrument, warn};

use crate::check::Change;
use crate::error::{CultivatorError, Result};
use crate::git::Git;
use crate::github::{NewPullRequest, PullRequest, PullRequestUpdate};
use crate::target::Target;

/// What reconciliation did on GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Clean tree and no open pull request.
    Unchanged,
    Closed { number: u64 },
    Created { number: u64 },
    Updated { number: u64 },
}

/// Identity recorded on commits made in mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Committer {
    /// The App's bot identity, e.g. `cultivator[bot]`.
    pub fn for_app(slug: &str) -> Self {
        Self {
            name: format!("{slug}[bot]"),
            email: format!("{slug}[bot]@users.noreply.github.com"),
        }
    }

    /// Bot identity with any configured overrides applied.
    pub fn with_overrides(slug: &str, name: Option<&str>, email: Option<&str>) -> Self {
        let mut committer = Self::for_app(slug);
        if let Some(name) = name {
            committer.name = name.to_string();
        }
        if let Some(email) = email {
            committer.email = email.to_string();
        }
        committer
    }
}

pub struct Reconciler {
    git: Git,
    committer: Committer,
}

impl Reconciler {
    pub fn new(git: Git, committer: Committer) -> Self {
        Self { git, committer }
    }

    /// Whether the mirror has modified, staged or untracked files.
    pub async fn is_dirty(&self, target: &Target) -> Result<bool> {
        let status = self
            .git
            .run(
                &target.local_path,
                &["status", "--porcelain", "--untracked-files=all"],
            )
            .await?;
        Ok(!status.trim().is_empty())
    }

    #[instrument(skip_all, fields(repo = %target.repo.full_name, branch = %change.branch))]
    pub async fn reconcile(&self, target: &Target, change: &Change) -> Result<Reconciliation> {
        if self.is_dirty(target).await? {
            self.open_or_update_pr(target, change).await
        } else {
            self.close_open_pr(target, &change.branch).await
        }
    }

    /// Close the open pull request for `branch`, if there is one.
    pub async fn close_open_pr(&self, target: &Target, branch: &str) -> Result<Reconciliation> {
        let Some(existing) = self.find_open_pr(target, branch).await? else {
            info!("Working tree clean, nothing to close");
            return Ok(Reconciliation::Unchanged);
        };

        target
            .client
            .update_pull_request(
                &target.repo.owner,
                &target.repo.name,
                existing.number,
                &PullRequestUpdate::close(),
            )
            .await?;
        info!(number = existing.number, "Closed pull request");
        Ok(Reconciliation::Closed {
            number: existing.number,
        })
    }

    /// Commit and push the working tree, then create or refresh the pull request.
    pub async fn open_or_update_pr(&self, target: &Target, change: &Change) -> Result<Reconciliation> {
        // Looked up before anything is mutated so a duplicate leaves no trace.
        let existing = self.find_open_pr(target, &change.branch).await?;

        self.publish(target, change).await?;

        let client = &target.client;
        let (owner, repo) = (&target.repo.owner, &target.repo.name);
        match existing {
            Some(pr) => {
                client
                    .update_pull_request(
                        owner,
                        repo,
                        pr.number,
                        &PullRequestUpdate::retitle(&change.name, &change.body),
                    )
                    .await?;
                info!(number = pr.number, "Updated pull request");
                Ok(Reconciliation::Updated { number: pr.number })
            }
            None => {
                let created = client
                    .create_pull_request(
                        owner,
                        repo,
                        &NewPullRequest {
                            title: &change.name,
                            body: &change.body,
                            head: &change.branch,
                            base: &target.repo.default_branch,
                        },
                    )
                    .await?;
                info!(
                    number = created.number,
                    url = created.html_url.as_deref().unwrap_or(""),
                    "Created pull request"
                );
                Ok(Reconciliation::Created {
                    number: created.number,
                })
            }
        }
    }

    async fn find_open_pr(&self, target: &Target, branch: &str) -> Result<Option<PullRequest>> {
        let head = target.head_ref(branch);
        let mut open = target
            .client
            .list_pull_requests(&target.repo.owner, &target.repo.name, &head)
            .await?;

        if open.len() > 1 {
            warn!(head = %head, count = open.len(), "Multiple open pull requests for one head");
            return Err(CultivatorError::DuplicatePullRequests {
                head,
                count: open.len(),
            });
        }
        Ok(open.pop())
    }

    async fn publish(&self, target: &Target, change: &Change) -> Result<()> {
        let path = &target.local_path;
        let name = format!("user.name={}", self.committer.name);
        let email = format!("user.email={}", self.committer.email);

        self.git.run(path, &["add", "--all"]).await?;
        self.git
            .run(
                path,
                &[
                    "-c",
                    &name,
                    "-c",
                    &email,
                    "-c",
                    "commit.gpgsign=false",
                    "commit",
                    "--quiet",
                    "--no-verify",
                    "-m",
                    &change.commit_message,
                ],
            )
            .await?;

        // The token used at sync time may have been re-minted since.
        let url = target.remote_url().await?;
        self.git
            .run(path, &["remote", "set-url", "origin", &url])
            .await?;

        let refspec = format!("HEAD:refs/heads/{}", change.branch);
        self.git
            .run(path, &["push", "--quiet", "--force", "origin", &refspec])
            .await?;
        info!("Pushed branch");
        Ok(())
    }
}
