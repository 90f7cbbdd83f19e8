//! Targets and their resolution
//!
//! A target is one repository visible to one installation of the App, paired
//! with the local mirror path and the clients needed to act on it.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::auth::{CredentialProvider, GitCredential};
use crate::config::Config;
use crate::error::Result;
use crate::github::{App, GitHubClient, Repository};

/// Immutable repository metadata, fetched once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub default_branch: String,
    pub clone_url: String,
}

impl From<Repository> for RepositoryDescriptor {
    fn from(repo: Repository) -> Self {
        Self {
            owner: repo.owner.login,
            name: repo.name,
            full_name: repo.full_name,
            default_branch: repo.default_branch,
            clone_url: repo.clone_url,
        }
    }
}

/// The unit of work: one repository, its mirror, and its credentials.
#[derive(Debug)]
pub struct Target {
    pub repo: RepositoryDescriptor,
    pub local_path: PathBuf,
    pub installation_id: u64,
    pub client: GitHubClient,
    credentials: Arc<CredentialProvider>,
    /// Set once the mirror has been cloned or fetched during this run.
    pub(crate) fetched: bool,
}

impl Target {
    pub fn new(
        repo: RepositoryDescriptor,
        local_path: PathBuf,
        installation_id: u64,
        credentials: Arc<CredentialProvider>,
    ) -> Self {
        let client = GitHubClient::for_installation(credentials.clone(), installation_id);
        Self {
            repo,
            local_path,
            installation_id,
            client,
            credentials,
            fetched: false,
        }
    }

    /// Fresh git credential for this target's installation.
    pub async fn git_credential(&self) -> Result<GitCredential> {
        self.credentials.git_credential(self.installation_id).await
    }

    /// Clone URL carrying a current credential.
    pub async fn remote_url(&self) -> Result<String> {
        Ok(self.git_credential().await?.authenticate(&self.repo.clone_url))
    }

    /// Head ref used to look up pull requests for `branch`.
    pub fn head_ref(&self, branch: &str) -> String {
        format!("{}:{}", self.repo.owner, branch)
    }

    /// Whether this target was cloned or fetched earlier in the run.
    pub fn fetched_this_run(&self) -> bool {
        self.fetched
    }
}

/// Targets plus the App they were resolved for.
#[derive(Debug)]
pub struct Resolution {
    pub app: App,
    pub targets: Vec<Target>,
}

/// Enumerates every repository reachable through the App's installations.
pub struct TargetResolver {
    config: Config,
    credentials: Arc<CredentialProvider>,
}

impl TargetResolver {
    pub fn new(config: Config, credentials: Arc<CredentialProvider>) -> Self {
        Self {
            config,
            credentials,
        }
    }

    /// List installations and their repositories.
    ///
    /// Any API or pagination failure aborts the whole resolution. Ordering is
    /// whatever GitHub returns.
    #[instrument(skip(self), fields(app_id = self.credentials.app_id()))]
    pub async fn resolve(&self) -> Result<Resolution> {
        let app_client = GitHubClient::for_app(self.credentials.clone());

        let app = app_client.get_app().await?;
        let installations = app_client.list_installations().await?;
        info!(
            app = %app.slug,
            installations = installations.len(),
            "Found installations"
        );

        let mut targets = Vec::new();
        for installation in installations {
            // Fails fast on a revoked installation before any repo work starts.
            self.credentials.git_credential(installation.id).await?;

            let client = GitHubClient::for_installation(self.credentials.clone(), installation.id);
            let repos = client.list_installation_repositories().await?;
            debug!(
                installation_id = installation.id,
                account = installation.account.as_ref().map(|a| a.login.as_str()).unwrap_or("unknown"),
                repositories = repos.len(),
                "Listed installation repositories"
            );

            for repo in repos {
                let local_path = self.config.mirror_path(&repo.full_name);
                targets.push(Target::new(
                    repo.into(),
                    local_path,
                    installation.id,
                    self.credentials.clone(),
                ));
            }
        }

        info!(targets = targets.len(), "Resolved targets");
        Ok(Resolution { app, targets })
    }
}
