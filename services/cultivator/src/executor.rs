//! Run orchestration
//!
//! Resolves targets once, then for each configured check walks every target
//! in order: sync the mirror, run the check, reconcile the result. Each check
//! gets its own scratch directory, removed when its pass ends however it ends.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::auth::CredentialProvider;
use crate::check::CheckRunner;
use crate::config::Config;
use crate::error::{CultivatorError, Result};
use crate::git::Git;
use crate::mirror::{MirrorSynchronizer, SyncOutcome};
use crate::reconcile::{Committer, Reconciler, Reconciliation};
use crate::target::{Resolution, Target, TargetResolver};

/// Prefix of the per-check scratch directory.
pub const SCRATCH_PREFIX: &str = "cultivator-";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Log target-scoped failures and carry on with the remaining targets.
    pub keep_going: bool,
}

/// Tally of one check's pass over the fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub check: String,
    pub created: usize,
    pub updated: usize,
    pub closed: usize,
    pub unchanged: usize,
    /// Targets whose repository is empty.
    pub skipped: usize,
    pub failed: usize,
}

impl CheckSummary {
    fn new(check: &str) -> Self {
        Self {
            check: check.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: TargetOutcome) {
        match outcome {
            TargetOutcome::Skipped => self.skipped += 1,
            TargetOutcome::Reconciled(Reconciliation::Unchanged) => self.unchanged += 1,
            TargetOutcome::Reconciled(Reconciliation::Closed { .. }) => self.closed += 1,
            TargetOutcome::Reconciled(Reconciliation::Created { .. }) => self.created += 1,
            TargetOutcome::Reconciled(Reconciliation::Updated { .. }) => self.updated += 1,
        }
    }
}

impl fmt::Display for CheckSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} created, {} updated, {} closed, {} unchanged, {} skipped, {} failed",
            self.check,
            self.created,
            self.updated,
            self.closed,
            self.unchanged,
            self.skipped,
            self.failed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub targets: usize,
    pub checks: Vec<CheckSummary>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.checks.iter().map(|c| c.failed).sum()
    }
}

enum TargetOutcome {
    Skipped,
    Reconciled(Reconciliation),
}

pub struct Executor {
    config: Config,
    options: ExecuteOptions,
    credentials: Arc<CredentialProvider>,
    git: Git,
    mirror: MirrorSynchronizer,
    runner: CheckRunner,
}

impl Executor {
    /// Build an executor, loading the App key named in `config`.
    pub fn new(config: Config, options: ExecuteOptions) -> Result<Self> {
        let credentials = Arc::new(CredentialProvider::from_config(&config)?);
        Ok(Self::with_credentials(config, options, credentials))
    }

    pub fn with_credentials(
        config: Config,
        options: ExecuteOptions,
        credentials: Arc<CredentialProvider>,
    ) -> Self {
        let git = Git::new(&config.git_binary);
        Self {
            mirror: MirrorSynchronizer::new(git.clone()),
            runner: CheckRunner::new(),
            git,
            config,
            options,
            credentials,
        }
    }

    /// Enumerate every target without touching any mirror.
    pub async fn resolve(&self) -> Result<Resolution> {
        TargetResolver::new(self.config.clone(), self.credentials.clone())
            .resolve()
            .await
    }

    /// Run every configured check against every target.
    #[instrument(skip(self), fields(checks = self.config.checks.len()))]
    pub async fn execute(&self) -> Result<RunSummary> {
        let Resolution { app, mut targets } = self.resolve().await?;
        let committer = Committer::with_overrides(
            &app.slug,
            self.config.committer_name.as_deref(),
            self.config.committer_email.as_deref(),
        );
        let reconciler = Reconciler::new(self.git.clone(), committer);

        let mut summary = RunSummary {
            targets: targets.len(),
            checks: Vec::with_capacity(self.config.checks.len()),
        };

        for check in &self.config.checks {
            let check_summary = self.run_check(check, &mut targets, &reconciler).await?;
            info!(summary = %check_summary, "Check finished");
            summary.checks.push(check_summary);
        }

        let failed = summary.failed();
        if failed > 0 {
            error!(failed, "Run finished with failures");
            return Err(CultivatorError::TargetsFailed { failed });
        }
        info!(targets = summary.targets, "Run finished");
        Ok(summary)
    }

    /// One check's pass over all targets.
    #[instrument(skip(self, targets, reconciler))]
    pub async fn run_check(
        &self,
        check: &str,
        targets: &mut [Target],
        reconciler: &Reconciler,
    ) -> Result<CheckSummary> {
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()?;
        info!(scratch = %scratch.path().display(), targets = targets.len(), "Starting check");

        let mut summary = CheckSummary::new(check);
        for target in targets.iter_mut() {
            match self
                .process_target(check, target, scratch.path(), reconciler)
                .await
            {
                Ok(outcome) => summary.record(outcome),
                Err(e) if self.options.keep_going && e.is_target_scoped() => {
                    error!(repo = %target.repo.full_name, error = %e, "Target failed");
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(summary)
    }

    async fn process_target(
        &self,
        check: &str,
        target: &mut Target,
        scratch: &std::path::Path,
        reconciler: &Reconciler,
    ) -> Result<TargetOutcome> {
        if self.mirror.sync(target).await? == SyncOutcome::Empty {
            warn!(repo = %target.repo.full_name, "Repository is empty, skipping");
            return Ok(TargetOutcome::Skipped);
        }

        let change = self.runner.run(check, target, scratch).await?;
        let outcome = reconciler.reconcile(target, &change).await?;
        Ok(TargetOutcome::Reconciled(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_summary_records_outcomes() {
        let mut summary = CheckSummary::new("bump-deps");
        summary.record(TargetOutcome::Skipped);
        summary.record(TargetOutcome::Reconciled(Reconciliation::Created { number: 3 }));
        summary.record(TargetOutcome::Reconciled(Reconciliation::Created { number: 4 }));
        summary.record(TargetOutcome::Reconciled(Reconciliation::Unchanged));

        assert_eq!(summary.created, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(
            summary.to_string(),
            "bump-deps: 2 created, 0 updated, 0 closed, 1 unchanged, 1 skipped, 0 failed"
        );
    }

    #[test]
    fn test_run_summary_failed_sums_checks() {
        let summary = RunSummary {
            targets: 3,
            checks: vec![
                CheckSummary {
                    failed: 1,
                    ..CheckSummary::new("a")
                },
                CheckSummary {
                    failed: 2,
                    ..CheckSummary::new("b")
                },
            ],
        };
        assert_eq!(summary.failed(), 3);
    }
}
