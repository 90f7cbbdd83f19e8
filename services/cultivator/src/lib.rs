//! Cultivator
//!
//! Fleet-wide repository maintenance through a GitHub App.
//!
//! For every repository the App is installed on, cultivator keeps a local
//! mirror, runs each configured check program inside it, and turns whatever
//! the check changed into a pull request. A check that leaves the tree clean
//! closes the pull request it opened earlier.
//!
//! ## Pipeline
//!
//! 1. [`target::TargetResolver`] lists installations and their repositories
//! 2. [`mirror::MirrorSynchronizer`] clones or resets each mirror
//! 3. [`check::CheckRunner`] runs the check and parses its [`check::Change`]
//! 4. [`reconcile::Reconciler`] creates, updates or closes the pull request
//!
//! [`executor::Executor`] drives the loop.
//!
//! ## Example
//!
//! ```bash
//! cultivator --config /etc/cultivator/config.yaml execute --keep-going
//! cultivator targets
//! cultivator token --installation-id 78901234 --format json
//! ```

pub mod auth;
pub mod check;
pub mod config;
pub mod error;
pub mod executor;
pub mod git;
pub mod github;
pub mod mirror;
pub mod reconcile;
pub mod target;

pub use check::Change;
pub use config::Config;
pub use error::{ConfigError, CultivatorError, Result};
pub use executor::{ExecuteOptions, Executor, RunSummary};
