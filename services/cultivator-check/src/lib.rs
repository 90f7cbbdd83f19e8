//! Check-authoring toolkit for cultivator
//!
//! A check is a small binary that cultivator runs inside a repository mirror.
//! This crate splits one into three parts:
//!
//! - a [`Condition`] deciding whether the repository needs the change
//! - a [`Mutator`] editing the working tree
//! - a [`ChangeDescriber`] naming the pull request
//!
//! ```no_run
//! use cultivator_check::{Check, FileExists, FindReplace, StaticChange};
//!
//! fn main() -> std::process::ExitCode {
//!     let check = Check::new(
//!         FileExists::new(["Cargo.toml"]),
//!         FindReplace::new("Cargo.toml", r#"^edition = "2018"$"#, |_: &regex::Captures| {
//!             r#"edition = "2021""#.to_string()
//!         })
//!         .expect("valid pattern"),
//!         StaticChange::new("Update to edition 2021", "cultivator/edition", "", "Bump edition"),
//!     );
//!     check.main()
//! }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use thiserror::Error;

pub mod condition;
pub mod find_replace;

pub use condition::{AllOf, Always, AnyOf, FileExists};
pub use cultivator::Change;
pub use find_replace::{find_replace, FindReplace, LineRewriter};

#[derive(Debug, Error)]
pub enum CheckError {
    /// The check was not invoked with exactly one argument.
    #[error("expected exactly one argument (the scratch directory), got {count}")]
    Usage { count: usize },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to serialize change: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Raised by custom mutators.
    #[error("{0}")]
    Failed(String),
}

impl CheckError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T, E = CheckError> = std::result::Result<T, E>;

/// Decides whether a check applies to the current repository.
pub trait Condition {
    fn applies(&self, scratch: &Path) -> Result<bool>;
}

/// Edits the working tree.
pub trait Mutator {
    fn apply(&self, scratch: &Path) -> Result<()>;
}

impl<F> Mutator for F
where
    F: Fn(&Path) -> Result<()>,
{
    fn apply(&self, scratch: &Path) -> Result<()> {
        self(scratch)
    }
}

/// Produces the Change printed for cultivator.
pub trait ChangeDescriber {
    fn describe(&self, scratch: &Path) -> Result<Change>;
}

/// A fixed Change.
#[derive(Debug, Clone)]
pub struct StaticChange(Change);

impl StaticChange {
    pub fn new(
        name: impl Into<String>,
        branch: impl Into<String>,
        body: impl Into<String>,
        commit_message: impl Into<String>,
    ) -> Self {
        Self(Change {
            name: name.into(),
            branch: branch.into(),
            body: body.into(),
            commit_message: commit_message.into(),
        })
    }
}

impl ChangeDescriber for StaticChange {
    fn describe(&self, _scratch: &Path) -> Result<Change> {
        Ok(self.0.clone())
    }
}

/// A complete check.
pub struct Check {
    condition: Box<dyn Condition>,
    mutator: Box<dyn Mutator>,
    describer: Box<dyn ChangeDescriber>,
}

impl Check {
    pub fn new(
        condition: impl Condition + 'static,
        mutator: impl Mutator + 'static,
        describer: impl ChangeDescriber + 'static,
    ) -> Self {
        Self {
            condition: Box::new(condition),
            mutator: Box::new(mutator),
            describer: Box::new(describer),
        }
    }

    /// Run with the arguments following the program name.
    ///
    /// The mutator only runs when the condition holds. The Change is emitted
    /// either way, so cultivator can close a stale pull request.
    pub fn run<I>(&self, args: I) -> Result<String>
    where
        I: IntoIterator,
        I::Item: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let [scratch] = args.as_slice() else {
            return Err(CheckError::Usage { count: args.len() });
        };
        let scratch = Path::new(scratch);

        if self.condition.applies(scratch)? {
            self.mutator.apply(scratch)?;
        }

        let change = self.describer.describe(scratch)?;
        Ok(serde_json::to_string(&change)?)
    }

    /// Entry point for a check binary: prints the Change or reports the error.
    pub fn main(&self) -> ExitCode {
        match self.run(std::env::args_os().skip(1)) {
            Ok(output) => {
                print!("{output}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("check failed: {e}");
                ExitCode::FAILURE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn describer() -> StaticChange {
        StaticChange::new("Bump deps", "cultivator/deps", "body", "bump")
    }

    #[test]
    fn test_run_requires_exactly_one_argument() {
        let check = Check::new(Always, |_: &Path| -> Result<()> { Ok(()) }, describer());

        let none: Vec<String> = Vec::new();
        assert!(matches!(check.run(none), Err(CheckError::Usage { count: 0 })));
        assert!(matches!(
            check.run(["/tmp/a", "/tmp/b"]),
            Err(CheckError::Usage { count: 2 })
        ));
    }

    #[test]
    fn test_run_emits_change_json() {
        let check = Check::new(Always, |_: &Path| -> Result<()> { Ok(()) }, describer());
        let output = check.run(["/tmp/scratch"]).unwrap();

        let change: Change = serde_json::from_str(&output).unwrap();
        assert_eq!(change.branch, "cultivator/deps");
        assert!(output.contains(r#""commit_msg":"bump""#));
    }

    #[test]
    fn test_mutator_skipped_when_condition_fails() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let check = Check::new(
            FileExists::new(["/nonexistent/cultivator/marker"]),
            move |_: &Path| -> Result<()> {
                counter.set(counter.get() + 1);
                Ok(())
            },
            describer(),
        );

        assert!(check.run(["/tmp/scratch"]).is_ok());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_mutator_error_is_returned() {
        let check = Check::new(
            Always,
            |_: &Path| -> Result<()> { Err(CheckError::Failed("lockfile conflict".to_string())) },
            describer(),
        );
        let err = check.run(["/tmp/scratch"]).unwrap_err();
        assert_eq!(err.to_string(), "lockfile conflict");
    }

    #[test]
    fn test_mutator_receives_scratch_dir() {
        let seen = Rc::new(std::cell::RefCell::new(PathBuf::new()));
        let sink = seen.clone();
        let check = Check::new(
            Always,
            move |scratch: &Path| -> Result<()> {
                *sink.borrow_mut() = scratch.to_path_buf();
                Ok(())
            },
            describer(),
        );

        check.run(["/tmp/cultivator-abc"]).unwrap();
        assert_eq!(*seen.borrow(), PathBuf::from("/tmp/cultivator-abc"));
    }
}
