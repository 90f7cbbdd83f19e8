//! Conditions and their combinators.
//!
//! Relative paths are resolved against the process working directory, which
//! cultivator sets to the mirror root.

use std::path::{Path, PathBuf};

use crate::{Condition, Result};

/// Always applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Condition for Always {
    fn applies(&self, _scratch: &Path) -> Result<bool> {
        Ok(true)
    }
}

/// Applies when any of the listed paths exists.
#[derive(Debug, Clone)]
pub struct FileExists {
    paths: Vec<PathBuf>,
}

impl FileExists {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl Condition for FileExists {
    fn applies(&self, _scratch: &Path) -> Result<bool> {
        Ok(self.paths.iter().any(|p| p.exists()))
    }
}

/// Applies when at least one inner condition does. Stops at the first match.
#[derive(Default)]
pub struct AnyOf(Vec<Box<dyn Condition>>);

impl AnyOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: impl Condition + 'static) -> Self {
        self.0.push(Box::new(condition));
        self
    }
}

impl From<Vec<Box<dyn Condition>>> for AnyOf {
    fn from(conditions: Vec<Box<dyn Condition>>) -> Self {
        Self(conditions)
    }
}

impl Condition for AnyOf {
    fn applies(&self, scratch: &Path) -> Result<bool> {
        for condition in &self.0 {
            if condition.applies(scratch)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Applies when every inner condition does. An empty set applies.
#[derive(Default)]
pub struct AllOf(Vec<Box<dyn Condition>>);

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: impl Condition + 'static) -> Self {
        self.0.push(Box::new(condition));
        self
    }
}

impl From<Vec<Box<dyn Condition>>> for AllOf {
    fn from(conditions: Vec<Box<dyn Condition>>) -> Self {
        Self(conditions)
    }
}

impl Condition for AllOf {
    fn applies(&self, scratch: &Path) -> Result<bool> {
        for condition in &self.0 {
            if !condition.applies(scratch)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
