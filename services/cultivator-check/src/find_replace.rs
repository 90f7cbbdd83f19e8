//! Line-oriented find and replace.

use std::path::{Path, PathBuf};

use regex::{Captures, Regex};

use crate::{CheckError, Mutator, Result};

/// Computes the replacement for a matching line from its captures.
pub trait LineRewriter {
    fn rewrite(&self, captures: &Captures<'_>) -> String;
}

impl<F> LineRewriter for F
where
    F: Fn(&Captures<'_>) -> String,
{
    fn rewrite(&self, captures: &Captures<'_>) -> String {
        self(captures)
    }
}

/// Rewrite every line of `file` matching `pattern`.
///
/// Line endings, including a trailing newline or its absence, are kept as
/// they were. The file is only written when a line actually changed. Returns
/// the number of changed lines.
pub fn find_replace(file: &Path, pattern: &Regex, rewriter: &dyn LineRewriter) -> Result<usize> {
    let contents = std::fs::read_to_string(file).map_err(|e| CheckError::io(file, e))?;

    let mut changed = 0;
    let mut output = String::with_capacity(contents.len());
    for raw in contents.split_inclusive('\n') {
        let (line, ending) = split_ending(raw);
        match pattern.captures(line) {
            Some(captures) => {
                let replacement = rewriter.rewrite(&captures);
                if replacement != line {
                    changed += 1;
                }
                output.push_str(&replacement);
            }
            None => output.push_str(line),
        }
        output.push_str(ending);
    }

    if changed > 0 {
        std::fs::write(file, output).map_err(|e| CheckError::io(file, e))?;
    }
    Ok(changed)
}

fn split_ending(raw: &str) -> (&str, &str) {
    if let Some(line) = raw.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = raw.strip_suffix('\n') {
        (line, "\n")
    } else {
        (raw, "")
    }
}

/// [`find_replace`] over one file, as a [`Mutator`].
pub struct FindReplace {
    file: PathBuf,
    pattern: Regex,
    rewriter: Box<dyn LineRewriter>,
}

impl FindReplace {
    pub fn new(
        file: impl Into<PathBuf>,
        pattern: &str,
        rewriter: impl LineRewriter + 'static,
    ) -> Result<Self> {
        Ok(Self {
            file: file.into(),
            pattern: Regex::new(pattern)?,
            rewriter: Box::new(rewriter),
        })
    }
}

impl Mutator for FindReplace {
    fn apply(&self, _scratch: &Path) -> Result<()> {
        find_replace(&self.file, &self.pattern, self.rewriter.as_ref()).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump_version(captures: &Captures<'_>) -> String {
        format!("{}\"2.0.0\"", &captures[1])
    }

    #[test]
    fn test_rewrites_matching_lines_and_keeps_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Cargo.toml");
        std::fs::write(&file, "[package]\nversion = \"1.0.0\"\nname = \"x\"\n").unwrap();

        let pattern = Regex::new(r#"^(version = )"[^"]*"$"#).unwrap();
        let changed = find_replace(&file, &pattern, &bump_version).unwrap();

        assert_eq!(changed, 1);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "[package]\nversion = \"2.0.0\"\nname = \"x\"\n"
        );
    }

    #[test]
    fn test_missing_trailing_newline_stays_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("VERSION");
        std::fs::write(&file, "a\r\nold").unwrap();

        let pattern = Regex::new("^old$").unwrap();
        find_replace(&file, &pattern, &|_: &Captures<'_>| "new".to_string()).unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "a\r\nnew");
    }

    #[test]
    fn test_no_match_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("README.md");
        std::fs::write(&file, "# Title\n").unwrap();

        let pattern = Regex::new("^version").unwrap();
        assert_eq!(find_replace(&file, &pattern, &bump_version).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "# Title\n");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let pattern = Regex::new("x").unwrap();
        let err = find_replace(Path::new("/nonexistent/file"), &pattern, &bump_version).unwrap_err();
        assert!(matches!(err, CheckError::Io { .. }));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = FindReplace::new("x", "(unclosed", bump_version).err().unwrap();
        assert!(matches!(err, CheckError::Pattern(_)));
    }

    #[test]
    fn test_mutator_applies_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pyproject.toml");
        std::fs::write(&file, "version = \"0.1.0\"\n").unwrap();

        let mutator = FindReplace::new(&file, r#"^(version = )"[^"]*"$"#, bump_version).unwrap();
        mutator.apply(dir.path()).unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "version = \"2.0.0\"\n");
    }
}
