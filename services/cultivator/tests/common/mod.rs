//! Shared fixtures: a mock GitHub, local bare remotes, mirror snapshots.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cultivator::auth::CredentialProvider;
use cultivator::target::{RepositoryDescriptor, Target};

pub const APP_ID: u64 = 4242;
pub const INSTALLATION_ID: u64 = 77;
pub const TOKEN: &str = "ghs_testtoken";

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn credentials(server: &MockServer) -> Arc<CredentialProvider> {
    let pem = std::fs::read(fixture("app-key.pem")).unwrap();
    Arc::new(CredentialProvider::new(APP_ID, &pem, &server.uri()).unwrap())
}

/// Serve installation tokens valid for `valid_for`.
pub async fn mount_token(server: &MockServer, installation_id: u64, valid_for: Duration) {
    Mock::given(method("POST"))
        .and(path(format!("/app/installations/{installation_id}/access_tokens")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "token": TOKEN,
            "expires_at": (Utc::now() + valid_for).to_rfc3339(),
        })))
        .mount(server)
        .await;
}

pub fn pull_request(number: u64, branch: &str) -> serde_json::Value {
    json!({
        "number": number,
        "state": "open",
        "title": "Bump deps",
        "html_url": format!("https://github.com/acme/widgets/pull/{number}"),
        "head": { "ref": branch, "label": format!("acme:{branch}") },
    })
}

/// Run git synchronously, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test Author",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare repository acting as the GitHub remote.
pub struct Remote {
    _dir: TempDir,
    pub path: PathBuf,
}

impl Remote {
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widgets.git");
        std::fs::create_dir(&path).unwrap();
        git(&path, &["init", "--quiet", "--bare"]);
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        Self { _dir: dir, path }
    }

    /// A remote whose `main` holds `files`.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let remote = Self::empty();
        remote.push_commit(files, "initial");
        remote
    }

    pub fn url(&self) -> String {
        self.path.display().to_string()
    }

    /// Commit `files` on top of `main` from a throwaway clone.
    pub fn push_commit(&self, files: &[(&str, &str)], message: &str) {
        let work = tempfile::tempdir().unwrap();
        git(work.path(), &["init", "--quiet"]);
        git(work.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(work.path(), &["remote", "add", "origin", &self.url()]);
        if self.has_ref("refs/heads/main") {
            git(work.path(), &["fetch", "--quiet", "origin", "main"]);
            git(work.path(), &["reset", "--quiet", "--hard", "FETCH_HEAD"]);
        }
        for (name, contents) in files {
            let file = work.path().join(name);
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(file, contents).unwrap();
        }
        git(work.path(), &["add", "--all"]);
        git(work.path(), &["commit", "--quiet", "-m", message]);
        git(work.path(), &["push", "--quiet", "origin", "main"]);
    }

    pub fn has_ref(&self, name: &str) -> bool {
        Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", name])
            .current_dir(&self.path)
            .output()
            .unwrap()
            .status
            .success()
    }

    pub fn rev(&self, name: &str) -> String {
        git(&self.path, &["rev-parse", name])
    }

    pub fn log_subject(&self, name: &str) -> String {
        git(&self.path, &["log", "-1", "--format=%s", name])
    }

    pub fn log_author(&self, name: &str) -> String {
        git(&self.path, &["log", "-1", "--format=%an <%ae>", name])
    }
}

pub fn descriptor(clone_url: &str) -> RepositoryDescriptor {
    RepositoryDescriptor {
        owner: "acme".to_string(),
        name: "widgets".to_string(),
        full_name: "acme/widgets".to_string(),
        default_branch: "main".to_string(),
        clone_url: clone_url.to_string(),
    }
}

pub fn target(remote: &Remote, mirror: &Path, credentials: Arc<CredentialProvider>) -> Target {
    Target::new(
        descriptor(&remote.url()),
        mirror.to_path_buf(),
        INSTALLATION_ID,
        credentials,
    )
}

/// Every file under `root` except `.git`, with contents.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.file_name().is_some_and(|n| n == ".git") {
                continue;
            }
            if entry.file_type().unwrap().is_dir() {
                walk(root, &path, out);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\nset -e\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
