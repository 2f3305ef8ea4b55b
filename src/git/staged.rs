//! Staged-change queries against a git working tree.

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::Repository;
use tracing::debug;

use crate::error::DiffError;

/// Source of staged-file information.
///
/// This abstraction allows the aggregator to be tested without a repository.
#[cfg_attr(test, mockall::automock)]
pub trait StagedSource {
    /// Staged paths (index vs HEAD), in listing order.
    fn staged_paths(&self) -> Result<Vec<String>, DiffError>;

    /// Staged diff text for a single path.
    fn file_diff(&self, path: &str) -> Result<String, DiffError>;

    /// Index-column porcelain status character, if git reports one.
    fn porcelain_status(&self, path: &str) -> Option<char>;
}

/// [`StagedSource`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    /// Open the working tree containing `path`.
    pub fn open(path: &Path) -> Result<Self, DiffError> {
        let access = |reason: String| DiffError::RepoAccess {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_dir() {
            return Err(access("not an existing directory".to_string()));
        }

        let repo = Repository::discover(path).map_err(|e| access(e.message().to_string()))?;
        let root = repo
            .workdir()
            .ok_or_else(|| access("bare repository has no working tree".to_string()))?
            .to_path_buf();

        debug!("Using git working tree at {}", root.display());
        Ok(Self { root })
    }

    /// Working tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run git in the working tree root and return its stdout.
    fn run_git(&self, args: &[&str], operation: &str) -> Result<String, DiffError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["--literal-pathspecs", "-c", "core.quotepath=off"])
            .args(args)
            .output()
            .map_err(|e| DiffError::Command {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiffError::Command {
                operation: operation.to_string(),
                reason: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl StagedSource for GitCli {
    fn staged_paths(&self) -> Result<Vec<String>, DiffError> {
        let stdout = self
            .run_git(&["diff", "--cached", "--name-only", "-z"], "list staged files")
            .map_err(|e| DiffError::RepoAccess {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;

        // NUL-separated names are never C-quoted, so they can be passed back
        // to git verbatim.
        Ok(stdout
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn file_diff(&self, path: &str) -> Result<String, DiffError> {
        self.run_git(&["diff", "--cached", "--", path], "diff")
    }

    fn porcelain_status(&self, path: &str) -> Option<char> {
        let stdout = self
            .run_git(&["status", "--porcelain", "--", path], "status")
            .ok()?;
        stdout.lines().next().and_then(|line| line.chars().next())
    }
}
