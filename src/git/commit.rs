//! Committing the staged index.

use std::path::Path;

use git2::{Commit, ErrorCode, Oid, Repository};
use tracing::info;

use crate::error::CommitError;

/// Commit the current index with `message`.
///
/// Only what is already staged is committed. In a repository without commits
/// the result becomes the root commit.
pub fn commit_staged(repo_path: &Path, message: &str) -> Result<Oid, CommitError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(CommitError::EmptyMessage);
    }

    let repo = Repository::discover(repo_path).map_err(CommitError::OpenRepository)?;

    let mut index = repo.index().map_err(CommitError::IndexFailed)?;
    let tree_id = index.write_tree().map_err(CommitError::IndexFailed)?;
    let tree = repo.find_tree(tree_id).map_err(CommitError::CommitFailed)?;

    let sig = repo.signature().map_err(CommitError::ConfigError)?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit().map_err(CommitError::CommitFailed)?),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(CommitError::CommitFailed(e)),
    };
    let parents: Vec<&Commit> = parent.iter().collect();

    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .map_err(CommitError::CommitFailed)?;

    info!("Created commit {}", oid);
    Ok(oid)
}
