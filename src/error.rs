//! Error types for cmai modules using thiserror.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from staged diff aggregation.
///
/// A per-file `Command` failure is absorbed into a status fallback entry by
/// the aggregator and never propagates out of it.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Cannot access git repository at {path}: {reason}")]
    RepoAccess { path: PathBuf, reason: String },

    #[error("git {operation} failed: {reason}")]
    Command { operation: String, reason: String },
}

/// Errors from the subprocess transport that carries the model stream.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("curl not found. Install curl to reach the model backend")]
    NotInstalled,

    #[error("Failed to spawn curl process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Failed to prepare request: {0}")]
    RequestFailed(String),

    #[error("I/O error while reading the model stream: {0}")]
    Io(#[source] std::io::Error),

    #[error("No data from the model backend for {0} seconds")]
    Timeout(u64),

    #[error("curl exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Backend reported an error: {0}")]
    Backend(String),
}

/// Errors from consuming a model stream.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Model stream interrupted: {reason}")]
    Interrupted {
        /// Answer text accumulated before the failure.
        partial: String,
        reason: String,
    },
}

impl StreamError {
    /// Answer text received before the stream broke.
    pub fn partial(&self) -> &str {
        match self {
            StreamError::Interrupted { partial, .. } => partial,
        }
    }
}

/// Errors from the top-level normalization operation.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("No staged changes found in the repository. Stage files with `git add` first")]
    NoStagedChanges,

    #[error("Failed to start the model request: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Errors from loading settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Settings file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read settings file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// Errors from committing the staged index.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("Failed to open repository: {0}")]
    OpenRepository(#[source] git2::Error),

    #[error("Failed to read the index: {0}")]
    IndexFailed(#[source] git2::Error),

    #[error("Failed to create commit: {0}")]
    CommitFailed(#[source] git2::Error),

    #[error("Git config error (missing user.name or user.email): {0}")]
    ConfigError(#[source] git2::Error),

    #[error("Commit message is empty")]
    EmptyMessage,
}
