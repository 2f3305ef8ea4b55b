//! cmai - turns an informal change description into a normalized commit message.
//!
//! # Overview
//!
//! cmai reads the staged diff of a git repository, combines it with the
//! user's description into a prompt, streams the answer of a language model
//! and separates the model's reasoning from the final commit message.

pub mod commit;
pub mod config;
pub mod error;
pub mod git;
pub mod llm;
pub mod logging;

// Re-export commonly used types
pub use commit::{DiffBundle, DiffOptions, NormalizeRequest, normalize_commit};
pub use config::Settings;
pub use error::{CommitError, ConfigError, DiffError, NormalizeError, StreamError, TransportError};
pub use llm::{NormalizedResult, Provider, ProviderConfig, StreamEvent};
