//! Commit message normalization from staged changes.

pub mod diff;
pub mod normalize;
pub mod prompt;

pub use diff::{
    DEFAULT_IGNORED_SUFFIXES, DEFAULT_MAX_DIFF_CHARS, DiffBundle, DiffOptions, DiffText,
    StagedChange, StatusFallback, aggregate, collect_staged_diff,
};
pub use normalize::{NormalizeRequest, normalize_commit, normalize_staged};
pub use prompt::{DEFAULT_PROMPT_TEMPLATE, assemble_prompt};
