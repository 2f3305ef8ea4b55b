//! Git operations: staged-change queries and committing the index.

pub mod commit;
pub mod staged;

pub use commit::commit_staged;
pub use staged::{GitCli, StagedSource};
