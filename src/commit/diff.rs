//! Staged diff aggregation bounded by a character budget.

use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::DiffError;
use crate::git::{GitCli, StagedSource};

/// Default budget for the assembled diff text, in characters.
pub const DEFAULT_MAX_DIFF_CHARS: usize = 10_000;

/// Marker git prints instead of a patch for binary content.
const BINARY_MARKER: &str = "Binary files ";

/// Path suffixes excluded before any diff is fetched.
pub const DEFAULT_IGNORED_SUFFIXES: &[&str] = &[
    // lock files
    ".lock",
    "-lock.json",
    "-lock.yaml",
    ".lockb",
    // images
    ".png",
    ".jpg",
    ".jpeg",
    ".gif",
    ".bmp",
    ".ico",
    ".webp",
    // archives
    ".zip",
    ".tar",
    ".gz",
    ".tgz",
    ".bz2",
    ".xz",
    ".7z",
    ".rar",
    ".jar",
    // compiled artifacts
    ".class",
    ".pyc",
    ".o",
    ".a",
    ".so",
    ".dll",
    ".dylib",
    ".exe",
    ".wasm",
    // fonts and documents
    ".woff",
    ".woff2",
    ".ttf",
    ".otf",
    ".eot",
    ".pdf",
];

/// One-line description used when a file's diff cannot be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFallback {
    Modified,
    Added,
    Deleted,
    Unknown,
}

impl StatusFallback {
    /// Map an index-column porcelain status character.
    pub fn from_porcelain(status: Option<char>) -> Self {
        match status {
            Some('M') => StatusFallback::Modified,
            Some('A') => StatusFallback::Added,
            Some('D') => StatusFallback::Deleted,
            _ => StatusFallback::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFallback::Modified => "modified",
            StatusFallback::Added => "added",
            StatusFallback::Deleted => "deleted",
            StatusFallback::Unknown => "unknown status",
        }
    }
}

impl fmt::Display for StatusFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diff body of a staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffText {
    Patch(String),
    Status(StatusFallback),
}

impl DiffText {
    pub fn as_str(&self) -> &str {
        match self {
            DiffText::Patch(text) => text,
            DiffText::Status(status) => status.as_str(),
        }
    }
}

/// A single staged file and its diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChange {
    path: String,
    diff: DiffText,
}

impl StagedChange {
    pub fn new(path: impl Into<String>, diff: DiffText) -> Self {
        Self {
            path: path.into(),
            diff,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn diff(&self) -> &DiffText {
        &self.diff
    }

    /// Entry text: `"<path>:\n<diff>"`.
    pub fn render(&self) -> String {
        format!("{}:\n{}", self.path, self.diff.as_str())
    }

    /// Budget cost of [`render`](Self::render), in characters.
    pub fn char_len(&self) -> usize {
        self.path.chars().count() + 2 + self.diff.as_str().chars().count()
    }
}

/// Staged changes ready for the prompt. Either every entry or only a file
/// list, never a mix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffBundle {
    Detailed(Vec<StagedChange>),
    Summary { files: Vec<String>, budget: usize },
}

impl DiffBundle {
    pub fn render(&self) -> String {
        match self {
            DiffBundle::Detailed(entries) => entries
                .iter()
                .map(StagedChange::render)
                .collect::<Vec<_>>()
                .join("\n"),
            DiffBundle::Summary { files, budget } => {
                let mut text = format!(
                    "Total staged changes exceed {} characters. Modified files list:",
                    budget
                );
                for file in files {
                    text.push_str("\n- ");
                    text.push_str(file);
                }
                text
            }
        }
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, DiffBundle::Summary { .. })
    }
}

impl fmt::Display for DiffBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Limits applied while aggregating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    pub max_chars: usize,
    pub ignored_suffixes: Vec<String>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_DIFF_CHARS,
            ignored_suffixes: DEFAULT_IGNORED_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl DiffOptions {
    /// Case-sensitive suffix match against the ignore set.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignored_suffixes
            .iter()
            .any(|suffix| !suffix.is_empty() && path.ends_with(suffix.as_str()))
    }
}

/// Build a [`DiffBundle`] from a staged-change source.
///
/// Returns `Ok(None)` when nothing is left to describe after ignored and
/// binary files are dropped. A file whose diff cannot be fetched is reported
/// by its porcelain status instead.
pub fn aggregate<S>(source: &S, options: &DiffOptions) -> Result<Option<DiffBundle>, DiffError>
where
    S: StagedSource + ?Sized,
{
    let listed = source.staged_paths()?;
    debug!("Staged files: {:?}", listed);

    let candidates: Vec<&String> = listed.iter().filter(|p| !options.is_ignored(p)).collect();
    if candidates.is_empty() {
        debug!("No staged files left after filtering ignored suffixes");
        return Ok(None);
    }

    let mut entries = Vec::with_capacity(candidates.len());
    let mut total = 0usize;

    for path in candidates {
        let diff = match source.file_diff(path) {
            Ok(text) if text.contains(BINARY_MARKER) => {
                debug!("Skipping binary file: {}", path);
                continue;
            }
            Ok(text) => DiffText::Patch(text),
            Err(e) => {
                warn!("Failed to get diff for {}: {}", path, e);
                DiffText::Status(StatusFallback::from_porcelain(source.porcelain_status(path)))
            }
        };

        let change = StagedChange::new(path.as_str(), diff);
        let len = change.char_len();
        if total + len > options.max_chars {
            info!(
                "Staged changes exceed {} characters, sending the file list only",
                options.max_chars
            );
            return Ok(Some(DiffBundle::Summary {
                files: listed.clone(),
                budget: options.max_chars,
            }));
        }

        total += len;
        entries.push(change);
    }

    if entries.is_empty() {
        debug!("Only binary files are staged");
        return Ok(None);
    }

    debug!("Collected {} staged diffs ({} chars)", entries.len(), total);
    Ok(Some(DiffBundle::Detailed(entries)))
}

/// Aggregate the staged changes of the repository at `repo_path`.
pub fn collect_staged_diff(
    repo_path: &Path,
    options: &DiffOptions,
) -> Result<Option<DiffBundle>, DiffError> {
    let git = GitCli::open(repo_path)?;
    aggregate(&git, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::staged::MockStagedSource;

    fn options(max_chars: usize) -> DiffOptions {
        DiffOptions {
            max_chars,
            ..DiffOptions::default()
        }
    }

    fn source(paths: &[&str]) -> MockStagedSource {
        let listed: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        let mut mock = MockStagedSource::new();
        mock.expect_staged_paths()
            .returning(move || Ok(listed.clone()));
        mock
    }

    #[test]
    fn test_text_and_binary_under_budget() {
        let mut mock = source(&["a.txt", "b.bin"]);
        mock.expect_file_diff().returning(|path| match path {
            "a.txt" => Ok("+hello".to_string()),
            _ => Ok("Binary files /dev/null and b/b.bin differ".to_string()),
        });

        let bundle = aggregate(&mock, &options(1000)).unwrap().unwrap();
        assert_eq!(
            bundle,
            DiffBundle::Detailed(vec![StagedChange::new(
                "a.txt",
                DiffText::Patch("+hello".to_string())
            )])
        );
        assert_eq!(bundle.render(), "a.txt:\n+hello");
    }

    #[test]
    fn test_over_budget_switches_to_summary_of_all_listed_files() {
        let mut mock = source(&["x.rs", "y.rs", "Cargo.lock"]);
        let body = "+".repeat(600);
        mock.expect_file_diff()
            .returning(move |_| Ok(body.clone()));

        let bundle = aggregate(&mock, &options(1000)).unwrap().unwrap();
        assert!(bundle.is_summary());
        assert_eq!(
            bundle.render(),
            "Total staged changes exceed 1000 characters. Modified files list:\n\
             - x.rs\n- y.rs\n- Cargo.lock"
        );
    }

    #[test]
    fn test_exact_budget_stays_detailed() {
        let mut mock = source(&["a"]);
        // "a:\n" + 7 chars = 10
        mock.expect_file_diff()
            .returning(|_| Ok("1234567".to_string()));
        let bundle = aggregate(&mock, &options(10)).unwrap().unwrap();
        assert!(!bundle.is_summary());
    }

    #[test]
    fn test_budget_counts_characters_not_bytes() {
        let mut mock = source(&["a"]);
        mock.expect_file_diff()
            .returning(|_| Ok("提交信息".to_string()));
        // 3 + 4 chars, 15 bytes
        let bundle = aggregate(&mock, &options(7)).unwrap().unwrap();
        assert!(!bundle.is_summary());
    }

    #[test]
    fn test_diff_failure_falls_back_to_status() {
        let mut mock = source(&["gone.txt", "odd.txt", "new.txt"]);
        mock.expect_file_diff().returning(|path| {
            Err(DiffError::Command {
                operation: "diff".to_string(),
                reason: format!("cannot read {}", path),
            })
        });
        mock.expect_porcelain_status().returning(|path| match path {
            "gone.txt" => Some('D'),
            "new.txt" => Some('A'),
            _ => None,
        });

        let bundle = aggregate(&mock, &options(1000)).unwrap().unwrap();
        assert_eq!(bundle.render(), "gone.txt:\ndeleted\nodd.txt:\nunknown status\nnew.txt:\nadded");
    }

    #[test]
    fn test_only_ignored_files_yields_none() {
        let mock = source(&["Cargo.lock", "logo.png"]);
        assert!(aggregate(&mock, &options(1000)).unwrap().is_none());
    }

    #[test]
    fn test_only_binary_files_yields_none() {
        let mut mock = source(&["blob.dat"]);
        mock.expect_file_diff()
            .returning(|_| Ok("Binary files a/blob.dat and b/blob.dat differ".to_string()));
        assert!(aggregate(&mock, &options(1000)).unwrap().is_none());
    }

    #[test]
    fn test_listing_failure_propagates() {
        let mut mock = MockStagedSource::new();
        mock.expect_staged_paths().returning(|| {
            Err(DiffError::RepoAccess {
                path: "/repo".into(),
                reason: "not a git repository".to_string(),
            })
        });
        assert!(matches!(
            aggregate(&mock, &options(1000)),
            Err(DiffError::RepoAccess { .. })
        ));
    }

    #[test]
    fn test_ignore_match_is_case_sensitive_suffix() {
        let opts = DiffOptions::default();
        assert!(opts.is_ignored("web/package-lock.json"));
        assert!(opts.is_ignored("assets/logo.png"));
        assert!(!opts.is_ignored("assets/LOGO.PNG"));
        assert!(!opts.is_ignored("src/png.rs"));
        assert!(!opts.is_ignored("lib/data"));
    }

    #[test]
    fn test_status_fallback_strings() {
        assert_eq!(StatusFallback::from_porcelain(Some('M')).as_str(), "modified");
        assert_eq!(StatusFallback::from_porcelain(Some('R')).as_str(), "unknown status");
        assert_eq!(StatusFallback::from_porcelain(None), StatusFallback::Unknown);
    }
}
