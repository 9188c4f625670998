//! Rule-based classification of working tree changes.
//!
//! Everything here is heuristic: the commit type comes from file statuses and
//! diff size, the scope from shared top-level directories, and breaking
//! changes from a keyword scan of the raw diff. The keyword scan flags
//! unrelated text (a comment saying "remove", a renamed `deprecated_` helper)
//! and that false-positive rate is accepted.

pub mod branch;

use std::path::{Component, Path};
use std::sync::LazyLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::history::CommitType;

pub use branch::{BranchAnalyzer, BranchContext, IssueContext, UNKNOWN_BRANCH_TYPE};

/// Keywords whose presence in a diff marks the change as breaking.
pub const BREAKING_KEYWORDS: [&str; 5] = [
    "breaking change",
    "remove",
    "deprecated",
    "major version",
    "incompatible",
];

/// Keywords in a modified filename that suggest a bug fix.
const FIX_FILENAME_KEYWORDS: [&str; 3] = ["bug", "fix", "error"];

fn build_globs(patterns: &[&str]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    builder.build()
}

#[allow(clippy::unwrap_used)] // Compile-time constant glob patterns
static TEST_PATHS: LazyLock<GlobSet> = LazyLock::new(|| build_globs(&["*test*", "*spec*"]).unwrap());

#[allow(clippy::unwrap_used)] // Compile-time constant glob patterns
static DOC_PATHS: LazyLock<GlobSet> = LazyLock::new(|| {
    build_globs(&["*.md", "*.rst", "*.txt", "*README*", "docs/*", "*/docs/*"]).unwrap()
});

/// Returns true when the path follows a test or spec naming convention.
pub fn is_test_path(path: &str) -> bool {
    TEST_PATHS.is_match(path)
}

/// Returns true when the path looks like documentation.
pub fn is_doc_path(path: &str) -> bool {
    DOC_PATHS.is_match(path)
}

/// Paths touched by one status snapshot, grouped by change kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeSet {
    /// Newly added paths.
    pub added: Vec<String>,
    /// Modified paths.
    pub modified: Vec<String>,
    /// Deleted paths.
    pub deleted: Vec<String>,
    /// Rename targets.
    pub renamed: Vec<String>,
}

impl FileChangeSet {
    /// Parses `git diff --name-status` style output.
    ///
    /// Each line is a status letter followed by tab-separated paths. Renames
    /// (`R100\told\tnew`) record the new path. Unknown statuses are skipped.
    pub fn from_name_status(output: &str) -> Self {
        let mut changes = Self::default();

        for line in output.lines() {
            let mut parts = line.split('\t');
            let (Some(status), Some(first)) = (parts.next(), parts.next()) else {
                continue;
            };
            let status = status.trim();

            match status.chars().next() {
                Some('A') => changes.added.push(first.to_string()),
                Some('M') => changes.modified.push(first.to_string()),
                Some('D') => changes.deleted.push(first.to_string()),
                Some('R') => changes
                    .renamed
                    .push(parts.next().unwrap_or(first).to_string()),
                _ => {}
            }
        }

        changes
    }

    /// Every changed path in added, modified, deleted, renamed order.
    pub fn all_paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .chain(&self.renamed)
            .map(String::as_str)
    }

    /// Total number of changed paths.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len() + self.renamed.len()
    }

    /// Whether no path changed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shared top-level directory of every changed path, if there is one.
    ///
    /// A file at the repository root has no directory segment, so its
    /// presence means there is no scope.
    pub fn scope(&self) -> Option<String> {
        let mut scope: Option<&str> = None;

        for path in self.all_paths() {
            let segment = top_level_dir(path)?;
            match scope {
                None => scope = Some(segment),
                Some(existing) if existing == segment => {}
                Some(_) => return None,
            }
        }

        scope.map(str::to_string)
    }
}

fn top_level_dir(path: &str) -> Option<&str> {
    let mut components = Path::new(path).components();
    let first = match components.next()? {
        Component::Normal(segment) => segment.to_str()?,
        _ => return None,
    };
    // a bare filename has no directory
    components.next()?;
    Some(first)
}

/// Line and marker counts derived from a unified diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffTally {
    /// Added lines, excluding `+++` headers.
    pub lines_added: usize,
    /// Removed lines, excluding `---` headers.
    pub lines_removed: usize,
    /// Number of `diff --git` sections.
    pub files_affected: usize,
    /// Whether any file in the diff follows a test naming convention.
    pub contains_tests: bool,
    /// Whether any file in the diff is documentation.
    pub contains_docs: bool,
}

impl DiffTally {
    /// Tallies a unified diff. Markers come from the file headers only.
    pub fn from_diff(diff: &str) -> Self {
        let mut tally = Self::default();

        for line in diff.lines() {
            if let Some(header) = line.strip_prefix("diff --git ") {
                tally.files_affected += 1;
                for path in header
                    .split_whitespace()
                    .filter_map(|p| p.strip_prefix("a/").or_else(|| p.strip_prefix("b/")))
                {
                    tally.contains_tests |= is_test_path(path);
                    tally.contains_docs |= is_doc_path(path);
                }
            } else if line.starts_with("+++") || line.starts_with("---") {
                continue;
            } else if line.starts_with('+') {
                tally.lines_added += 1;
            } else if line.starts_with('-') {
                tally.lines_removed += 1;
            }
        }

        tally
    }
}

/// Classifier output for one set of changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeClassification {
    /// Commit type.
    #[serde(rename = "type")]
    pub commit_type: CommitType,
    /// Shared top-level directory, if any.
    pub scope: Option<String>,
    /// Whether the diff mentions a breaking keyword.
    pub breaking: bool,
}

/// Picks a commit type; the first matching rule wins.
///
/// 1. only modifications, docs touched, no tests → `docs`
/// 2. every modified file is a test and tests are touched → `test`
/// 3. any added file → `feat`
/// 4. a modified filename mentions bug/fix/error → `fix`
/// 5. more than twice as many lines added as removed → `feat`, else `fix`
pub fn classify_type(changes: &FileChangeSet, tally: &DiffTally) -> CommitType {
    let only_modified = changes.added.is_empty()
        && changes.deleted.is_empty()
        && changes.renamed.is_empty()
        && !changes.modified.is_empty();
    if only_modified && tally.contains_docs && !tally.contains_tests {
        return CommitType::Docs;
    }

    if !changes.modified.is_empty()
        && tally.contains_tests
        && changes.modified.iter().all(|f| is_test_path(f))
    {
        return CommitType::Test;
    }

    if !changes.added.is_empty() {
        return CommitType::Feat;
    }

    let fix_named = changes.modified.iter().any(|f| {
        let lower = f.to_lowercase();
        FIX_FILENAME_KEYWORDS.iter().any(|k| lower.contains(k))
    });
    if fix_named {
        return CommitType::Fix;
    }

    if tally.lines_added > tally.lines_removed * 2 {
        CommitType::Feat
    } else {
        CommitType::Fix
    }
}

/// Scans diff text for any of [`BREAKING_KEYWORDS`], case-insensitively.
pub fn detect_breaking(diff: &str) -> bool {
    let lower = diff.to_lowercase();
    BREAKING_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Runs every classifier rule over one snapshot.
pub fn classify(changes: &FileChangeSet, tally: &DiffTally, diff: &str) -> ChangeClassification {
    ChangeClassification {
        commit_type: classify_type(changes, tally),
        scope: changes.scope(),
        breaking: detect_breaking(diff),
    }
}
