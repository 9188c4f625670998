//! Version control seams used by the workflows.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// A tag and when it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    /// Tag name, e.g. `v1.2.0`.
    pub name: String,
    /// Tagger date for annotated tags, commit date for lightweight ones.
    pub date: DateTime<FixedOffset>,
}

/// Read-only repository queries.
pub trait VcsReader: Send + Sync {
    /// Raw log entries reachable from HEAD but not from `last_tag`, newest
    /// first, merges excluded. Each entry is formatted with
    /// [`crate::history::format_log_entry`].
    fn log_since(&self, last_tag: Option<&str>) -> Result<Vec<String>>;

    /// Name of the checked-out branch.
    fn current_branch_name(&self) -> Result<String>;

    /// `name-status` style listing of changes against HEAD. With
    /// `staged_only` only the index is considered; otherwise unstaged and
    /// untracked files are included too.
    fn status_summary(&self, staged_only: bool) -> Result<String>;

    /// Unified diff of the same changes as [`status_summary`](Self::status_summary).
    fn diff_text(&self, staged_only: bool) -> Result<String>;

    /// The most recent tag reachable from HEAD.
    fn last_tag(&self) -> Result<Option<String>>;

    /// Every tag in the repository with its creation date, newest first.
    fn tags_with_dates(&self) -> Result<Vec<TagRecord>>;
}

/// Repository mutations.
pub trait VcsWriter: Send + Sync {
    /// Stages the given paths, relative to the repository root. Paths that
    /// no longer exist are staged as deletions.
    fn stage_files(&self, paths: &[PathBuf]) -> Result<()>;

    /// Stages every change in the working tree, including untracked files.
    fn stage_all(&self) -> Result<()>;

    /// Commits the index on top of HEAD and returns the new commit id.
    fn commit(&self, message: &str) -> Result<String>;

    /// Creates an annotated tag pointing at HEAD.
    fn create_annotated_tag(&self, name: &str, message: &str) -> Result<()>;
}
