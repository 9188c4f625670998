//! Release notes and changelog files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::config::FilesConfig;
use crate::version::SemVer;

/// Title written to a changelog created from scratch.
const CHANGELOG_TITLE: &str = "# Changelog";

/// Writes the files that accompany a release.
pub trait ReleaseFileWriter: Send + Sync {
    /// Replaces the release notes file; returns its path relative to the root.
    fn write_release_notes(&self, notes: &str) -> Result<PathBuf>;

    /// Adds a version section to the changelog; returns its path relative
    /// to the root.
    fn update_changelog(&self, version: SemVer, date: NaiveDate, entry: &str) -> Result<PathBuf>;
}

/// Inserts a `## [version] - date` section after the title and any
/// preamble, ahead of every existing version section.
pub fn insert_changelog_entry(
    existing: Option<&str>,
    version: SemVer,
    date: NaiveDate,
    entry: &str,
) -> String {
    let section = format!(
        "## [{version}] - {}\n\n{}\n",
        date.format("%Y-%m-%d"),
        entry.trim()
    );

    let Some(existing) = existing.filter(|text| !text.trim().is_empty()) else {
        return format!("{CHANGELOG_TITLE}\n\n{section}");
    };

    // title and preamble stay on top
    let mut offset = 0;
    let mut insert_at = existing.len();
    for line in existing.split_inclusive('\n') {
        if line.starts_with("## ") {
            insert_at = offset;
            break;
        }
        offset += line.len();
    }

    let (head, tail) = existing.split_at(insert_at);
    let mut updated = String::with_capacity(existing.len() + section.len() + 2);
    if !head.trim().is_empty() {
        updated.push_str(head.trim_end());
        updated.push_str("\n\n");
    }
    updated.push_str(&section);
    if !tail.is_empty() {
        updated.push('\n');
        updated.push_str(tail);
    }
    updated
}

/// Release files on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsReleaseFiles {
    root: PathBuf,
    files: FilesConfig,
}

impl FsReleaseFiles {
    /// Writes the configured files under `root`.
    pub fn new<P: AsRef<Path>>(root: P, files: FilesConfig) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            files,
        }
    }

    fn write(&self, relative: &Path, content: &str) -> Result<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }
}

impl ReleaseFileWriter for FsReleaseFiles {
    fn write_release_notes(&self, notes: &str) -> Result<PathBuf> {
        let relative = &self.files.release_notes;
        let mut content = notes.trim_end().to_string();
        content.push('\n');
        self.write(relative, &content)?;
        info!(path = %relative.display(), "Wrote release notes");
        Ok(relative.clone())
    }

    fn update_changelog(&self, version: SemVer, date: NaiveDate, entry: &str) -> Result<PathBuf> {
        let relative = &self.files.changelog;
        let path = self.root.join(relative);
        let existing = if path.exists() {
            Some(
                fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
            )
        } else {
            None
        };

        let updated = insert_changelog_entry(existing.as_deref(), version, date, entry);
        self.write(relative, &updated)?;
        info!(path = %relative.display(), %version, "Updated changelog");
        Ok(relative.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn creates_changelog_when_missing() {
        assert_eq!(
            insert_changelog_entry(None, SemVer::new(0, 1, 0), date(), "### Added\n\n- first\n"),
            "# Changelog\n\n## [0.1.0] - 2024-06-01\n\n### Added\n\n- first\n"
        );
    }

    #[test]
    fn inserts_before_existing_versions() {
        let existing = "# Changelog\n\n## [1.0.0] - 2024-01-01\n\n- old\n";
        let updated =
            insert_changelog_entry(Some(existing), SemVer::new(1, 1, 0), date(), "- new");
        assert_eq!(
            updated,
            "# Changelog\n\n## [1.1.0] - 2024-06-01\n\n- new\n\n## [1.0.0] - 2024-01-01\n\n- old\n"
        );
    }

    #[test]
    fn keeps_preamble_after_title() {
        let existing = "# Changelog\nAll notable changes.\n\n## [1.0.0] - 2024-01-01\n- old\n";
        let updated =
            insert_changelog_entry(Some(existing), SemVer::new(2, 0, 0), date(), "- new");
        assert_eq!(
            updated,
            "# Changelog\nAll notable changes.\n\n## [2.0.0] - 2024-06-01\n\n- new\n\n## [1.0.0] - 2024-01-01\n- old\n"
        );
    }

    #[test]
    fn title_only_changelog() {
        let updated = insert_changelog_entry(Some("# Changelog\n"), SemVer::new(0, 2, 0), date(), "- x");
        assert_eq!(updated, "# Changelog\n\n## [0.2.0] - 2024-06-01\n\n- x\n");
    }

    #[test]
    fn untitled_changelog_starts_with_new_section() {
        let updated = insert_changelog_entry(
            Some("## [0.1.0] - 2024-01-01\n- old\n"),
            SemVer::new(0, 1, 1),
            date(),
            "- fix",
        );
        assert_eq!(
            updated,
            "## [0.1.1] - 2024-06-01\n\n- fix\n\n## [0.1.0] - 2024-01-01\n- old\n"
        );
    }

    #[test]
    fn writes_both_files() -> Result<()> {
        let dir = TempDir::new()?;
        let files = FsReleaseFiles::new(dir.path(), FilesConfig::default());

        let notes = files.write_release_notes("## What's New\n\n- a")?;
        assert_eq!(notes, PathBuf::from("release-notes.md"));
        assert_eq!(
            fs::read_to_string(dir.path().join("release-notes.md"))?,
            "## What's New\n\n- a\n"
        );

        // release notes are replaced, not appended
        files.write_release_notes("second")?;
        assert_eq!(fs::read_to_string(dir.path().join("release-notes.md"))?, "second\n");

        files.update_changelog(SemVer::new(1, 0, 0), date(), "- a")?;
        files.update_changelog(SemVer::new(1, 0, 1), date(), "- b")?;
        let changelog = fs::read_to_string(dir.path().join("CHANGELOG.md"))?;
        assert!(changelog.starts_with("# Changelog\n\n## [1.0.1]"));
        assert!(changelog.find("[1.0.1]") < changelog.find("[1.0.0]"));
        Ok(())
    }
}
