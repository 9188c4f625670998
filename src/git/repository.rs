//! Git repository operations

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use git2::{
    Commit, Delta, DescribeFormatOptions, DescribeOptions, Diff, DiffFindOptions, DiffFormat,
    DiffOptions, ErrorCode, IndexAddOption, ObjectType, Repository, Sort, Tree,
};
use tracing::debug;

use crate::history::format_log_entry;
use crate::vcs::{TagRecord, VcsReader, VcsWriter};

/// Git repository wrapper
///
/// libgit2 handles are not `Sync`, so the repository sits behind a mutex
/// and can be shared between pipeline stages.
pub struct GitRepository {
    repo: Mutex<Repository>,
    root: PathBuf,
}

impl GitRepository {
    /// Open the repository containing the current directory
    pub fn open() -> Result<Self> {
        let repo = Repository::discover(".").context("Not in a git repository")?;
        Self::from_repository(repo)
    }

    /// Open repository at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::open(path).context("Failed to open git repository")?;
        Self::from_repository(repo)
    }

    fn from_repository(repo: Repository) -> Result<Self> {
        let root = repo
            .workdir()
            .context("Bare repositories are not supported")?
            .to_path_buf();
        Ok(Self {
            repo: Mutex::new(repo),
            root,
        })
    }

    /// Working tree root
    pub fn workdir(&self) -> &Path {
        &self.root
    }

    fn repo(&self) -> Result<MutexGuard<'_, Repository>> {
        self.repo
            .lock()
            .map_err(|_| anyhow!("Git repository lock poisoned"))
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

fn is_unborn(error: &git2::Error) -> bool {
    matches!(error.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

/// HEAD's commit, or `None` before the first commit
fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(
            head.peel_to_commit()
                .context("Failed to peel HEAD to commit")?,
        )),
        Err(e) if is_unborn(&e) => Ok(None),
        Err(e) => Err(e).context("Failed to get HEAD reference"),
    }
}

fn head_tree(repo: &Repository) -> Result<Option<Tree<'_>>> {
    head_commit(repo)?
        .map(|c| c.tree().context("Failed to get HEAD tree"))
        .transpose()
}

/// Diff of HEAD against the index, or against the working tree when
/// `staged_only` is false
fn working_diff(repo: &Repository, staged_only: bool) -> Result<Diff<'_>> {
    let tree = head_tree(repo)?;

    let mut opts = DiffOptions::new();
    let mut diff = if staged_only {
        repo.diff_tree_to_index(tree.as_ref(), None, Some(&mut opts))
            .context("Failed to diff HEAD against the index")?
    } else {
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .show_untracked_content(true);
        repo.diff_tree_to_workdir_with_index(tree.as_ref(), Some(&mut opts))
            .context("Failed to diff HEAD against the working tree")?
    };

    let mut find = DiffFindOptions::new();
    find.renames(true);
    diff.find_similar(Some(&mut find))
        .context("Failed to detect renames")?;

    Ok(diff)
}

/// Converts a git timestamp, keeping its UTC offset
fn commit_time(time: git2::Time) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60).unwrap_or_else(|| Utc.fix());
    DateTime::from_timestamp(time.seconds(), 0)
        .unwrap_or_default()
        .with_timezone(&offset)
}

fn path_str(path: Option<&Path>) -> Option<String> {
    path.map(|p| p.to_string_lossy().into_owned())
}

impl VcsReader for GitRepository {
    fn log_since(&self, last_tag: Option<&str>) -> Result<Vec<String>> {
        let repo = self.repo()?;
        if head_commit(&repo)?.is_none() {
            return Ok(Vec::new());
        }

        let mut walker = repo.revwalk().context("Failed to create revwalk")?;
        walker
            .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .context("Failed to sort revwalk")?;
        walker.push_head().context("Failed to push HEAD")?;

        if let Some(tag) = last_tag {
            let tagged = repo
                .revparse_single(tag)
                .and_then(|obj| obj.peel_to_commit())
                .with_context(|| format!("Failed to resolve tag: {tag}"))?;
            walker
                .hide(tagged.id())
                .context("Failed to hide tagged history")?;
        }

        let mut entries = Vec::new();
        for oid in walker {
            let oid = oid.context("Failed to get commit OID from walker")?;
            let commit = repo.find_commit(oid).context("Failed to find commit")?;

            // Skip merge commits
            if commit.parent_count() > 1 {
                continue;
            }

            let author = commit.author();
            let identity = format!(
                "{} <{}>",
                author.name().unwrap_or("unknown"),
                author.email().unwrap_or_default()
            );
            entries.push(format_log_entry(
                &oid.to_string(),
                &identity,
                &commit_time(author.when()),
                commit.summary().unwrap_or_default(),
                commit.body().unwrap_or_default(),
            ));
        }

        debug!(count = entries.len(), since = ?last_tag, "Read commit log");
        Ok(entries)
    }

    fn current_branch_name(&self) -> Result<String> {
        let repo = self.repo()?;
        let head = repo.head().context("Failed to get HEAD reference")?;

        if let Some(name) = head.shorthand() {
            if name != "HEAD" {
                return Ok(name.to_string());
            }
        }

        anyhow::bail!("Repository is in detached HEAD state")
    }

    fn status_summary(&self, staged_only: bool) -> Result<String> {
        let repo = self.repo()?;
        let diff = working_diff(&repo, staged_only)?;

        let mut summary = String::new();
        for delta in diff.deltas() {
            let line = match delta.status() {
                Delta::Added | Delta::Untracked | Delta::Copied => {
                    path_str(delta.new_file().path()).map(|p| format!("A\t{p}"))
                }
                Delta::Modified | Delta::Typechange => {
                    path_str(delta.new_file().path()).map(|p| format!("M\t{p}"))
                }
                Delta::Deleted => path_str(delta.old_file().path()).map(|p| format!("D\t{p}")),
                Delta::Renamed => path_str(delta.old_file().path())
                    .zip(path_str(delta.new_file().path()))
                    .map(|(old, new)| format!("R\t{old}\t{new}")),
                _ => None,
            };
            if let Some(line) = line {
                summary.push_str(&line);
                summary.push('\n');
            }
        }

        Ok(summary)
    }

    fn diff_text(&self, staged_only: bool) -> Result<String> {
        let repo = self.repo()?;
        let diff = working_diff(&repo, staged_only)?;

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            let content = String::from_utf8_lossy(line.content());
            match line.origin() {
                origin @ ('+' | '-' | ' ') => {
                    text.push(origin);
                    text.push_str(&content);
                }
                _ => text.push_str(&content),
            }
            true
        })
        .context("Failed to format diff")?;

        Ok(text)
    }

    fn last_tag(&self) -> Result<Option<String>> {
        let repo = self.repo()?;

        let mut opts = DescribeOptions::new();
        opts.describe_tags();
        let describe = match repo.describe(&opts) {
            Ok(describe) => describe,
            Err(e) => {
                debug!("No reachable tag: {e}");
                return Ok(None);
            }
        };

        let mut format = DescribeFormatOptions::new();
        format.abbreviated_size(0);
        let tag = describe
            .format(Some(&format))
            .context("Failed to format tag description")?;
        Ok(Some(tag))
    }

    fn tags_with_dates(&self) -> Result<Vec<TagRecord>> {
        let repo = self.repo()?;
        let names = repo.tag_names(None).context("Failed to list tags")?;

        let mut tags = Vec::new();
        for name in names.iter().flatten() {
            let object = repo
                .revparse_single(&format!("refs/tags/{name}"))
                .with_context(|| format!("Failed to resolve tag: {name}"))?;

            let tagger_time = object
                .as_tag()
                .and_then(|tag| tag.tagger().map(|tagger| tagger.when()));
            let time = match tagger_time {
                Some(time) => time,
                None => match object.peel_to_commit() {
                    Ok(commit) => commit.committer().when(),
                    Err(e) => {
                        debug!(tag = name, "Skipping tag without a commit: {e}");
                        continue;
                    }
                },
            };

            tags.push(TagRecord {
                name: name.to_string(),
                date: commit_time(time),
            });
        }

        tags.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.name.cmp(&a.name)));
        debug!(count = tags.len(), "Read tags");
        Ok(tags)
    }
}

impl VcsWriter for GitRepository {
    fn stage_files(&self, paths: &[PathBuf]) -> Result<()> {
        let repo = self.repo()?;
        let mut index = repo.index().context("Failed to open index")?;

        for path in paths {
            let relative = self.relative(path);
            if self.root.join(relative).exists() {
                index
                    .add_path(relative)
                    .with_context(|| format!("Failed to stage {}", relative.display()))?;
            } else {
                index
                    .remove_path(relative)
                    .with_context(|| format!("Failed to stage removal of {}", relative.display()))?;
            }
        }

        index.write().context("Failed to write index")
    }

    fn stage_all(&self) -> Result<()> {
        let repo = self.repo()?;
        let mut index = repo.index().context("Failed to open index")?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .context("Failed to stage working tree")?;
        index
            .update_all(["*"].iter(), None)
            .context("Failed to stage removed files")?;
        index.write().context("Failed to write index")
    }

    fn commit(&self, message: &str) -> Result<String> {
        let repo = self.repo()?;
        let mut index = repo.index().context("Failed to open index")?;
        let tree_id = index.write_tree().context("Failed to write tree")?;
        let tree = repo.find_tree(tree_id).context("Failed to find tree")?;
        let signature = repo
            .signature()
            .context("Failed to determine committer; set user.name and user.email")?;

        let parent = head_commit(&repo)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();

        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .context("Failed to create commit")?;
        Ok(oid.to_string())
    }

    fn create_annotated_tag(&self, name: &str, message: &str) -> Result<()> {
        let repo = self.repo()?;
        let target = repo
            .head()
            .and_then(|head| head.peel(ObjectType::Commit))
            .context("Failed to resolve HEAD for tagging")?;
        let signature = repo
            .signature()
            .context("Failed to determine tagger; set user.name and user.email")?;

        repo.tag(name, &target, &signature, message, false)
            .with_context(|| format!("Failed to create tag {name}"))?;
        Ok(())
    }
}
