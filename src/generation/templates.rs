//! Deterministic text for every generation task.
//!
//! Output depends only on the task inputs, so two runs over the same
//! history produce byte-identical text.

use futures::future::BoxFuture;

use crate::history::{ChangeSummary, CommitRecord, CommitType, HistoryAnalysis};

use super::{conventional_prefix, BackendError, CommitMessageInput, ContentGenerator, GenerationTask};

/// Renders tasks from fixed templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    /// Renders the fallback text for a task.
    pub fn render(&self, task: &GenerationTask<'_>) -> String {
        match task {
            GenerationTask::CommitMessage(input) => commit_message(input),
            GenerationTask::ReleaseNotes(history) => release_notes(history),
            GenerationTask::ChangelogEntry { history, .. } => changelog_entry(history),
            GenerationTask::CommitSummary(commits) => commit_summary(commits),
            GenerationTask::VersionBump(summary) => version_bump(summary),
        }
    }
}

impl ContentGenerator for TemplateGenerator {
    fn generate<'a>(
        &'a self,
        task: &'a GenerationTask<'a>,
    ) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(async move { Ok(self.render(task)) })
    }

    fn name(&self) -> &str {
        "template"
    }
}

fn counted(n: usize, singular: &str, plural: &str) -> String {
    format!("{n} {}", if n == 1 { singular } else { plural })
}

fn commit_message(input: &CommitMessageInput<'_>) -> String {
    let changes = input.changes;
    let mut parts = Vec::new();

    if !changes.added.is_empty() {
        parts.push(format!("add {}", counted(changes.added.len(), "new file", "new files")));
    }
    if !changes.modified.is_empty() {
        parts.push(format!("update {}", counted(changes.modified.len(), "file", "files")));
    }
    if !changes.deleted.is_empty() {
        parts.push(format!("remove {}", counted(changes.deleted.len(), "file", "files")));
    }
    if !changes.renamed.is_empty() {
        parts.push(format!("rename {}", counted(changes.renamed.len(), "file", "files")));
    }

    let description = if parts.is_empty() {
        "update code".to_string()
    } else {
        parts.join(", ")
    };

    format!("{}: {description}", conventional_prefix(input.classification))
}

/// One bullet line for a commit, with its scope in bold.
fn bullet(commit: &CommitRecord) -> String {
    match &commit.scope {
        Some(scope) => format!("- **{scope}:** {}", commit.description),
        None => format!("- {}", commit.description),
    }
}

fn section<'a>(title: &str, commits: impl IntoIterator<Item = &'a CommitRecord>, with_id: bool) -> Option<String> {
    let mut body = String::new();
    for commit in commits {
        body.push_str(&bullet(commit));
        if with_id && !commit.id.is_empty() {
            body.push_str(&format!(" ({})", commit.short_id()));
        }
        body.push('\n');
    }
    (!body.is_empty()).then(|| format!("### {title}\n\n{body}"))
}

fn of_type<'a>(history: &'a HistoryAnalysis, commit_type: CommitType) -> impl Iterator<Item = &'a CommitRecord> {
    history
        .categorized
        .get(&commit_type)
        .into_iter()
        .flatten()
}

fn release_notes(history: &HistoryAnalysis) -> String {
    let summary = &history.summary;
    let sections: Vec<String> = [
        section(
            "⚠️ Breaking Changes",
            history.commits.iter().filter(|c| c.breaking),
            false,
        ),
        section(
            "✨ New Features",
            of_type(history, CommitType::Feat).filter(|c| !c.breaking),
            false,
        ),
        section(
            "🐛 Bug Fixes",
            of_type(history, CommitType::Fix).filter(|c| !c.breaking),
            false,
        ),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut notes = String::from("## What's New\n\n");
    for s in &sections {
        notes.push_str(s);
        notes.push('\n');
    }
    notes.push_str(&format!(
        "This release includes {} from {}.\n",
        counted(summary.total_commits, "commit", "commits"),
        counted(summary.contributors.len(), "contributor", "contributors"),
    ));
    notes
}

fn changelog_entry(history: &HistoryAnalysis) -> String {
    let non_breaking = |types: &'static [CommitType]| {
        history
            .commits
            .iter()
            .filter(move |c| !c.breaking && types.contains(&c.commit_type))
    };

    let sections: Vec<String> = [
        section("Breaking Changes", history.commits.iter().filter(|c| c.breaking), true),
        section("Added", non_breaking(&[CommitType::Feat]), true),
        section("Fixed", non_breaking(&[CommitType::Fix]), true),
        section("Changed", non_breaking(&[CommitType::Refactor, CommitType::Perf]), true),
        section(
            "Maintenance",
            non_breaking(&[
                CommitType::Docs,
                CommitType::Style,
                CommitType::Test,
                CommitType::Chore,
                CommitType::Ci,
                CommitType::Build,
            ]),
            true,
        ),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sections.is_empty() {
        return "### Changed\n\n- No notable changes.\n".to_string();
    }
    sections.join("\n")
}

fn commit_summary(commits: &[CommitRecord]) -> String {
    if commits.is_empty() {
        return "No significant changes in this release.".to_string();
    }

    let count = |t: CommitType| commits.iter().filter(|c| c.commit_type == t).count();
    let mut highlights = Vec::new();
    let features = count(CommitType::Feat);
    if features > 0 {
        highlights.push(counted(features, "new feature", "new features"));
    }
    let fixes = count(CommitType::Fix);
    if fixes > 0 {
        highlights.push(counted(fixes, "bug fix", "bug fixes"));
    }
    let docs = count(CommitType::Docs);
    if docs > 0 {
        highlights.push(counted(docs, "documentation update", "documentation updates"));
    }

    let detail = if highlights.is_empty() {
        "various improvements and updates".to_string()
    } else {
        highlights.join(", ")
    };
    format!(
        "This release includes {} with {detail}.",
        counted(commits.len(), "commit", "commits")
    )
}

fn version_bump(summary: &ChangeSummary) -> String {
    summary.suggested_bump.to_string()
}
