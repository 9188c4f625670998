//! Prompt construction for each generation task.

use std::fmt::Write;

use crate::history::{ChangeSummary, CommitRecord, HistoryAnalysis};
use crate::version::SemVer;

use super::{CommitMessageInput, GenerationTask};

/// Most modified files listed in a commit message prompt.
const MAX_PROMPT_FILES: usize = 10;

/// Most commits listed in a release notes prompt.
const MAX_RELEASE_NOTES_COMMITS: usize = 10;

/// Most commits listed in a summary prompt.
const MAX_SUMMARY_COMMITS: usize = 15;

const COMMIT_MESSAGE_RULES: &str = "\
Requirements:
1. Description should be clear and concise (max 50 characters)
2. Use imperative mood (\"add\" not \"added\" or \"adds\")
3. Don't capitalize first letter of description
4. Don't end with period
5. Focus on WHAT changed, not HOW

Example: \"feat(auth): add user authentication middleware\"

Only return the commit message, nothing else.
";

const RELEASE_NOTES_RULES: &str = "
Generate release notes that:
1. Start with a brief overview of this release
2. Group changes by user impact (New Features, Improvements, Bug Fixes, Breaking Changes)
3. Use clear, benefit-focused language
4. Include migration notes for breaking changes
5. Keep technical jargon to a minimum

Format as clean Markdown. Do not include version numbers or dates.
";

const CHANGELOG_RULES: &str = "
Generate a changelog entry that:
1. Uses conventional changelog format (Added, Changed, Deprecated, Removed, Fixed, Security)
2. Groups related changes together
3. Is precise and technical
4. Lists breaking changes prominently
5. Uses past tense and complete sentences

Format as clean Markdown without version header.
";

/// Builds the backend prompt for a task.
pub fn build_prompt(task: &GenerationTask<'_>) -> String {
    match task {
        GenerationTask::CommitMessage(input) => commit_message_prompt(input),
        GenerationTask::ReleaseNotes(history) => release_notes_prompt(history),
        GenerationTask::ChangelogEntry { history, version } => changelog_prompt(history, *version),
        GenerationTask::CommitSummary(commits) => summary_prompt(commits),
        GenerationTask::VersionBump(summary) => version_bump_prompt(summary),
    }
}

fn commit_message_prompt(input: &CommitMessageInput<'_>) -> String {
    let CommitMessageInput {
        branch_name,
        branch,
        changes,
        tally,
        classification,
    } = input;

    let scope = classification.scope.as_deref().unwrap_or("general");
    let description = if branch.description.is_empty() {
        "No description"
    } else {
        branch.description.as_str()
    };

    let mut prompt = String::from("Generate a conventional commit message for these code changes.\n\n");

    let _ = writeln!(prompt, "Branch Context:");
    let _ = writeln!(prompt, "- Branch: {branch_name}");
    let _ = writeln!(prompt, "- Type: {}", branch.branch_type);
    let _ = writeln!(prompt, "- Description: {description}");
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "Changes Summary:");
    let _ = writeln!(prompt, "- Files added: {}", changes.added.len());
    let _ = writeln!(prompt, "- Files modified: {}", changes.modified.len());
    let _ = writeln!(prompt, "- Files deleted: {}", changes.deleted.len());
    let _ = writeln!(prompt, "- Files renamed: {}", changes.renamed.len());
    let _ = writeln!(prompt, "- Lines added: {}", tally.lines_added);
    let _ = writeln!(prompt, "- Lines removed: {}", tally.lines_removed);
    let _ = writeln!(prompt, "- Contains tests: {}", tally.contains_tests);
    let _ = writeln!(prompt, "- Contains docs: {}", tally.contains_docs);
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "Modified Files:");
    for file in changes.modified.iter().take(MAX_PROMPT_FILES) {
        let _ = writeln!(prompt, "- {file}");
    }
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "Commit Type: {}", classification.commit_type);
    let _ = writeln!(prompt, "Scope: {scope}");
    let _ = writeln!(prompt, "Breaking Change: {}", classification.breaking);
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "Generate a commit message following this format:");
    let _ = writeln!(prompt, "{}({scope}): <description>", classification.commit_type);
    let _ = writeln!(prompt);
    prompt.push_str(COMMIT_MESSAGE_RULES);

    prompt
}

fn release_notes_prompt(history: &HistoryAnalysis) -> String {
    let summary = &history.summary;
    let mut prompt = String::from(
        "You are a technical writer creating user-facing release notes for this project.\n\n\
         Context:\n\
         - Users are developers who want to understand what's new and how it affects them\n\
         - Focus on benefits and user impact, not implementation details\n\n",
    );

    let _ = writeln!(prompt, "Commit Analysis:");
    let _ = writeln!(prompt, "- Total commits: {}", summary.total_commits);
    let _ = writeln!(prompt, "- Features: {}", summary.features);
    let _ = writeln!(prompt, "- Bug fixes: {}", summary.fixes);
    let _ = writeln!(prompt, "- Breaking changes: {}", summary.breaking_changes);
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "Recent commits:");
    for commit in history.commits.iter().take(MAX_RELEASE_NOTES_COMMITS) {
        let _ = writeln!(prompt, "- [{}] {}", commit.commit_type, commit.message);
    }
    prompt.push_str(RELEASE_NOTES_RULES);

    prompt
}

fn changelog_prompt(history: &HistoryAnalysis, version: SemVer) -> String {
    let mut prompt = format!(
        "You are creating a technical changelog entry for version {version}.\n\n\
         This should be a precise, developer-focused summary of all changes.\n\n\
         Commits by category:\n"
    );

    for (commit_type, commits) in &history.categorized {
        let _ = writeln!(prompt, "\n{}:", commit_type.as_str().to_uppercase());
        for commit in commits {
            let scope = commit
                .scope
                .as_ref()
                .map(|s| format!("({s})"))
                .unwrap_or_default();
            let bang = if commit.breaking { "!" } else { "" };
            let _ = writeln!(
                prompt,
                "- {}{scope}{bang}: {}",
                commit.commit_type, commit.description
            );
        }
    }
    prompt.push_str(CHANGELOG_RULES);

    prompt
}

fn summary_prompt(commits: &[CommitRecord]) -> String {
    let mut prompt = String::from("Summarize these commits in 2-3 sentences:\n\n");
    for commit in commits.iter().take(MAX_SUMMARY_COMMITS) {
        let _ = writeln!(prompt, "- {}", commit.message);
    }
    prompt.push_str("\nFocus on the main themes and improvements.");
    prompt
}

fn version_bump_prompt(summary: &ChangeSummary) -> String {
    format!(
        "Analyze these commits and suggest a semantic version bump.\n\n\
         Commit Analysis:\n\
         - Breaking changes: {}\n\
         - New features: {}\n\
         - Bug fixes: {}\n\
         - Total commits: {}\n\n\
         Semantic versioning rules:\n\
         - MAJOR: Breaking changes (incompatible API changes)\n\
         - MINOR: New features (backwards compatible)\n\
         - PATCH: Bug fixes (backwards compatible)\n\n\
         Respond with exactly one word: \"major\", \"minor\", or \"patch\".\n",
        summary.breaking_changes, summary.features, summary.fixes, summary.total_commits
    )
}
