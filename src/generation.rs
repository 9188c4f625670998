//! Content generation with a deterministic fallback.
//!
//! [`ResilientGenerator`] is what the workflows call. It asks a backend
//! first and renders a template whenever the backend fails, so every
//! operation yields usable text.

pub mod backend;
pub mod ollama;
pub mod prompts;
pub mod templates;

use std::sync::LazyLock;

use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::{BranchContext, ChangeClassification, DiffTally, FileChangeSet};
use crate::config::GenerationConfig;
use crate::history::{ChangeSummary, CommitRecord, HistoryAnalysis};
use crate::version::{BumpKind, SemVer};

pub use backend::{BackendError, GenerationParams, TextBackend};
pub use ollama::OllamaBackend;
pub use templates::TemplateGenerator;

/// Generated text and whether it came from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    /// The text.
    pub text: String,
    /// True when the backend was skipped or failed.
    pub used_fallback: bool,
}

impl GeneratedContent {
    fn backend(text: String) -> Self {
        Self {
            text,
            used_fallback: false,
        }
    }

    fn fallback(text: String) -> Self {
        Self {
            text,
            used_fallback: true,
        }
    }
}

/// Inputs for a commit message.
#[derive(Debug, Clone, Copy)]
pub struct CommitMessageInput<'a> {
    /// Current branch name.
    pub branch_name: &'a str,
    /// Context parsed from the branch name.
    pub branch: &'a BranchContext,
    /// Changed paths.
    pub changes: &'a FileChangeSet,
    /// Diff statistics.
    pub tally: &'a DiffTally,
    /// Classifier result.
    pub classification: &'a ChangeClassification,
}

/// One unit of text to generate.
#[derive(Debug, Clone, Copy)]
pub enum GenerationTask<'a> {
    /// A conventional commit message for staged changes.
    CommitMessage(CommitMessageInput<'a>),
    /// User-facing release notes.
    ReleaseNotes(&'a HistoryAnalysis),
    /// A changelog entry body, without the version header.
    ChangelogEntry {
        /// History since the last release.
        history: &'a HistoryAnalysis,
        /// Version being released.
        version: SemVer,
    },
    /// A short prose summary of commits.
    CommitSummary(&'a [CommitRecord]),
    /// A one-word bump suggestion.
    VersionBump(&'a ChangeSummary),
}

impl GenerationTask<'_> {
    /// Task name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CommitMessage(_) => "commit_message",
            Self::ReleaseNotes(_) => "release_notes",
            Self::ChangelogEntry { .. } => "changelog_entry",
            Self::CommitSummary(_) => "commit_summary",
            Self::VersionBump(_) => "version_bump",
        }
    }
}

/// Something that can render a [`GenerationTask`] into text.
pub trait ContentGenerator: Send + Sync {
    /// Renders the task.
    fn generate<'a>(
        &'a self,
        task: &'a GenerationTask<'a>,
    ) -> BoxFuture<'a, Result<String, BackendError>>;

    /// Short generator name for logs.
    fn name(&self) -> &str;
}

/// Prompts a [`TextBackend`] for each task.
pub struct BackendGenerator {
    backend: Box<dyn TextBackend>,
    params: GenerationParams,
}

impl BackendGenerator {
    /// Wraps a backend with fixed sampling parameters.
    pub fn new(backend: Box<dyn TextBackend>, params: GenerationParams) -> Self {
        Self { backend, params }
    }
}

impl ContentGenerator for BackendGenerator {
    fn generate<'a>(
        &'a self,
        task: &'a GenerationTask<'a>,
    ) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(async move {
            let prompt = prompts::build_prompt(task);
            debug!(
                task = task.name(),
                backend = self.backend.name(),
                prompt_len = prompt.len(),
                "Dispatching generation task"
            );

            // the backend's own timeout may not cover everything, e.g. DNS
            tokio::time::timeout(
                self.params.timeout,
                self.backend.generate(&prompt, &self.params),
            )
            .await
            .map_err(|_| BackendError::Timeout(self.params.timeout))?
        })
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

/// Backend first, template on any failure. Never errors.
pub struct ResilientGenerator {
    primary: Option<Box<dyn ContentGenerator>>,
    fallback: TemplateGenerator,
}

impl ResilientGenerator {
    /// Tries `primary` before falling back to templates.
    pub fn new(primary: Box<dyn ContentGenerator>) -> Self {
        Self {
            primary: Some(primary),
            fallback: TemplateGenerator,
        }
    }

    /// Uses templates only.
    pub fn templates_only() -> Self {
        Self {
            primary: None,
            fallback: TemplateGenerator,
        }
    }

    /// Wraps a raw backend with the given parameters.
    pub fn with_backend(backend: Box<dyn TextBackend>, params: GenerationParams) -> Self {
        Self::new(Box::new(BackendGenerator::new(backend, params)))
    }

    /// Builds the generator a workflow run uses: an Ollama backend when
    /// enabled, templates otherwise.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, BackendError> {
        if !config.enabled {
            debug!("Backend disabled, using templates only");
            return Ok(Self::templates_only());
        }
        Ok(Self::with_backend(
            Box::new(OllamaBackend::new(config)?),
            config.params(),
        ))
    }

    /// Asks the primary generator and cleans its answer; `None` means fall back.
    async fn attempt(&self, task: &GenerationTask<'_>) -> Option<String> {
        let primary = self.primary.as_ref()?;
        match primary.generate(task).await {
            Ok(text) => {
                let cleaned = clean_response(&text);
                if cleaned.is_empty() {
                    warn!(task = task.name(), generator = primary.name(), "Backend answer was empty after cleanup, using template");
                    None
                } else {
                    Some(cleaned)
                }
            }
            Err(e) => {
                warn!(task = task.name(), generator = primary.name(), error = %e, "Backend generation failed, using template");
                None
            }
        }
    }

    async fn text_or_template(&self, task: &GenerationTask<'_>) -> GeneratedContent {
        match self.attempt(task).await {
            Some(text) => GeneratedContent::backend(text),
            None => GeneratedContent::fallback(self.fallback.render(task)),
        }
    }

    /// Generates a conventional commit message.
    pub async fn commit_message(&self, input: CommitMessageInput<'_>) -> GeneratedContent {
        let task = GenerationTask::CommitMessage(input);
        let mut content = self.text_or_template(&task).await;
        content.text = ensure_type_prefix(&content.text, input.classification);
        content
    }

    /// Generates release notes.
    pub async fn release_notes(&self, history: &HistoryAnalysis) -> GeneratedContent {
        self.text_or_template(&GenerationTask::ReleaseNotes(history))
            .await
    }

    /// Generates a changelog entry body for `version`.
    pub async fn changelog_entry(
        &self,
        history: &HistoryAnalysis,
        version: SemVer,
    ) -> GeneratedContent {
        self.text_or_template(&GenerationTask::ChangelogEntry { history, version })
            .await
    }

    /// Generates a short summary of commits.
    pub async fn commit_summary(&self, commits: &[CommitRecord]) -> GeneratedContent {
        self.text_or_template(&GenerationTask::CommitSummary(commits))
            .await
    }

    /// Suggests a bump. The text is always exactly `major`, `minor` or `patch`.
    ///
    /// An answer naming none of them is treated like a failed call.
    pub async fn suggest_version_bump(&self, summary: &ChangeSummary) -> GeneratedContent {
        let task = GenerationTask::VersionBump(summary);
        match self.attempt(&task).await.as_deref().and_then(parse_bump_suggestion) {
            Some(kind) => GeneratedContent::backend(kind.to_string()),
            None => GeneratedContent::fallback(self.fallback.render(&task)),
        }
    }
}

/// Strips surrounding whitespace, code fences and quotes from backend text.
pub fn clean_response(text: &str) -> String {
    let mut text = text.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // drop the fence line, including any language tag
        text = rest.split_once('\n').map_or("", |(_, body)| body);
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text = text.trim();

    for quote in ['"', '\'', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].trim();
            break;
        }
    }

    text.to_string()
}

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static TYPE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(feat|fix|docs|style|refactor|perf|test|chore|ci|build)(\([^)]*\))?!?:").unwrap()
});

#[allow(clippy::unwrap_used)] // Compile-time constant regex pattern
static BUMP_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(major|minor|patch)\b").unwrap());

/// The `type(scope)!` prefix for a classification.
pub fn conventional_prefix(classification: &ChangeClassification) -> String {
    let scope = classification
        .scope
        .as_ref()
        .map(|s| format!("({s})"))
        .unwrap_or_default();
    let bang = if classification.breaking { "!" } else { "" };
    format!("{}{scope}{bang}", classification.commit_type)
}

/// Prefixes `type(scope)!: ` unless the first line already starts with a
/// recognized type token.
pub fn ensure_type_prefix(message: &str, classification: &ChangeClassification) -> String {
    if TYPE_TOKEN.is_match(message) {
        message.to_string()
    } else {
        format!("{}: {message}", conventional_prefix(classification))
    }
}

/// First `major`, `minor` or `patch` in the text, case-insensitively.
pub fn parse_bump_suggestion(text: &str) -> Option<BumpKind> {
    BUMP_WORD
        .find(text)
        .and_then(|m| m.as_str().to_lowercase().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{CommitType, HistoryAnalysis};
    use crate::test_utils::MockBackend;

    fn classification() -> ChangeClassification {
        ChangeClassification {
            commit_type: CommitType::Feat,
            scope: Some("cli".to_string()),
            breaking: false,
        }
    }

    fn generator(responses: Vec<Result<String, BackendError>>) -> ResilientGenerator {
        ResilientGenerator::with_backend(
            Box::new(MockBackend::new(responses)),
            GenerationConfig::default().params(),
        )
    }

    fn input<'a>(
        changes: &'a FileChangeSet,
        tally: &'a DiffTally,
        branch: &'a BranchContext,
        classification: &'a ChangeClassification,
    ) -> CommitMessageInput<'a> {
        CommitMessageInput {
            branch_name: "main",
            branch,
            changes,
            tally,
            classification,
        }
    }

    // ── clean_response ──────────────────────────────────────────────

    #[test]
    fn strips_code_fences() {
        assert_eq!(clean_response("```text\nfix: typo\n```\n"), "fix: typo");
        assert_eq!(clean_response("```\n## Notes\n\n- a\n```"), "## Notes\n\n- a");
    }

    #[test]
    fn strips_quotes() {
        assert_eq!(clean_response("  \"feat: add x\"  "), "feat: add x");
        assert_eq!(clean_response("'fix: y'"), "fix: y");
        assert_eq!(clean_response("\""), "\"");
    }

    #[test]
    fn lone_fence_is_empty() {
        assert_eq!(clean_response("```"), "");
    }

    // ── post-processing ─────────────────────────────────────────────

    #[test]
    fn prefixes_untyped_message() {
        assert_eq!(
            ensure_type_prefix("add verbose flag", &classification()),
            "feat(cli): add verbose flag"
        );
    }

    #[test]
    fn keeps_typed_message_case_insensitively() {
        assert_eq!(
            ensure_type_prefix("Fix(parser): handle eof", &classification()),
            "Fix(parser): handle eof"
        );
        assert_eq!(
            ensure_type_prefix("docs!: drop old guide", &classification()),
            "docs!: drop old guide"
        );
    }

    #[test]
    fn type_word_without_colon_is_not_a_token() {
        assert_eq!(
            ensure_type_prefix("Test suite updated", &classification()),
            "feat(cli): Test suite updated"
        );
    }

    #[test]
    fn breaking_prefix() {
        let c = ChangeClassification {
            commit_type: CommitType::Refactor,
            scope: None,
            breaking: true,
        };
        assert_eq!(conventional_prefix(&c), "refactor!");
    }

    #[test]
    fn bump_parsing_takes_first_keyword() {
        assert_eq!(parse_bump_suggestion("MINOR"), Some(BumpKind::Minor));
        assert_eq!(
            parse_bump_suggestion("Not major, this is a patch."),
            Some(BumpKind::Major)
        );
        assert_eq!(parse_bump_suggestion("Patch release"), Some(BumpKind::Patch));
        assert_eq!(parse_bump_suggestion("minority report"), None);
        assert_eq!(parse_bump_suggestion("no idea"), None);
    }

    // ── ResilientGenerator ──────────────────────────────────────────

    #[tokio::test]
    async fn backend_text_is_cleaned_and_prefixed() {
        let generator = generator(vec![Ok("\"add verbose flag\"".to_string())]);
        let (changes, tally, branch, c) = (
            FileChangeSet::default(),
            DiffTally::default(),
            BranchContext::default(),
            classification(),
        );
        let content = generator
            .commit_message(input(&changes, &tally, &branch, &c))
            .await;
        assert_eq!(content.text, "feat(cli): add verbose flag");
        assert!(!content.used_fallback);
    }

    #[tokio::test]
    async fn backend_failure_uses_template() {
        let generator = generator(vec![Err(BackendError::Network("refused".to_string()))]);
        let history = HistoryAnalysis::from_log(&["fix: crash"]);
        let content = generator.commit_summary(&history.commits).await;
        assert!(content.used_fallback);
        assert_eq!(
            content.text,
            "This release includes 1 commit with 1 bug fix."
        );
    }

    #[tokio::test]
    async fn whitespace_answer_uses_template() {
        let generator = generator(vec![Ok("```\n```".to_string())]);
        let history = HistoryAnalysis::from_log(&["feat: x"]);
        let content = generator.release_notes(&history).await;
        assert!(content.used_fallback);
        assert!(content.text.starts_with("## What's New"));
    }

    #[tokio::test]
    async fn bump_suggestion_from_backend() {
        let generator = generator(vec![Ok("I'd go with Minor.".to_string())]);
        let history = HistoryAnalysis::from_log(&["fix: a"]);
        let content = generator.suggest_version_bump(&history.summary).await;
        assert_eq!(content.text, "minor");
        assert!(!content.used_fallback);
    }

    #[tokio::test]
    async fn ambiguous_bump_falls_back_to_rules() {
        let generator = generator(vec![Ok("hard to say".to_string())]);
        let history = HistoryAnalysis::from_log(&["feat!: a"]);
        let content = generator.suggest_version_bump(&history.summary).await;
        assert_eq!(content.text, "major");
        assert!(content.used_fallback);
    }

    #[tokio::test]
    async fn templates_only_never_calls_out() {
        let generator = ResilientGenerator::templates_only();
        let history = HistoryAnalysis::from_log(&["feat: a"]);
        let content = generator
            .changelog_entry(&history, SemVer::new(0, 2, 0))
            .await;
        assert!(content.used_fallback);
        assert_eq!(content.text, "### Added\n\n- a\n");
    }

    #[tokio::test]
    async fn slow_backend_hits_timeout() {
        let backend = MockBackend::new(vec![Ok("feat: late".to_string())])
            .with_delay(std::time::Duration::from_secs(5));
        let params = GenerationParams {
            timeout: std::time::Duration::from_millis(50),
            ..GenerationConfig::default().params()
        };
        let generator = ResilientGenerator::with_backend(Box::new(backend), params);
        let history = HistoryAnalysis::from_log(&["fix: a"]);
        let content = generator.release_notes(&history).await;
        assert!(content.used_fallback);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_deterministic() -> anyhow::Result<()> {
        let config = GenerationConfig {
            // nothing listens on the discard port
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout: std::time::Duration::from_secs(2),
            ..GenerationConfig::default()
        };
        let history = HistoryAnalysis::from_log(&["feat(api): add search", "fix: crash"]);
        let changes = FileChangeSet::from_name_status("A\tsrc/search.rs\nM\tsrc/lib.rs\n");
        let (tally, branch, c) = (DiffTally::default(), BranchContext::default(), classification());

        let mut outputs = Vec::new();
        for _ in 0..2 {
            let generator = ResilientGenerator::from_config(&config)?;
            let message = generator
                .commit_message(input(&changes, &tally, &branch, &c))
                .await;
            assert!(message.used_fallback);
            assert_eq!(message.text, "feat(cli): add 1 new file, update 1 file");

            let notes = generator.release_notes(&history).await;
            let changelog = generator
                .changelog_entry(&history, SemVer::new(1, 1, 0))
                .await;
            let summary = generator.commit_summary(&history.commits).await;
            let bump = generator.suggest_version_bump(&history.summary).await;
            for content in [&notes, &changelog, &summary, &bump] {
                assert!(content.used_fallback);
                assert!(!content.text.is_empty());
            }
            outputs.push((message, notes, changelog, summary, bump));
        }
        assert_eq!(outputs[0], outputs[1]);
        Ok(())
    }
}
