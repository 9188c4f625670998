//! Generates a conventional commit message for the working tree and commits.

use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{
    classify, BranchAnalyzer, BranchContext, ChangeClassification, DiffTally, FileChangeSet,
    IssueContext, UNKNOWN_BRANCH_TYPE,
};
use crate::generation::{CommitMessageInput, ResilientGenerator};
use crate::message::{self, MessageIssue};
use crate::pipeline::{Pipeline, PipelineContext, PipelineError, Stage, StageObserver, TracingObserver};
use crate::vcs::{VcsReader, VcsWriter};

use super::required;

/// Caller choices for one commit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    /// Generate and validate the message without committing.
    pub dry_run: bool,
    /// Consider and stage every working tree change, not just the index.
    pub stage_all: bool,
    /// Append `Refs #N` when the branch names an issue.
    pub include_issue_link: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            stage_all: false,
            include_issue_link: true,
        }
    }
}

/// State threaded through the commit stages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitContext {
    /// No commit is created.
    pub dry_run: bool,
    /// Unstaged and untracked changes are included.
    pub stage_all: bool,
    /// Issue references are appended to the message.
    pub include_issue_link: bool,
    /// Changed paths.
    pub changes: Option<FileChangeSet>,
    /// Diff statistics.
    pub diff_tally: Option<DiffTally>,
    /// Raw unified diff.
    #[serde(skip)]
    pub diff: Option<String>,
    /// Checked-out branch, or `unknown`.
    pub branch_name: Option<String>,
    /// Context parsed from the branch name.
    pub branch: Option<BranchContext>,
    /// Issue the branch refers to.
    pub issue: Option<IssueContext>,
    /// Type, scope and breaking flag.
    pub classification: Option<ChangeClassification>,
    /// The commit message, after validation fixes once that stage ran.
    pub message: Option<String>,
    /// The message came from a template.
    pub used_fallback: bool,
    /// Rules the generated message broke.
    pub validation_issues: Vec<MessageIssue>,
    /// The message was rewritten to fix those rules.
    pub auto_fixed: bool,
    /// Id of the created commit.
    pub commit_id: Option<String>,
    /// First business failure; later stages pass the context through.
    pub error: Option<String>,
}

impl CommitContext {
    /// Starts a run with the given options.
    pub fn new(options: CommitOptions) -> Self {
        Self {
            dry_run: options.dry_run,
            stage_all: options.stage_all,
            include_issue_link: options.include_issue_link,
            ..Self::default()
        }
    }

    fn fail(self, error: impl Into<String>) -> Self {
        let error = error.into();
        warn!(%error, "Commit workflow stopped");
        Self {
            error: Some(error),
            ..self
        }
    }
}

impl PipelineContext for CommitContext {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Error recorded when the generated message is declined at the prompt.
pub const COMMIT_CANCELLED: &str = "Commit cancelled by user";

/// Asks whether a generated message should be committed.
pub trait CommitConfirmation: Send + Sync {
    /// Returns true to go ahead with the commit.
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Appends `Refs #N` unless the message already mentions the issue.
pub fn with_issue_link(message: &str, issue_number: u64) -> String {
    let reference = format!("#{issue_number}");
    if mentions_reference(message, &reference) {
        message.to_string()
    } else {
        format!("{}\n\nRefs {reference}", message.trim_end())
    }
}

// `#4` must not match inside `#42`
fn mentions_reference(message: &str, reference: &str) -> bool {
    message.match_indices(reference).any(|(at, _)| {
        !message[at + reference.len()..].starts_with(|c: char| c.is_ascii_digit())
    })
}

struct AnalyzeChanges {
    vcs: Arc<dyn VcsReader>,
}

impl Stage<CommitContext> for AnalyzeChanges {
    fn name(&self) -> &'static str {
        "analyze-changes"
    }

    fn run(&self, ctx: CommitContext) -> BoxFuture<'_, Result<CommitContext>> {
        Box::pin(async move {
            if ctx.error.is_some() {
                return Ok(ctx);
            }

            let staged_only = !ctx.stage_all;
            let snapshot = self.vcs.status_summary(staged_only).and_then(|status| {
                self.vcs
                    .diff_text(staged_only)
                    .map(|diff| (status, diff))
            });
            let (status, diff) = match snapshot {
                Ok(snapshot) => snapshot,
                Err(e) => return Ok(ctx.fail(format!("Failed to analyze changes: {e:#}"))),
            };

            if diff.trim().is_empty() {
                return Ok(ctx.fail("No changes detected to commit"));
            }

            let changes = FileChangeSet::from_name_status(&status);
            let tally = DiffTally::from_diff(&diff);
            debug!(
                files = changes.len(),
                lines_added = tally.lines_added,
                lines_removed = tally.lines_removed,
                "Analyzed working tree changes"
            );

            Ok(CommitContext {
                changes: Some(changes),
                diff_tally: Some(tally),
                diff: Some(diff),
                ..ctx
            })
        })
    }
}

struct ExtractBranchContext {
    vcs: Arc<dyn VcsReader>,
}

impl Stage<CommitContext> for ExtractBranchContext {
    fn name(&self) -> &'static str {
        "extract-branch-context"
    }

    fn run(&self, ctx: CommitContext) -> BoxFuture<'_, Result<CommitContext>> {
        Box::pin(async move {
            if ctx.error.is_some() {
                return Ok(ctx);
            }

            // a missing branch only costs context, not the commit
            let (branch_name, branch) = match self.vcs.current_branch_name() {
                Ok(name) => {
                    let branch = BranchAnalyzer::analyze(&name);
                    (name, branch)
                }
                Err(e) => {
                    debug!("Branch lookup failed, continuing without branch context: {e:#}");
                    (UNKNOWN_BRANCH_TYPE.to_string(), BranchContext::default())
                }
            };

            Ok(CommitContext {
                issue: BranchAnalyzer::issue_context(&branch),
                branch_name: Some(branch_name),
                branch: Some(branch),
                ..ctx
            })
        })
    }
}

struct ClassifyChange;

impl Stage<CommitContext> for ClassifyChange {
    fn name(&self) -> &'static str {
        "classify-change"
    }

    fn run(&self, ctx: CommitContext) -> BoxFuture<'_, Result<CommitContext>> {
        Box::pin(async move {
            if ctx.error.is_some() {
                return Ok(ctx);
            }

            let classification = classify(
                required(&ctx.changes, "changes")?,
                required(&ctx.diff_tally, "diff tally")?,
                required(&ctx.diff, "diff")?,
            );
            info!(
                commit_type = %classification.commit_type,
                scope = classification.scope.as_deref().unwrap_or(""),
                breaking = classification.breaking,
                "Classified change"
            );

            Ok(CommitContext {
                classification: Some(classification),
                ..ctx
            })
        })
    }
}

struct GenerateMessage {
    generator: Arc<ResilientGenerator>,
}

impl Stage<CommitContext> for GenerateMessage {
    fn name(&self) -> &'static str {
        "generate-message"
    }

    fn run(&self, ctx: CommitContext) -> BoxFuture<'_, Result<CommitContext>> {
        Box::pin(async move {
            if ctx.error.is_some() {
                return Ok(ctx);
            }

            let unknown = BranchContext::default();
            let input = CommitMessageInput {
                branch_name: ctx.branch_name.as_deref().unwrap_or(UNKNOWN_BRANCH_TYPE),
                branch: ctx.branch.as_ref().unwrap_or(&unknown),
                changes: required(&ctx.changes, "changes")?,
                tally: required(&ctx.diff_tally, "diff tally")?,
                classification: required(&ctx.classification, "classification")?,
            };
            let content = self.generator.commit_message(input).await;

            let text = match (&ctx.issue, ctx.include_issue_link) {
                (Some(issue), true) => with_issue_link(&content.text, issue.number),
                _ => content.text,
            };

            Ok(CommitContext {
                message: Some(text),
                used_fallback: content.used_fallback,
                ..ctx
            })
        })
    }
}

struct ValidateMessage;

impl Stage<CommitContext> for ValidateMessage {
    fn name(&self) -> &'static str {
        "validate-message"
    }

    fn run(&self, ctx: CommitContext) -> BoxFuture<'_, Result<CommitContext>> {
        Box::pin(async move {
            if ctx.error.is_some() {
                return Ok(ctx);
            }

            let outcome = message::validate_and_fix(required(&ctx.message, "message")?);
            if !outcome.remaining.is_empty() {
                let remaining: Vec<String> =
                    outcome.remaining.iter().map(ToString::to_string).collect();
                warn!(issues = ?remaining, "Commit message still breaks rules after auto-fix");
            }

            Ok(CommitContext {
                message: Some(outcome.message),
                validation_issues: outcome.issues,
                auto_fixed: outcome.auto_fixed,
                ..ctx
            })
        })
    }
}

struct CreateCommit {
    vcs: Arc<dyn VcsWriter>,
    confirmation: Option<Arc<dyn CommitConfirmation>>,
}

impl CreateCommit {
    fn commit(&self, message: &str, stage_all: bool) -> Result<String> {
        if stage_all {
            self.vcs.stage_all()?;
        }
        self.vcs.commit(message)
    }
}

impl Stage<CommitContext> for CreateCommit {
    fn name(&self) -> &'static str {
        "create-commit"
    }

    fn run(&self, ctx: CommitContext) -> BoxFuture<'_, Result<CommitContext>> {
        Box::pin(async move {
            if ctx.error.is_some() || ctx.dry_run {
                return Ok(ctx);
            }

            let message = required(&ctx.message, "message")?.clone();
            if let Some(confirmation) = &self.confirmation {
                match confirmation.confirm(&message) {
                    Ok(true) => debug!("Commit confirmed"),
                    Ok(false) => return Ok(ctx.fail(COMMIT_CANCELLED)),
                    Err(e) => return Ok(ctx.fail(format!("Failed to create commit: {e:#}"))),
                }
            }

            match self.commit(&message, ctx.stage_all) {
                Ok(id) => {
                    info!(commit = %id, "Created commit");
                    Ok(CommitContext {
                        commit_id: Some(id),
                        ..ctx
                    })
                }
                Err(e) => Ok(ctx.fail(format!("Failed to create commit: {e:#}"))),
            }
        })
    }
}

/// The commit workflow and its collaborators.
pub struct CommitWorkflow {
    reader: Arc<dyn VcsReader>,
    writer: Arc<dyn VcsWriter>,
    generator: Arc<ResilientGenerator>,
    confirmation: Option<Arc<dyn CommitConfirmation>>,
    observers: Vec<Box<dyn StageObserver>>,
}

impl CommitWorkflow {
    /// Creates a workflow over a repository and a generator.
    pub fn new(
        reader: Arc<dyn VcsReader>,
        writer: Arc<dyn VcsWriter>,
        generator: ResilientGenerator,
    ) -> Self {
        Self {
            reader,
            writer,
            generator: Arc::new(generator),
            confirmation: None,
            observers: Vec::new(),
        }
    }

    /// Asks `confirmation` before the commit is created.
    #[must_use]
    pub fn confirm_with(mut self, confirmation: impl CommitConfirmation + 'static) -> Self {
        self.confirmation = Some(Arc::new(confirmation));
        self
    }

    /// Adds an observer next to the built-in tracing one.
    #[must_use]
    pub fn observe(mut self, observer: impl StageObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    fn pipeline(self) -> Pipeline<CommitContext> {
        let mut pipeline = Pipeline::new()
            .stage(AnalyzeChanges {
                vcs: Arc::clone(&self.reader),
            })
            .stage(ExtractBranchContext { vcs: self.reader })
            .stage(ClassifyChange)
            .stage(GenerateMessage {
                generator: self.generator,
            })
            .stage(ValidateMessage)
            .stage(CreateCommit {
                vcs: self.writer,
                confirmation: self.confirmation,
            })
            .observe(TracingObserver);
        for observer in self.observers {
            pipeline = pipeline.observe(observer);
        }
        pipeline
    }

    /// Runs every stage and returns the final context.
    pub async fn run(self, options: CommitOptions) -> Result<CommitContext, PipelineError> {
        self.pipeline().run(CommitContext::new(options)).await
    }
}
