//! Versioned releases: bump, release notes, changelog, commit and tag.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::generation::{GeneratedContent, ResilientGenerator};
use crate::history::HistoryAnalysis;
use crate::pipeline::{Pipeline, PipelineContext, PipelineError, Stage, StageObserver, TracingObserver};
use crate::release_files::ReleaseFileWriter;
use crate::vcs::{VcsReader, VcsWriter};
use crate::version::{validate_progression, BumpKind, BumpRequest, SemVer};
use crate::version_files::VersionFileStore;

use super::required;

/// Caller choices for one release run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOptions {
    /// Which bump to apply.
    pub bump: BumpRequest,
    /// Exact version to release instead of the computed one.
    pub target_version: Option<SemVer>,
    /// Compute and generate everything without writing.
    pub dry_run: bool,
    /// Commit the version and release files.
    pub auto_commit: bool,
    /// Tag the release.
    pub auto_tag: bool,
    /// Release date recorded in the changelog.
    pub date: NaiveDate,
}

impl ReleaseOptions {
    /// Options for `bump`, committing and tagging today.
    pub fn new(bump: BumpRequest) -> Self {
        Self {
            bump,
            target_version: None,
            dry_run: false,
            auto_commit: true,
            auto_tag: true,
            date: Local::now().date_naive(),
        }
    }
}

/// Commit counts recorded with a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReleaseStats {
    /// Commits since the last tag.
    pub total_commits: usize,
    /// `feat` commits.
    pub features: usize,
    /// `fix` commits.
    pub fixes: usize,
    /// Breaking commits.
    pub breaking_changes: usize,
    /// Distinct authors.
    pub contributors: usize,
}

/// What is being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// The new version.
    pub version: SemVer,
    /// The bump that produced it.
    pub bump_type: BumpKind,
    /// Release date.
    pub date: NaiveDate,
    /// Commit counts.
    pub stats: ReleaseStats,
}

impl VersionInfo {
    fn new(version: SemVer, bump_type: BumpKind, date: NaiveDate, history: &HistoryAnalysis) -> Self {
        let summary = &history.summary;
        Self {
            version,
            bump_type,
            date,
            stats: ReleaseStats {
                total_commits: summary.total_commits,
                features: summary.features,
                fixes: summary.fixes,
                breaking_changes: summary.breaking_changes,
                contributors: summary.contributors.len(),
            },
        }
    }
}

/// State threaded through the release stages.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseContext {
    /// The bump the caller asked for.
    pub requested_bump: BumpRequest,
    /// Explicit version from the caller.
    pub target_version: Option<SemVer>,
    /// Nothing is written.
    pub dry_run: bool,
    /// The release is committed.
    pub auto_commit: bool,
    /// The release is tagged.
    pub auto_tag: bool,
    /// Release date.
    pub release_date: NaiveDate,
    /// Tag the history starts after.
    pub last_tag: Option<String>,
    /// Commits since the last tag.
    pub history: Option<HistoryAnalysis>,
    /// Version declared in the project files.
    pub current_version: Option<SemVer>,
    /// Version being released.
    pub new_version: Option<SemVer>,
    /// Bump applied.
    pub bump_type: Option<BumpKind>,
    /// Backend's bump opinion for `auto` requests; never changes the bump.
    pub advisory_bump: Option<GeneratedContent>,
    /// Release metadata.
    pub version_info: Option<VersionInfo>,
    /// Release notes text.
    pub release_notes: Option<String>,
    /// Changelog entry body.
    pub changelog_entry: Option<String>,
    /// Short prose summary used in the commit and tag messages.
    pub commit_summary: Option<String>,
    /// Any of the generated texts came from a template.
    pub used_fallback: bool,
    /// Project files the new version was written to.
    pub updated_version_files: Vec<PathBuf>,
    /// Release notes and changelog paths.
    pub release_files: Vec<PathBuf>,
    /// Id of the release commit.
    pub release_commit: Option<String>,
    /// Message of the release commit.
    pub commit_message: Option<String>,
    /// Name of the created tag.
    pub tag_name: Option<String>,
    /// Message of the created tag.
    pub tag_message: Option<String>,
    /// First business failure; later stages pass the context through.
    pub error: Option<String>,
}

impl ReleaseContext {
    /// Starts a run. A dry run never commits or tags.
    pub fn new(options: ReleaseOptions) -> Self {
        Self {
            requested_bump: options.bump,
            target_version: options.target_version,
            dry_run: options.dry_run,
            auto_commit: options.auto_commit && !options.dry_run,
            auto_tag: options.auto_tag && !options.dry_run,
            release_date: options.date,
            last_tag: None,
            history: None,
            current_version: None,
            new_version: None,
            bump_type: None,
            advisory_bump: None,
            version_info: None,
            release_notes: None,
            changelog_entry: None,
            commit_summary: None,
            used_fallback: false,
            updated_version_files: Vec::new(),
            release_files: Vec::new(),
            release_commit: None,
            commit_message: None,
            tag_name: None,
            tag_message: None,
            error: None,
        }
    }

    fn fail(self, error: impl Into<String>) -> Self {
        let error = error.into();
        warn!(%error, "Release workflow stopped");
        Self {
            error: Some(error),
            ..self
        }
    }
}

impl PipelineContext for ReleaseContext {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Subject and body of the release commit.
pub fn release_commit_message(version: SemVer, summary: &str) -> String {
    format!("chore(release): bump version to {version}\n\n{summary}")
}

/// Tag name for a version.
pub fn tag_name(version: SemVer) -> String {
    format!("v{version}")
}

fn load_history(vcs: &dyn VcsReader) -> Result<(Option<String>, HistoryAnalysis)> {
    let last_tag = vcs.last_tag().context("Failed to find the last tag")?;
    let entries = vcs
        .log_since(last_tag.as_deref())
        .context("Failed to read the commit log")?;
    Ok((last_tag, HistoryAnalysis::from_log(&entries)))
}

struct AnalyzeHistory {
    vcs: Arc<dyn VcsReader>,
}

impl Stage<ReleaseContext> for AnalyzeHistory {
    fn name(&self) -> &'static str {
        "analyze-history"
    }

    fn run(&self, ctx: ReleaseContext) -> BoxFuture<'_, Result<ReleaseContext>> {
        Box::pin(async move {
            if ctx.error.is_some() {
                return Ok(ctx);
            }

            match load_history(self.vcs.as_ref()) {
                Ok((last_tag, history)) => {
                    info!(
                        last_tag = last_tag.as_deref().unwrap_or("none"),
                        commits = history.commits.len(),
                        suggested = %history.summary.suggested_bump,
                        "Analyzed commit history"
                    );
                    Ok(ReleaseContext {
                        last_tag,
                        history: Some(history),
                        ..ctx
                    })
                }
                Err(e) => Ok(ctx.fail(format!("Git analysis failed: {e:#}"))),
            }
        })
    }
}

struct DetermineVersionBump {
    versions: Arc<dyn VersionFileStore>,
    generator: Arc<ResilientGenerator>,
}

impl Stage<ReleaseContext> for DetermineVersionBump {
    fn name(&self) -> &'static str {
        "determine-version-bump"
    }

    fn run(&self, ctx: ReleaseContext) -> BoxFuture<'_, Result<ReleaseContext>> {
        Box::pin(async move {
            if ctx.error.is_some() {
                return Ok(ctx);
            }

            let history = required(&ctx.history, "history")?;
            let current = match self.versions.read_current_version() {
                Ok(version) => version,
                Err(e) => return Ok(ctx.fail(format!("Version determination failed: {e:#}"))),
            };

            let (kind, advisory) = match ctx.requested_bump {
                BumpRequest::Kind(kind) => (kind, None),
                BumpRequest::Auto => {
                    let kind = history.summary.suggested_bump;
                    let advisory = self.generator.suggest_version_bump(&history.summary).await;
                    if advisory.text != kind.as_str() {
                        info!(chosen = %kind, suggested = %advisory.text, "Backend suggests a different bump");
                    }
                    (kind, Some(advisory))
                }
            };

            let proposed = match ctx.target_version.map_or_else(|| current.bump(kind), Ok) {
                Ok(version) => version,
                Err(e) => {
                    return Ok(ReleaseContext {
                        current_version: Some(current),
                        ..ctx
                    }
                    .fail(format!("Version determination failed: {e}")))
                }
            };
            if !validate_progression(current, proposed, kind) {
                return Ok(ReleaseContext {
                    current_version: Some(current),
                    ..ctx
                }
                .fail(format!(
                    "Invalid version progression: {current} -> {proposed} is not a {kind} bump"
                )));
            }

            info!(%current, new = %proposed, bump = %kind, "Determined release version");
            let version_info = VersionInfo::new(proposed, kind, ctx.release_date, history);
            Ok(ReleaseContext {
                current_version: Some(current),
                new_version: Some(proposed),
                bump_type: Some(kind),
                advisory_bump: advisory,
                version_info: Some(version_info),
                ..ctx
            })
        })
    }
}

struct GenerateContent {
    generator: Arc<ResilientGenerator>,
}

impl Stage<ReleaseContext> for GenerateContent {
    fn name(&self) -> &'static str {
        "generate-content"
    }

    fn run(&self, ctx: ReleaseContext) -> BoxFuture<'_, Result<ReleaseContext>> {
        Box::pin(async move {
            if ctx.error.is_some() {
                return Ok(ctx);
            }

            let history = required(&ctx.history, "history")?;
            let version = *required(&ctx.new_version, "new version")?;

            let notes = self.generator.release_notes(history).await;
            let changelog = self.generator.changelog_entry(history, version).await;
            let summary = self.generator.commit_summary(&history.commits).await;
            let used_fallback =
                notes.used_fallback || changelog.used_fallback || summary.used_fallback;
            debug!(used_fallback, "Generated release content");

            Ok(ReleaseContext {
                release_notes: Some(notes.text),
                changelog_entry: Some(changelog.text),
                commit_summary: Some(summary.text),
                used_fallback,
                ..ctx
            })
        })
    }
}

struct UpdateVersionFiles {
    versions: Arc<dyn VersionFileStore>,
}

impl Stage<ReleaseContext> for UpdateVersionFiles {
    fn name(&self) -> &'static str {
        "update-version-files"
    }

    fn run(&self, ctx: ReleaseContext) -> BoxFuture<'_, Result<ReleaseContext>> {
        Box::pin(async move {
            if ctx.error.is_some() || ctx.dry_run {
                return Ok(ctx);
            }

            let version = *required(&ctx.new_version, "new version")?;
            match self.versions.write_version(version) {
                Ok(files) => Ok(ReleaseContext {
                    updated_version_files: files,
                    ..ctx
                }),
                Err(e) => Ok(ctx.fail(format!("Version file update failed: {e:#}"))),
            }
        })
    }
}

struct PrepareReleaseFiles {
    files: Arc<dyn ReleaseFileWriter>,
}

impl PrepareReleaseFiles {
    fn write(&self, ctx: &ReleaseContext) -> Result<Vec<PathBuf>> {
        let version = *required(&ctx.new_version, "new version")?;
        let notes = self
            .files
            .write_release_notes(required(&ctx.release_notes, "release notes")?)?;
        let changelog = self.files.update_changelog(
            version,
            ctx.release_date,
            required(&ctx.changelog_entry, "changelog entry")?,
        )?;
        Ok(vec![notes, changelog])
    }
}

impl Stage<ReleaseContext> for PrepareReleaseFiles {
    fn name(&self) -> &'static str {
        "prepare-release-files"
    }

    fn run(&self, ctx: ReleaseContext) -> BoxFuture<'_, Result<ReleaseContext>> {
        Box::pin(async move {
            if ctx.error.is_some() || ctx.dry_run {
                return Ok(ctx);
            }

            match self.write(&ctx) {
                Ok(release_files) => Ok(ReleaseContext {
                    release_files,
                    ..ctx
                }),
                Err(e) => Ok(ctx.fail(format!("Release file preparation failed: {e:#}"))),
            }
        })
    }
}

struct CreateReleaseCommit {
    vcs: Arc<dyn VcsWriter>,
}

impl CreateReleaseCommit {
    fn commit(&self, ctx: &ReleaseContext, message: &str) -> Result<String> {
        let paths: Vec<PathBuf> = ctx
            .updated_version_files
            .iter()
            .chain(&ctx.release_files)
            .cloned()
            .collect();
        self.vcs.stage_files(&paths)?;
        self.vcs.commit(message)
    }
}

impl Stage<ReleaseContext> for CreateReleaseCommit {
    fn name(&self) -> &'static str {
        "create-release-commit"
    }

    fn run(&self, ctx: ReleaseContext) -> BoxFuture<'_, Result<ReleaseContext>> {
        Box::pin(async move {
            if ctx.error.is_some() || !ctx.auto_commit || ctx.dry_run {
                return Ok(ctx);
            }

            let message = release_commit_message(
                *required(&ctx.new_version, "new version")?,
                required(&ctx.commit_summary, "commit summary")?,
            );
            match self.commit(&ctx, &message) {
                Ok(id) => {
                    info!(commit = %id, "Created release commit");
                    Ok(ReleaseContext {
                        release_commit: Some(id),
                        commit_message: Some(message),
                        ..ctx
                    })
                }
                Err(e) => Ok(ctx.fail(format!("Release commit failed: {e:#}"))),
            }
        })
    }
}

struct CreateGitTag {
    vcs: Arc<dyn VcsWriter>,
}

impl Stage<ReleaseContext> for CreateGitTag {
    fn name(&self) -> &'static str {
        "create-git-tag"
    }

    fn run(&self, ctx: ReleaseContext) -> BoxFuture<'_, Result<ReleaseContext>> {
        Box::pin(async move {
            if ctx.error.is_some() || !ctx.auto_tag || ctx.dry_run {
                return Ok(ctx);
            }

            let version = *required(&ctx.new_version, "new version")?;
            let name = tag_name(version);
            let message = format!(
                "Release {version}\n\n{}",
                required(&ctx.commit_summary, "commit summary")?
            );
            match self.vcs.create_annotated_tag(&name, &message) {
                Ok(()) => {
                    info!(tag = %name, "Created release tag");
                    Ok(ReleaseContext {
                        tag_name: Some(name),
                        tag_message: Some(message),
                        ..ctx
                    })
                }
                Err(e) => Ok(ctx.fail(format!("Git tag creation failed: {e:#}"))),
            }
        })
    }
}

/// The release workflow and its collaborators.
pub struct ReleaseWorkflow {
    reader: Arc<dyn VcsReader>,
    writer: Arc<dyn VcsWriter>,
    versions: Arc<dyn VersionFileStore>,
    files: Arc<dyn ReleaseFileWriter>,
    generator: Arc<ResilientGenerator>,
    observers: Vec<Box<dyn StageObserver>>,
}

impl ReleaseWorkflow {
    /// Creates a workflow over a repository, its project files and a generator.
    pub fn new(
        reader: Arc<dyn VcsReader>,
        writer: Arc<dyn VcsWriter>,
        versions: Arc<dyn VersionFileStore>,
        files: Arc<dyn ReleaseFileWriter>,
        generator: ResilientGenerator,
    ) -> Self {
        Self {
            reader,
            writer,
            versions,
            files,
            generator: Arc::new(generator),
            observers: Vec::new(),
        }
    }

    /// Adds an observer next to the built-in tracing one.
    #[must_use]
    pub fn observe(mut self, observer: impl StageObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    fn pipeline(self) -> Pipeline<ReleaseContext> {
        let mut pipeline = Pipeline::new()
            .stage(AnalyzeHistory { vcs: self.reader })
            .stage(DetermineVersionBump {
                versions: Arc::clone(&self.versions),
                generator: Arc::clone(&self.generator),
            })
            .stage(GenerateContent {
                generator: self.generator,
            })
            .stage(UpdateVersionFiles {
                versions: self.versions,
            })
            .stage(PrepareReleaseFiles { files: self.files })
            .stage(CreateReleaseCommit {
                vcs: Arc::clone(&self.writer),
            })
            .stage(CreateGitTag { vcs: self.writer })
            .observe(TracingObserver);
        for observer in self.observers {
            pipeline = pipeline.observe(observer);
        }
        pipeline
    }

    /// Runs every stage and returns the final context.
    pub async fn run(self, options: ReleaseOptions) -> Result<ReleaseContext, PipelineError> {
        self.pipeline().run(ReleaseContext::new(options)).await
    }
}

/// A past release read from the tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseTag {
    /// Version the tag names.
    pub version: SemVer,
    /// The tag itself.
    pub tag: String,
    /// When the tag was created.
    pub date: DateTime<FixedOffset>,
}

/// Tags that name a version, newest first. Other tags are skipped.
pub fn version_history(vcs: &dyn VcsReader) -> Result<Vec<ReleaseTag>> {
    let tags = vcs.tags_with_dates().context("Failed to read tags")?;
    Ok(tags
        .into_iter()
        .filter_map(|tag| {
            let version = SemVer::parse_tag(&tag.name).ok()?;
            Some(ReleaseTag {
                version,
                tag: tag.name,
                date: tag.date,
            })
        })
        .collect())
}

/// Readiness of the repository for a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseStatus {
    /// Version declared in the project files.
    pub current_version: SemVer,
    /// Most recent tag, if any.
    pub last_tag: Option<String>,
    /// Commits since that tag.
    pub pending_commits: usize,
    /// Bump the pending commits imply.
    pub suggested_bump: BumpKind,
    /// Authors of the pending commits.
    pub contributors: Vec<String>,
    /// There is at least one pending commit.
    pub ready_for_release: bool,
    /// Earlier releases, newest first.
    pub version_history: Vec<ReleaseTag>,
}

/// Reports what a release would contain, without running one.
pub fn release_status(vcs: &dyn VcsReader, versions: &dyn VersionFileStore) -> Result<ReleaseStatus> {
    let current_version = versions.read_current_version()?;
    let (last_tag, history) = load_history(vcs)?;
    let summary = history.summary;

    Ok(ReleaseStatus {
        current_version,
        last_tag,
        pending_commits: summary.total_commits,
        suggested_bump: summary.suggested_bump,
        contributors: summary.contributors,
        ready_for_release: summary.total_commits > 0,
        version_history: version_history(vcs)?,
    })
}
