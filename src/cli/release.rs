//! Release command: bumps the version and publishes release artifacts.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use super::{print_json, CommonArgs, OutputFormat, Workspace};
use crate::release_files::FsReleaseFiles;
use crate::version::{BumpRequest, SemVer};
use crate::version_files::FsVersionStore;
use crate::workflow::{ReleaseContext, ReleaseOptions, ReleaseWorkflow};

/// Release command options.
#[derive(Parser)]
pub struct ReleaseCommand {
    /// Bump to apply: patch, minor, major or auto (from commit history).
    #[arg(value_name = "BUMP", default_value = "auto")]
    pub bump: BumpRequest,

    /// Computes and prints the release without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Skips the release commit.
    #[arg(long)]
    pub no_commit: bool,

    /// Skips the release tag.
    #[arg(long)]
    pub no_tag: bool,

    /// Releases exactly this version; it must match the requested bump.
    #[arg(long, value_name = "X.Y.Z")]
    pub set_version: Option<SemVer>,

    /// Uses templates instead of the generation backend.
    #[arg(long)]
    pub no_ai: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,

    /// Shared options.
    #[command(flatten)]
    pub common: CommonArgs,
}

impl ReleaseCommand {
    /// Runs the release workflow in the current repository.
    pub async fn execute(self) -> Result<()> {
        let workspace = Workspace::open(self.common.config.as_deref())?;
        let root = workspace.repo.workdir().to_path_buf();
        let git = &workspace.config.git;

        let options = ReleaseOptions {
            target_version: self.set_version,
            dry_run: self.dry_run,
            auto_commit: git.auto_commit && !self.no_commit,
            auto_tag: git.auto_tag && !self.no_tag,
            ..ReleaseOptions::new(self.bump)
        };

        let workflow = ReleaseWorkflow::new(
            workspace.repo.clone(),
            workspace.repo.clone(),
            Arc::new(FsVersionStore::new(&root)),
            Arc::new(FsReleaseFiles::new(&root, workspace.config.files.clone())),
            workspace.generator(self.no_ai)?,
        );
        let ctx = workflow.run(options).await?;

        match self.output_format {
            OutputFormat::Json => print_json(&ctx)?,
            OutputFormat::Text => print_text(&ctx),
        }

        if let Some(error) = &ctx.error {
            anyhow::bail!("Release failed: {error}");
        }
        Ok(())
    }
}

fn print_text(ctx: &ReleaseContext) {
    if ctx.error.is_some() {
        return;
    }

    if let (Some(current), Some(new), Some(kind)) = (ctx.current_version, ctx.new_version, ctx.bump_type) {
        println!("Version: {current} -> {new} ({kind})");
    }
    if let Some(advisory) = ctx.advisory_bump.as_ref().filter(|a| !a.used_fallback) {
        println!("Backend suggestion: {}", advisory.text);
    }
    if let Some(summary) = &ctx.commit_summary {
        println!("{summary}");
    }

    if ctx.dry_run {
        if let Some(notes) = &ctx.release_notes {
            println!();
            println!("{notes}");
        }
        if let Some(entry) = &ctx.changelog_entry {
            println!("{entry}");
        }
        println!("Dry run: nothing was written.");
        return;
    }

    for path in ctx.updated_version_files.iter().chain(&ctx.release_files) {
        println!("Updated {}", path.display());
    }
    if let Some(id) = &ctx.release_commit {
        println!("Created release commit {}", id.get(..8).unwrap_or(id));
    }
    if let Some(tag) = &ctx.tag_name {
        println!("Created tag {tag}");
    }
}
