//! Status command: release readiness of the current repository.

use anyhow::Result;
use clap::Parser;

use super::{print_json, CommonArgs, OutputFormat, Workspace};
use crate::version_files::FsVersionStore;
use crate::workflow::release_status;

/// Status command options.
#[derive(Parser)]
pub struct StatusCommand {
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,

    /// Shared options.
    #[command(flatten)]
    pub common: CommonArgs,
}

impl StatusCommand {
    /// Prints the current version and what the next release would contain.
    pub fn execute(self) -> Result<()> {
        let workspace = Workspace::open(self.common.config.as_deref())?;
        let versions = FsVersionStore::new(workspace.repo.workdir());
        let status = release_status(&*workspace.repo, &versions)?;

        if self.output_format == OutputFormat::Json {
            return print_json(&status);
        }

        println!("Current version: {}", status.current_version);
        println!(
            "Last tag: {}",
            status.last_tag.as_deref().unwrap_or("(none)")
        );
        println!("Pending commits: {}", status.pending_commits);
        println!("Suggested bump: {}", status.suggested_bump);
        if !status.contributors.is_empty() {
            println!("Contributors:");
            for contributor in &status.contributors {
                println!("  - {contributor}");
            }
        }
        if !status.version_history.is_empty() {
            println!("Releases:");
            for release in &status.version_history {
                println!(
                    "  - {} ({}) {}",
                    release.version,
                    release.tag,
                    release.date.format("%Y-%m-%d")
                );
            }
        }
        if status.ready_for_release {
            println!("Ready for release.");
        } else {
            println!("Nothing to release.");
        }
        Ok(())
    }
}
