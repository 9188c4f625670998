//! CLI interface for release-chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::ReleaseChainConfig;
use crate::generation::ResilientGenerator;
use crate::git::GitRepository;

pub mod commit;
pub mod release;
pub mod status;

/// release-chain: conventional commits and automated releases.
#[derive(Parser)]
#[command(name = "release-chain")]
#[command(
    about = "Generate conventional commit messages and cut versioned releases",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Logs every pipeline stage at debug level and prints change details.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Generates a commit message for staged changes and commits.
    Commit(commit::CommitCommand),
    /// Bumps the version, writes release notes and the changelog, commits and tags.
    Release(release::ReleaseCommand),
    /// Shows what the next release would contain.
    Status(status::StatusCommand),
}

impl Cli {
    /// The log filter: `debug` with `--verbose`, else `RUST_LOG` or `warn`.
    pub fn log_filter(&self) -> EnvFilter {
        if self.verbose {
            return EnvFilter::new("debug");
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }

    /// Executes the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Commit(cmd) => cmd.execute(self.verbose).await,
            Commands::Release(cmd) => cmd.execute().await,
            Commands::Status(cmd) => cmd.execute(),
        }
    }
}

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text.
    #[default]
    Text,
    /// The final context as JSON.
    Json,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Configuration file (defaults to .release-chain.yaml in the repository root).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// The repository in the current directory and its resolved configuration.
pub(crate) struct Workspace {
    pub(crate) repo: Arc<GitRepository>,
    pub(crate) config: ReleaseChainConfig,
}

impl Workspace {
    pub(crate) fn open(config_path: Option<&Path>) -> Result<Self> {
        let repo = GitRepository::open().context("Failed to open git repository")?;
        let config = ReleaseChainConfig::resolve(repo.workdir(), config_path)?;
        debug!(
            root = %repo.workdir().display(),
            endpoint = %config.ai.endpoint,
            model = %config.ai.model,
            "Opened workspace"
        );
        Ok(Self {
            repo: Arc::new(repo),
            config,
        })
    }

    /// The generator for one run; `no_ai` forces templates.
    pub(crate) fn generator(&self, no_ai: bool) -> Result<ResilientGenerator> {
        if no_ai {
            return Ok(ResilientGenerator::templates_only());
        }
        ResilientGenerator::from_config(&self.config.ai)
            .context("Failed to create the generation backend")
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
