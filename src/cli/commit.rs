//! Commit command: generates a message for the working tree and commits.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Result;
use clap::Parser;

use super::{print_json, CommonArgs, OutputFormat, Workspace};
use crate::workflow::{
    CommitConfirmation, CommitContext, CommitOptions, CommitWorkflow, COMMIT_CANCELLED,
};

/// Commit command options.
#[derive(Parser)]
pub struct CommitCommand {
    /// Shows the message without committing.
    #[arg(long)]
    pub dry_run: bool,

    /// Includes unstaged and untracked changes, staging them before committing.
    #[arg(long, short = 'a')]
    pub all: bool,

    /// Shows the generated message and asks before committing.
    #[arg(long, short = 'i')]
    pub interactive: bool,

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

impl CommitCommand {
    /// Runs the commit workflow in the current repository.
    pub async fn execute(self, verbose: bool) -> Result<()> {
        let workspace = Workspace::open(self.common.config.as_deref())?;
        let options = CommitOptions {
            dry_run: self.dry_run,
            stage_all: self.all,
            include_issue_link: workspace.config.git.include_issue_link,
        };

        let mut workflow = CommitWorkflow::new(
            workspace.repo.clone(),
            workspace.repo.clone(),
            workspace.generator(self.no_ai)?,
        );
        if self.interactive {
            workflow = workflow.confirm_with(TerminalConfirmation);
        }
        let ctx = workflow.run(options).await?;

        match self.output_format {
            OutputFormat::Json => print_json(&ctx)?,
            OutputFormat::Text => print_text(&ctx, verbose),
        }

        match ctx.error.as_deref() {
            Some(COMMIT_CANCELLED) => {
                eprintln!("Commit cancelled");
                Ok(())
            }
            Some(error) => anyhow::bail!("Commit failed: {error}"),
            None => Ok(()),
        }
    }
}

/// Prompts on the controlling terminal.
struct TerminalConfirmation;

impl CommitConfirmation for TerminalConfirmation {
    fn confirm(&self, message: &str) -> Result<bool> {
        confirm_message(
            message,
            io::stdin().is_terminal(),
            &mut io::BufReader::new(io::stdin()),
        )
    }
}

/// Shows `message` and reads a yes/no answer.
///
/// The prompt goes to stderr so JSON on stdout stays parseable. Anything
/// but an explicit yes declines.
fn confirm_message(
    message: &str,
    is_terminal: bool,
    reader: &mut dyn BufRead,
) -> Result<bool> {
    let mut stderr = io::stderr();
    writeln!(stderr, "\n{message}\n")?;

    if !is_terminal {
        eprintln!("warning: stdin is not interactive, cannot confirm the commit");
        return Ok(false);
    }

    loop {
        write!(stderr, "Create this commit? [y/N] ")?;
        stderr.flush()?;

        let mut input = String::new();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" | "" => return Ok(false),
            _ => writeln!(stderr, "Please answer 'y' or 'n'.")?,
        }
    }
}

fn print_text(ctx: &CommitContext, verbose: bool) {
    if ctx.error.is_some() {
        return;
    }

    if let Some(message) = &ctx.message {
        println!("{message}");
        println!();
    }
    if verbose {
        print_details(ctx);
    }
    if ctx.used_fallback {
        println!("Generated from templates (backend unavailable or disabled).");
    }
    if ctx.auto_fixed {
        println!("Auto-fixed:");
        for issue in &ctx.validation_issues {
            println!("  - {issue}");
        }
    }

    match (&ctx.commit_id, ctx.dry_run) {
        (_, true) => println!("Dry run: no commit created."),
        (Some(id), false) => println!("Created commit {}", id.get(..8).unwrap_or(id)),
        (None, false) => {}
    }
}

fn print_details(ctx: &CommitContext) {
    if let Some(tally) = &ctx.diff_tally {
        println!("Change analysis:");
        println!("  Files affected: {}", tally.files_affected);
        println!("  Lines added: {}", tally.lines_added);
        println!("  Lines removed: {}", tally.lines_removed);
        println!("  Contains tests: {}", tally.contains_tests);
        println!("  Contains docs: {}", tally.contains_docs);
    }
    if let Some(classification) = &ctx.classification {
        println!("Commit details:");
        println!("  Type: {}", classification.commit_type);
        println!(
            "  Scope: {}",
            classification.scope.as_deref().unwrap_or("none")
        );
        println!("  Breaking: {}", classification.breaking);
    }
    if let Some(branch) = &ctx.branch_name {
        println!("  Branch: {branch}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn yes_confirms() -> Result<()> {
        assert!(confirm_message("feat: x", true, &mut Cursor::new("y\n"))?);
        assert!(confirm_message("feat: x", true, &mut Cursor::new("YES\n"))?);
        Ok(())
    }

    #[test]
    fn empty_answer_declines() -> Result<()> {
        assert!(!confirm_message("feat: x", true, &mut Cursor::new("\n"))?);
        Ok(())
    }

    #[test]
    fn invalid_answer_asks_again() -> Result<()> {
        assert!(confirm_message("feat: x", true, &mut Cursor::new("maybe\ny\n"))?);
        Ok(())
    }

    #[test]
    fn closed_stdin_declines() -> Result<()> {
        assert!(!confirm_message("feat: x", true, &mut Cursor::new(""))?);
        Ok(())
    }

    #[test]
    fn non_terminal_never_reads() -> Result<()> {
        assert!(!confirm_message("feat: x", false, &mut Cursor::new("y\n"))?);
        Ok(())
    }
}
