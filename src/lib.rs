//! # release-chain
//!
//! Conventional commit messages from staged changes, and versioned releases
//! (bump, release notes, changelog, commit, tag) from commit history.
//!
//! Both tasks are [`pipeline::Pipeline`]s of small stages threading an
//! owned context. Text comes from an Ollama-compatible backend when one is
//! reachable and from deterministic templates otherwise.
//!
//! ## Quick Start
//!
//! ```rust
//! use release_chain::history::HistoryAnalysis;
//! use release_chain::version::{BumpKind, SemVer};
//!
//! let history = HistoryAnalysis::from_log(&["feat(api): add search", "fix: crash"]);
//! assert_eq!(history.summary.suggested_bump, BumpKind::Minor);
//! assert_eq!(SemVer::new(1, 2, 3).bump(BumpKind::Minor), Ok(SemVer::new(1, 3, 0)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod classifier;
pub mod cli;
pub mod config;
pub mod generation;
pub mod git;
pub mod history;
pub mod message;
pub mod pipeline;
pub mod release_files;
pub mod vcs;
pub mod version;
pub mod version_files;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::cli::Cli;

/// The current version of release-chain.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
