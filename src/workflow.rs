//! The commit and release workflows built on [`crate::pipeline`].
//!
//! Each workflow owns its collaborators and content generator and is
//! consumed by `run`, so the backend client lives exactly as long as one
//! run.

pub mod commit;
pub mod release;

pub use commit::{
    CommitConfirmation, CommitContext, CommitOptions, CommitWorkflow, COMMIT_CANCELLED,
};
pub use release::{
    release_status, version_history, ReleaseContext, ReleaseOptions, ReleaseStats, ReleaseStatus,
    ReleaseTag, ReleaseWorkflow, VersionInfo,
};

use anyhow::Result;

/// Reads a field an earlier stage must have filled in.
///
/// A missing field with no recorded error means the pipeline was assembled
/// wrongly, which is an engine fault rather than a business failure.
fn required<'a, T>(field: &'a Option<T>, name: &str) -> Result<&'a T> {
    field
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Missing {name} from an earlier stage"))
}
