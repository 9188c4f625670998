//! Shared test doubles for the workflow collaborators.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate};
use futures::future::BoxFuture;

use crate::generation::{BackendError, GenerationParams, TextBackend};
use crate::release_files::ReleaseFileWriter;
use crate::vcs::{TagRecord, VcsReader, VcsWriter};
use crate::version::SemVer;
use crate::version_files::VersionFileStore;

/// Backend with a pre-programmed queue of answers.
///
/// Answers are returned in FIFO order. Once the queue is exhausted every
/// call fails with a network error. Prompts are recorded and can be read
/// through [`prompt_handle`](Self::prompt_handle) after the backend has been
/// moved into a generator.
pub(crate) struct MockBackend {
    responses: Arc<Mutex<VecDeque<Result<String, BackendError>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockBackend {
    pub(crate) fn new(responses: Vec<Result<String, BackendError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            prompts: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Sleeps before answering, for exercising timeouts.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn prompt_handle(&self) -> PromptHandle {
        PromptHandle {
            prompts: Arc::clone(&self.prompts),
        }
    }
}

/// Shared read access to the prompts a [`MockBackend`] received.
pub(crate) struct PromptHandle {
    prompts: Arc<Mutex<Vec<String>>>,
}

impl PromptHandle {
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl TextBackend for MockBackend {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        _params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Network("no more mock responses".to_string())))
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A mutation a workflow asked the repository for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VcsCall {
    StageFiles(Vec<PathBuf>),
    StageAll,
    Commit(String),
    Tag { name: String, message: String },
}

#[derive(Default)]
struct RepoState {
    log: Vec<String>,
    branch: Option<String>,
    status: String,
    diff: String,
    last_tag: Option<String>,
    tags: Vec<TagRecord>,
    fail_commit: bool,
    calls: Vec<VcsCall>,
}

/// In-memory repository implementing both VCS seams.
///
/// Clones share state, so a test keeps one clone to inspect the recorded
/// [`VcsCall`]s after handing another to a workflow.
#[derive(Clone, Default)]
pub(crate) struct MockRepo {
    state: Arc<Mutex<RepoState>>,
}

impl MockRepo {
    pub(crate) fn new() -> Self {
        let repo = Self::default();
        repo.state.lock().unwrap().branch = Some("main".to_string());
        repo
    }

    pub(crate) fn with_log(self, entries: &[&str]) -> Self {
        self.state.lock().unwrap().log = entries.iter().map(|e| (*e).to_string()).collect();
        self
    }

    /// `None` makes the branch lookup fail, as on a detached HEAD.
    pub(crate) fn with_branch(self, branch: Option<&str>) -> Self {
        self.state.lock().unwrap().branch = branch.map(str::to_string);
        self
    }

    pub(crate) fn with_changes(self, status: &str, diff: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.status = status.to_string();
            state.diff = diff.to_string();
        }
        self
    }

    pub(crate) fn with_last_tag(self, tag: &str) -> Self {
        self.state.lock().unwrap().last_tag = Some(tag.to_string());
        self
    }

    pub(crate) fn with_tags(self, tags: &[(&str, &str)]) -> Self {
        self.state.lock().unwrap().tags = tags
            .iter()
            .map(|(name, date)| TagRecord {
                name: (*name).to_string(),
                date: DateTime::parse_from_rfc3339(date).unwrap(),
            })
            .collect();
        self
    }

    pub(crate) fn failing_commits(self) -> Self {
        self.state.lock().unwrap().fail_commit = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<VcsCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: VcsCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl VcsReader for MockRepo {
    fn log_since(&self, _last_tag: Option<&str>) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().log.clone())
    }

    fn current_branch_name(&self) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .branch
            .clone()
            .ok_or_else(|| anyhow!("HEAD is detached"))
    }

    fn status_summary(&self, _staged_only: bool) -> Result<String> {
        Ok(self.state.lock().unwrap().status.clone())
    }

    fn diff_text(&self, _staged_only: bool) -> Result<String> {
        Ok(self.state.lock().unwrap().diff.clone())
    }

    fn last_tag(&self) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().last_tag.clone())
    }

    fn tags_with_dates(&self) -> Result<Vec<TagRecord>> {
        Ok(self.state.lock().unwrap().tags.clone())
    }
}

impl VcsWriter for MockRepo {
    fn stage_files(&self, paths: &[PathBuf]) -> Result<()> {
        self.record(VcsCall::StageFiles(paths.to_vec()));
        Ok(())
    }

    fn stage_all(&self) -> Result<()> {
        self.record(VcsCall::StageAll);
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String> {
        if self.state.lock().unwrap().fail_commit {
            anyhow::bail!("index is locked");
        }
        self.record(VcsCall::Commit(message.to_string()));
        Ok("0123456789abcdef0123456789abcdef01234567".to_string())
    }

    fn create_annotated_tag(&self, name: &str, message: &str) -> Result<()> {
        self.record(VcsCall::Tag {
            name: name.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// Version store holding one version in memory.
#[derive(Clone, Default)]
pub(crate) struct MockVersionStore {
    current: Arc<Mutex<Option<SemVer>>>,
    writes: Arc<Mutex<Vec<SemVer>>>,
}

impl MockVersionStore {
    /// `None` makes reads fail as if no manifest declared a version.
    pub(crate) fn new(current: Option<SemVer>) -> Self {
        Self {
            current: Arc::new(Mutex::new(current)),
            writes: Arc::default(),
        }
    }

    pub(crate) fn writes(&self) -> Vec<SemVer> {
        self.writes.lock().unwrap().clone()
    }
}

impl VersionFileStore for MockVersionStore {
    fn read_current_version(&self) -> Result<SemVer> {
        self.current
            .lock()
            .unwrap()
            .ok_or_else(|| anyhow!("Could not find a version in any project file"))
    }

    fn write_version(&self, version: SemVer) -> Result<Vec<PathBuf>> {
        *self.current.lock().unwrap() = Some(version);
        self.writes.lock().unwrap().push(version);
        Ok(vec![PathBuf::from("Cargo.toml")])
    }
}

/// A file a [`MockReleaseFiles`] was asked to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReleaseFileCall {
    Notes(String),
    Changelog {
        version: SemVer,
        date: NaiveDate,
        entry: String,
    },
}

/// Release file writer that records instead of writing.
#[derive(Clone, Default)]
pub(crate) struct MockReleaseFiles {
    calls: Arc<Mutex<Vec<ReleaseFileCall>>>,
}

impl MockReleaseFiles {
    pub(crate) fn calls(&self) -> Vec<ReleaseFileCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl ReleaseFileWriter for MockReleaseFiles {
    fn write_release_notes(&self, notes: &str) -> Result<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push(ReleaseFileCall::Notes(notes.to_string()));
        Ok(PathBuf::from("release-notes.md"))
    }

    fn update_changelog(&self, version: SemVer, date: NaiveDate, entry: &str) -> Result<PathBuf> {
        self.calls.lock().unwrap().push(ReleaseFileCall::Changelog {
            version,
            date,
            entry: entry.to_string(),
        });
        Ok(PathBuf::from("CHANGELOG.md"))
    }
}
