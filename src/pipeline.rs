//! Sequential stage execution over an owned context.
//!
//! A stage consumes the context and returns its replacement. Two failure
//! channels exist: a business failure is recorded on the context (see
//! [`PipelineContext::error`]) and every later stage passes the context
//! through untouched, while a stage returning `Err` aborts the run with
//! [`PipelineError::StageFailed`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures that abort a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage could not produce a context at all.
    #[error("Stage '{stage}' failed")]
    StageFailed {
        /// Name of the failing stage.
        stage: String,
        /// What went wrong.
        #[source]
        source: anyhow::Error,
    },
}

/// State threaded through a pipeline.
pub trait PipelineContext: Send + 'static {
    /// The business error recorded by an earlier stage, if any.
    fn error(&self) -> Option<&str>;
}

/// One step of a pipeline.
///
/// Stages that see [`PipelineContext::error`] set must return the context
/// unchanged; the executor never skips a stage on their behalf.
pub trait Stage<C>: Send + Sync {
    /// Stable name used in logs, timings and errors.
    fn name(&self) -> &'static str;

    /// Runs the stage.
    fn run(&self, ctx: C) -> BoxFuture<'_, anyhow::Result<C>>;
}

/// What an observer learns after a stage returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutcome<'a> {
    /// Stage name.
    pub stage: &'a str,
    /// Zero-based position in the pipeline.
    pub index: usize,
    /// Wall-clock time spent in the stage.
    pub elapsed: Duration,
    /// Whether the returned context carries an error.
    pub had_error: bool,
    /// Whether the stage returned `Err`.
    pub failed: bool,
}

/// Watches stage execution without touching the context.
pub trait StageObserver: Send + Sync {
    /// Called before a stage runs.
    fn before_stage(&self, _stage: &str, _index: usize, _total: usize) {}

    /// Called after a stage returns, successfully or not.
    fn after_stage(&self, _outcome: &StageOutcome<'_>) {}
}

impl<T: StageObserver + ?Sized> StageObserver for Box<T> {
    fn before_stage(&self, stage: &str, index: usize, total: usize) {
        (**self).before_stage(stage, index, total);
    }

    fn after_stage(&self, outcome: &StageOutcome<'_>) {
        (**self).after_stage(outcome);
    }
}

/// Logs every stage through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn before_stage(&self, stage: &str, index: usize, total: usize) {
        debug!(stage, step = index + 1, total, "Stage starting");
    }

    fn after_stage(&self, outcome: &StageOutcome<'_>) {
        let elapsed_ms = outcome.elapsed.as_secs_f64() * 1000.0;
        if outcome.failed {
            warn!(stage = outcome.stage, elapsed_ms, "Stage failed");
        } else {
            info!(
                stage = outcome.stage,
                elapsed_ms,
                had_error = outcome.had_error,
                "Stage finished"
            );
        }
    }
}

/// Timing record for one stage invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTiming {
    /// Stage name.
    pub stage: String,
    /// Time spent in the stage.
    pub elapsed: Duration,
    /// Whether the context carried an error afterwards, or the stage failed.
    pub had_error: bool,
}

/// Records a [`StageTiming`] per stage invocation.
///
/// The observer is moved into the pipeline; keep a [`TimingHandle`] to read
/// the timings afterwards.
#[derive(Debug, Clone, Default)]
pub struct TimingObserver {
    timings: Arc<Mutex<Vec<StageTiming>>>,
}

impl TimingObserver {
    /// Creates an observer with no recorded timings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle sharing this observer's records.
    pub fn handle(&self) -> TimingHandle {
        TimingHandle {
            timings: Arc::clone(&self.timings),
        }
    }
}

impl StageObserver for TimingObserver {
    fn after_stage(&self, outcome: &StageOutcome<'_>) {
        self.timings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StageTiming {
                stage: outcome.stage.to_string(),
                elapsed: outcome.elapsed,
                had_error: outcome.had_error || outcome.failed,
            });
    }
}

/// Shared read access to a [`TimingObserver`]'s records.
#[derive(Debug, Clone)]
pub struct TimingHandle {
    timings: Arc<Mutex<Vec<StageTiming>>>,
}

impl TimingHandle {
    /// Every recorded timing, in execution order.
    pub fn timings(&self) -> Vec<StageTiming> {
        self.timings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the stages that ran, in order.
    pub fn stage_names(&self) -> Vec<String> {
        self.timings().into_iter().map(|t| t.stage).collect()
    }
}

/// An ordered list of stages plus observers.
pub struct Pipeline<C> {
    stages: Vec<Box<dyn Stage<C>>>,
    observers: Vec<Box<dyn StageObserver>>,
}

impl<C: PipelineContext> Default for Pipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PipelineContext> Pipeline<C> {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage<C> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Adds an observer.
    #[must_use]
    pub fn observe(mut self, observer: impl StageObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage in order and returns the final context.
    pub async fn run(&self, initial: C) -> Result<C, PipelineError> {
        let total = self.stages.len();
        let mut ctx = initial;

        for (index, stage) in self.stages.iter().enumerate() {
            let name = stage.name();
            for observer in &self.observers {
                observer.before_stage(name, index, total);
            }

            let started = Instant::now();
            let result = stage.run(ctx).await;
            let outcome = StageOutcome {
                stage: name,
                index,
                elapsed: started.elapsed(),
                had_error: result.as_ref().is_ok_and(|c| c.error().is_some()),
                failed: result.is_err(),
            };
            for observer in &self.observers {
                observer.after_stage(&outcome);
            }

            ctx = result.map_err(|source| PipelineError::StageFailed {
                stage: name.to_string(),
                source,
            })?;
        }

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Tally {
        steps: Vec<&'static str>,
        error: Option<String>,
    }

    impl PipelineContext for Tally {
        fn error(&self) -> Option<&str> {
            self.error.as_deref()
        }
    }

    /// Appends its name unless an error is already recorded.
    struct Push(&'static str);

    impl Stage<Tally> for Push {
        fn name(&self) -> &'static str {
            self.0
        }

        fn run(&self, ctx: Tally) -> BoxFuture<'_, anyhow::Result<Tally>> {
            Box::pin(async move {
                if ctx.error.is_some() {
                    return Ok(ctx);
                }
                let mut steps = ctx.steps;
                steps.push(self.0);
                Ok(Tally { steps, ..ctx })
            })
        }
    }

    /// Records a business error unless one is already set.
    struct Reject(&'static str);

    impl Stage<Tally> for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn run(&self, ctx: Tally) -> BoxFuture<'_, anyhow::Result<Tally>> {
            Box::pin(async move {
                if ctx.error.is_some() {
                    return Ok(ctx);
                }
                Ok(Tally {
                    error: Some(self.0.to_string()),
                    ..ctx
                })
            })
        }
    }

    struct Explode;

    impl Stage<Tally> for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn run(&self, _ctx: Tally) -> BoxFuture<'_, anyhow::Result<Tally>> {
            Box::pin(async { anyhow::bail!("disk on fire") })
        }
    }

    #[tokio::test]
    async fn runs_stages_in_order() -> anyhow::Result<()> {
        let pipeline = Pipeline::new().stage(Push("a")).stage(Push("b")).stage(Push("c"));
        assert_eq!(pipeline.stage_names(), ["a", "b", "c"]);

        let ctx = pipeline.run(Tally::default()).await?;
        assert_eq!(ctx.steps, ["a", "b", "c"]);
        assert!(ctx.error.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn empty_pipeline_returns_input() -> anyhow::Result<()> {
        let ctx = Pipeline::<Tally>::new().run(Tally::default()).await?;
        assert!(ctx.steps.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn first_error_is_kept_and_later_stages_pass_through() -> anyhow::Result<()> {
        let timing = TimingObserver::new();
        let handle = timing.handle();
        let pipeline = Pipeline::new()
            .stage(Push("a"))
            .stage(Reject("first"))
            .stage(Push("b"))
            .stage(Reject("second"))
            .observe(timing);

        let ctx = pipeline.run(Tally::default()).await?;
        assert_eq!(ctx.steps, ["a"]);
        assert_eq!(ctx.error.as_deref(), Some("first"));

        // every stage still ran
        let timings = handle.timings();
        assert_eq!(handle.stage_names(), ["a", "reject", "b", "reject"]);
        let flags: Vec<bool> = timings.iter().map(|t| t.had_error).collect();
        assert_eq!(flags, [false, true, true, true]);
        Ok(())
    }

    #[tokio::test]
    async fn stage_failure_aborts_run() {
        let timing = TimingObserver::new();
        let handle = timing.handle();
        let pipeline = Pipeline::new()
            .stage(Push("a"))
            .stage(Explode)
            .stage(Push("never"))
            .observe(timing)
            .observe(TracingObserver);

        let err = pipeline.run(Tally::default()).await.unwrap_err();
        let PipelineError::StageFailed { stage, source } = err;
        assert_eq!(stage, "explode");
        assert_eq!(source.to_string(), "disk on fire");
        assert_eq!(handle.stage_names(), ["a", "explode"]);
        assert!(handle.timings()[1].had_error);
    }

    #[test]
    fn stage_failed_display_names_stage() {
        let err = PipelineError::StageFailed {
            stage: "create-commit".to_string(),
            source: anyhow::anyhow!("index locked"),
        };
        assert_eq!(err.to_string(), "Stage 'create-commit' failed");
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string),
            Some("index locked".to_string())
        );
    }

    struct Counting(Arc<Mutex<Vec<String>>>);

    impl StageObserver for Counting {
        fn before_stage(&self, stage: &str, index: usize, total: usize) {
            self.0.lock().unwrap().push(format!("before {stage} {index}/{total}"));
        }

        fn after_stage(&self, outcome: &StageOutcome<'_>) {
            self.0.lock().unwrap().push(format!("after {}", outcome.stage));
        }
    }

    #[tokio::test]
    async fn observers_see_both_hooks() -> anyhow::Result<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        Pipeline::new()
            .stage(Push("x"))
            .stage(Push("y"))
            .observe(Counting(Arc::clone(&log)))
            .run(Tally::default())
            .await?;
        assert_eq!(
            *log.lock().unwrap(),
            ["before x 0/2", "after x", "before y 1/2", "after y"]
        );
        Ok(())
    }
}
