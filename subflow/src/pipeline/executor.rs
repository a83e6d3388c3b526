//! Ordered pipeline executor.
//!
//! Stages run strictly by order: the next stage is always the one after the
//! last stage that ran. There is no branching, skipping or retry.

use super::History;
use crate::core::Message;
use crate::errors::{PipelineValidationError, Result, StageError};
use crate::events::{names, EventSink, NoOpEventSink};
use crate::observability::SpanTimer;
use crate::stages::{InputMode, Stage};
use std::sync::Arc;
use tracing::{debug, warn};

/// A fixed, non-empty, ordered list of stages.
///
/// The stage list is shared by every run; each run gets its own cursor and
/// [`History`]. Cloning is cheap.
#[derive(Clone)]
pub struct OrderedPipeline {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    events: Arc<dyn EventSink>,
}

/// Result of running a pipeline to the end over one item.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The final output (the last history entry).
    pub output: Message,
    /// Every entry produced during the run, input first.
    pub history: History,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
}

impl OrderedPipeline {
    /// Creates a pipeline from an ordered stage list.
    ///
    /// # Errors
    ///
    /// Fails with `CONTRACT-004-EMPTY` if `stages` is empty. The same stage
    /// may appear more than once.
    pub fn new(
        name: impl Into<String>,
        stages: Vec<Arc<dyn Stage>>,
    ) -> std::result::Result<Self, PipelineValidationError> {
        let name = name.into();
        if stages.is_empty() {
            return Err(PipelineValidationError::empty(&name));
        }

        Ok(Self {
            name,
            stages,
            events: Arc::new(NoOpEventSink),
        })
    }

    /// Sets the event sink stage events are reported to.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Starts a fresh run over `input`: cursor 0, history `[input]`.
    #[must_use]
    pub fn start(&self, input: Message) -> PipelineRun<'_> {
        PipelineRun {
            pipeline: self,
            cursor: 0,
            history: History::with_input(input),
            timer: SpanTimer::start(self.name.clone()),
        }
    }

    /// Runs every stage over `input` and returns the final output.
    ///
    /// # Errors
    ///
    /// Returns the first stage's error unmodified; later stages do not run.
    pub async fn run(&self, input: Message) -> Result<PipelineOutcome> {
        self.start(input).run_to_end().await
    }
}

impl std::fmt::Debug for OrderedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedPipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// One in-progress run of an [`OrderedPipeline`] over one item.
///
/// Invariant: `0 <= cursor <= stage_count`.
#[derive(Debug)]
pub struct PipelineRun<'a> {
    pipeline: &'a OrderedPipeline,
    cursor: usize,
    history: History,
    timer: SpanTimer,
}

impl PipelineRun<'_> {
    /// Index of the next stage to run.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns true once every stage has run.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.pipeline.stages.len()
    }

    /// The entries produced so far.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Runs the stage at the cursor and returns its output.
    ///
    /// Once finished, the run holds at the terminal stage: further calls
    /// return the final output again without running anything.
    ///
    /// # Errors
    ///
    /// Returns the stage's error; the cursor stays on the failing stage.
    pub async fn step(&mut self) -> Result<Message> {
        if self.is_finished() {
            return self.terminal_output();
        }

        let index = self.cursor;
        let stage = Arc::clone(&self.pipeline.stages[index]);
        let pipeline = self.pipeline.name();
        let events = &self.pipeline.events;

        let detached;
        let input = match stage.input_mode() {
            InputMode::Previous => match self.history.latest() {
                Some(latest) => latest,
                None => return Err(empty_history(stage.name()).into()),
            },
            InputMode::Detached => {
                detached = Message::empty();
                &detached
            }
        };

        debug!(pipeline, stage = stage.name(), index, "stage started");
        events.try_emit(
            names::STAGE_STARTED,
            Some(serde_json::json!({
                "pipeline": pipeline,
                "stage": stage.name(),
                "index": index,
            })),
        );

        let timer = SpanTimer::start(stage.name());
        match stage.process(input).await {
            Ok(content) => {
                let duration_ms = timer.finish();
                debug!(pipeline, stage = stage.name(), index, duration_ms, "stage completed");
                events.try_emit(
                    names::STAGE_COMPLETED,
                    Some(serde_json::json!({
                        "pipeline": pipeline,
                        "stage": stage.name(),
                        "index": index,
                        "duration_ms": duration_ms,
                    })),
                );

                let output = Message::from_stage(stage.name(), content);
                self.history.push(output.clone());
                self.cursor += 1;
                Ok(output)
            }
            Err(err) => {
                let duration_ms = timer.finish();
                warn!(pipeline, stage = stage.name(), index, error = %err, "stage failed");
                events.try_emit(
                    names::STAGE_FAILED,
                    Some(serde_json::json!({
                        "pipeline": pipeline,
                        "stage": stage.name(),
                        "index": index,
                        "error": err.message,
                        "duration_ms": duration_ms,
                    })),
                );
                Err(err.into())
            }
        }
    }

    /// Steps until every stage has run.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first stage error.
    pub async fn run_to_end(mut self) -> Result<PipelineOutcome> {
        while !self.is_finished() {
            self.step().await?;
        }

        let output = self.terminal_output()?;
        let duration_ms = self.timer.elapsed_ms();
        self.pipeline.events.try_emit(
            names::PIPELINE_COMPLETED,
            Some(serde_json::json!({
                "pipeline": self.pipeline.name(),
                "stages": self.pipeline.stage_count(),
                "duration_ms": duration_ms,
            })),
        );

        Ok(PipelineOutcome {
            output,
            history: self.history,
            duration_ms,
        })
    }

    fn terminal_output(&self) -> Result<Message> {
        self.history
            .latest()
            .cloned()
            .ok_or_else(|| empty_history(self.pipeline.name()).into())
    }
}

fn empty_history(stage: &str) -> StageError {
    StageError::new(stage, "pipeline history is empty")
}
