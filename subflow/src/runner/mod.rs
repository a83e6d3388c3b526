//! The subscription runner.
//!
//! A [`SubscriptionRunner`] owns a set of subscriptions. Each subscription
//! pairs a [`Source`] with an [`OrderedPipeline`] and a [`Sink`] and runs as
//! its own tokio task (the *pump*). [`SubscriptionRunner::run`] supervises the
//! pumps: it reaps them as they finish, logs normal completions, and either
//! logs or escalates failures.
//!
//! ```rust,ignore
//! let runner = SubscriptionRunner::default();
//! runner.subscribe(
//!     IntervalSource::new(Duration::from_secs(86_400), "trending"),
//!     trending_watcher(fetcher, model)?,
//!     Arc::new(LoggingSink),
//! )?;
//! runner.run(true).await?;
//! ```

mod config;
mod pump;
mod record;


pub use config::{RunnerConfig, SubscriptionOptions, POLL_INTERVAL_ENV, SHUTDOWN_TIMEOUT_ENV};
pub use record::{PumpReport, ReapOutcome, SubscriptionKey};

use crate::cancellation::CancellationToken;
use crate::core::TaskState;
use crate::errors::{Result, SubflowError};
use crate::events::{names, EventSink, NoOpEventSink};
use crate::pipeline::OrderedPipeline;
use crate::sink::Sink;
use crate::source::Source;
use chrono::Utc;
use parking_lot::Mutex;
use pump::Pump;
use record::TaskRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Runs subscriptions concurrently and supervises them.
///
/// All methods take `&self`, so a runner shared through an `Arc` can be
/// subscribed to and unsubscribed from while [`run`](Self::run) is executing.
pub struct SubscriptionRunner {
    config: RunnerConfig,
    tasks: Mutex<HashMap<SubscriptionKey, TaskRecord>>,
    events: Arc<dyn EventSink>,
    root: CancellationToken,
    stopped: AtomicBool,
    wake: Arc<Notify>,
}

impl Default for SubscriptionRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl SubscriptionRunner {
    /// Creates an empty runner.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            tasks: Mutex::new(HashMap::new()),
            events: Arc::new(NoOpEventSink),
            root: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Sets the sink for subscription events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the runner configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Starts a subscription under a generated key and returns the key.
    ///
    /// The pump is spawned immediately; this call does not wait for any
    /// item to be processed.
    ///
    /// # Errors
    ///
    /// Returns [`SubflowError::Internal`] outside a tokio runtime.
    pub fn subscribe(
        &self,
        source: impl Source + 'static,
        pipeline: OrderedPipeline,
        sink: Arc<dyn Sink>,
    ) -> Result<SubscriptionKey> {
        self.subscribe_with(None, SubscriptionOptions::default(), source, pipeline, sink)
    }

    /// Starts a subscription under a caller-chosen key.
    ///
    /// # Errors
    ///
    /// Returns [`SubflowError::AlreadySubscribed`] if the key is active. The
    /// existing subscription is left untouched.
    pub fn subscribe_as(
        &self,
        key: impl Into<SubscriptionKey>,
        source: impl Source + 'static,
        pipeline: OrderedPipeline,
        sink: Arc<dyn Sink>,
    ) -> Result<SubscriptionKey> {
        self.subscribe_with(
            Some(key.into()),
            SubscriptionOptions::default(),
            source,
            pipeline,
            sink,
        )
    }

    /// Starts a subscription with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`SubflowError::AlreadySubscribed`] for an active key and
    /// [`SubflowError::Internal`] outside a tokio runtime.
    pub fn subscribe_with(
        &self,
        key: Option<SubscriptionKey>,
        options: SubscriptionOptions,
        source: impl Source + 'static,
        pipeline: OrderedPipeline,
        sink: Arc<dyn Sink>,
    ) -> Result<SubscriptionKey> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SubflowError::Internal(format!("subscribe needs a tokio runtime: {e}")))?;
        let key = key.unwrap_or_else(|| SubscriptionKey::generate(pipeline.name()));

        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&key) {
            return Err(SubflowError::AlreadySubscribed(key));
        }

        let task_name = format!("Subscription-{key}");
        let pipeline_name = pipeline.name().to_string();
        let token = self.root.child_token();
        let state = Arc::new(Mutex::new(TaskState::Running));
        let pump = Pump {
            key: key.clone(),
            source: Box::new(source),
            pipeline,
            sink,
            token: token.clone(),
            events: self.events.clone(),
            max_items: options.max_items,
        };

        let wake = self.wake.clone();
        let task_state = state.clone();
        let handle = runtime.spawn(async move {
            let result = pump.run().await;
            *task_state.lock() = match &result {
                Ok(_) => TaskState::Completed,
                Err(e) if e.is_cancelled() => TaskState::Cancelled,
                Err(_) => TaskState::Failed,
            };
            wake.notify_waiters();
            result
        });

        let record = TaskRecord {
            task_name,
            pipeline: pipeline_name,
            token,
            handle,
            state,
            started_at: Utc::now(),
        };
        info!(key = %key, task = %record.task_name, pipeline = %record.pipeline, "subscription started");
        self.events.try_emit(
            names::SUBSCRIPTION_STARTED,
            Some(serde_json::json!({
                "key": key.as_str(),
                "task_name": record.task_name,
                "pipeline": record.pipeline,
                "started_at": record.started_at.to_rfc3339(),
                "max_items": options.max_items,
            })),
        );
        tasks.insert(key.clone(), record);
        Ok(key)
    }

    /// Cancels a subscription and forgets it.
    ///
    /// The pump stops at its next suspension point; an item still inside the
    /// pipeline is not delivered.
    ///
    /// # Errors
    ///
    /// Returns [`SubflowError::SubscriptionNotFound`] if no subscription has
    /// this key.
    pub fn unsubscribe(&self, key: &SubscriptionKey) -> Result<()> {
        let record = self
            .tasks
            .lock()
            .remove(key)
            .ok_or_else(|| SubflowError::SubscriptionNotFound(key.clone()))?;

        record.token.cancel("unsubscribed");
        info!(key = %key, task = %record.task_name, "subscription cancelled");
        self.events.try_emit(
            names::SUBSCRIPTION_CANCELLED,
            Some(serde_json::json!({
                "key": key.as_str(),
                "task_name": record.task_name,
                "reason": "unsubscribed",
            })),
        );
        Ok(())
    }

    /// Removes one finished subscription, if any, and classifies it.
    ///
    /// Returns `None` when every subscription is still running.
    pub async fn reap_finished(&self) -> Option<ReapOutcome> {
        let (key, record) = {
            let mut tasks = self.tasks.lock();
            let key = tasks
                .iter()
                .find(|(_, record)| record.is_finished())
                .map(|(key, _)| key.clone())?;
            let record = tasks.remove(&key)?;
            (key, record)
        };

        let TaskRecord {
            task_name,
            pipeline,
            handle,
            token,
            ..
        } = record;
        let outcome = ReapOutcome::classify(key, task_name, handle.await);
        // Lets the root token prune it.
        token.cancel("reaped");
        self.emit_outcome(&outcome, &pipeline);
        Some(outcome)
    }

    /// Supervises the subscriptions until [`stop`](Self::stop) is called.
    ///
    /// Finished pumps are reaped one at a time. A normal completion is
    /// logged as a warning. A failure is logged and skipped, or, when
    /// `raise_on_failure` is set, cancels every remaining subscription and is
    /// returned unchanged. When nothing has finished the loop sleeps for the
    /// configured poll interval; a finishing pump or `stop` wakes it early.
    ///
    /// A `stop` issued before `run` is called makes `run` return at once.
    ///
    /// # Errors
    ///
    /// Returns the failed subscription's error when `raise_on_failure` is
    /// set.
    pub async fn run(&self, raise_on_failure: bool) -> Result<()> {
        info!(
            subscriptions = self.len(),
            raise_on_failure,
            poll_interval_ms = self.config.poll_interval_ms,
            "runner started"
        );

        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.stopped.swap(false, Ordering::SeqCst) {
                info!(subscriptions = self.len(), "runner stopped");
                return Ok(());
            }

            let Some(outcome) = self.reap_finished().await else {
                tokio::select! {
                    () = notified.as_mut() => {}
                    () = tokio::time::sleep(self.config.poll_interval()) => {}
                }
                continue;
            };

            match outcome.state {
                TaskState::Completed => {
                    warn!(
                        key = %outcome.key,
                        task = %outcome.task_name,
                        "Task {} has completed. If this is unexpected, check the source",
                        outcome.task_name
                    );
                }
                TaskState::Failed if raise_on_failure => {
                    let err = outcome.error.unwrap_or_else(|| {
                        SubflowError::Internal(format!("{} failed", outcome.task_name))
                    });
                    error!(key = %outcome.key, task = %outcome.task_name, error = %err, "escalating task failure");
                    self.cancel_all("escalated failure");
                    return Err(err);
                }
                TaskState::Failed => {
                    let err = outcome
                        .error
                        .as_ref()
                        .map_or_else(|| "unknown".to_string(), ToString::to_string);
                    error!(key = %outcome.key, task = %outcome.task_name, error = %err, "Task {} run error", outcome.task_name);
                }
                TaskState::Cancelled | TaskState::Running => {
                    debug!(key = %outcome.key, state = %outcome.state, "reaped task");
                }
            }
        }
    }

    /// Ends [`run`](Self::run). Subscriptions keep running.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    /// Cancels every subscription and waits for the pumps to exit.
    ///
    /// A pump that does not exit within the shutdown timeout is aborted.
    pub async fn shutdown(&self) -> Vec<ReapOutcome> {
        let records: Vec<(SubscriptionKey, TaskRecord)> = self.tasks.lock().drain().collect();
        for (_, record) in &records {
            record.token.cancel("shutdown");
        }

        let mut outcomes = Vec::with_capacity(records.len());
        for (key, record) in records {
            let TaskRecord {
                task_name,
                pipeline,
                mut handle,
                ..
            } = record;
            let joined = match tokio::time::timeout(self.config.shutdown_timeout(), &mut handle).await
            {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(key = %key, task = %task_name, "pump did not stop in time, aborting");
                    handle.abort();
                    handle.await
                }
            };
            let outcome = ReapOutcome::classify(key, task_name, joined);
            self.emit_outcome(&outcome, &pipeline);
            outcomes.push(outcome);
        }
        info!(stopped = outcomes.len(), "runner shut down");
        outcomes
    }

    /// Number of tracked subscriptions, finished but unreaped ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Returns true if no subscription is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Returns true if `key` is tracked.
    #[must_use]
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.tasks.lock().contains_key(key)
    }

    /// Returns the tracked keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.tasks.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the state of a tracked subscription.
    ///
    /// A pump that ended by panicking reports [`TaskState::Failed`].
    #[must_use]
    pub fn state(&self, key: &SubscriptionKey) -> Option<TaskState> {
        let tasks = self.tasks.lock();
        let record = tasks.get(key)?;
        let state = *record.state.lock();
        Some(if state == TaskState::Running && record.is_finished() {
            TaskState::Failed
        } else {
            state
        })
    }

    fn cancel_all(&self, reason: &str) {
        let records: Vec<(SubscriptionKey, TaskRecord)> = self.tasks.lock().drain().collect();
        for (key, record) in records {
            record.token.cancel(reason);
            self.events.try_emit(
                names::SUBSCRIPTION_CANCELLED,
                Some(serde_json::json!({
                    "key": key.as_str(),
                    "task_name": record.task_name,
                    "reason": reason,
                })),
            );
        }
    }

    fn emit_outcome(&self, outcome: &ReapOutcome, pipeline: &str) {
        let (event, detail) = match outcome.state {
            TaskState::Completed => (
                names::SUBSCRIPTION_COMPLETED,
                serde_json::json!(outcome.report),
            ),
            TaskState::Cancelled => (
                names::SUBSCRIPTION_CANCELLED,
                serde_json::json!(outcome.error.as_ref().map(ToString::to_string)),
            ),
            TaskState::Failed | TaskState::Running => (
                names::SUBSCRIPTION_FAILED,
                serde_json::json!(outcome.error.as_ref().map(ToString::to_string)),
            ),
        };
        self.events.try_emit(
            event,
            Some(serde_json::json!({
                "key": outcome.key.as_str(),
                "task_name": outcome.task_name,
                "pipeline": pipeline,
                "detail": detail,
            })),
        );
    }
}

impl std::fmt::Debug for SubscriptionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRunner")
            .field("config", &self.config)
            .field("subscriptions", &self.keys())
            .finish()
    }
}

impl Drop for SubscriptionRunner {
    fn drop(&mut self) {
        self.root.cancel("runner dropped");
    }
}
