//! Mock stages and sinks for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::core::Message;
use crate::errors::{SinkError, StageError};
use crate::sink::Sink;
use crate::stages::{FnStage, Stage};

/// A stage that records its inputs and returns a configurable output.
///
/// Without a configured output it echoes its input.
#[derive(Debug)]
pub struct MockStage {
    name: String,
    output: Mutex<Option<serde_json::Value>>,
    inputs: Mutex<Vec<serde_json::Value>>,
}

impl MockStage {
    /// Creates an echoing mock stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Makes the stage return `value` for every input.
    #[must_use]
    pub fn returning(self, value: serde_json::Value) -> Self {
        *self.output.lock() = Some(value);
        self
    }

    /// Returns the number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Returns the payload of every input, in call order.
    #[must_use]
    pub fn inputs(&self) -> Vec<serde_json::Value> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, input: &Message) -> Result<serde_json::Value, StageError> {
        self.inputs.lock().push(input.content.clone());
        Ok(self
            .output
            .lock()
            .clone()
            .unwrap_or_else(|| input.content.clone()))
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    message: String,
}

impl FailingStage {
    /// Creates a failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, _input: &Message) -> Result<serde_json::Value, StageError> {
        Err(StageError::new(&self.name, &self.message))
    }
}

/// A stage that sleeps before echoing its input.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    started: Mutex<usize>,
}

impl SlowStage {
    /// Creates a slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            started: Mutex::new(0),
        }
    }

    /// Number of inputs the stage started on.
    #[must_use]
    pub fn started(&self) -> usize {
        *self.started.lock()
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, input: &Message) -> Result<serde_json::Value, StageError> {
        *self.started.lock() += 1;
        tokio::time::sleep(self.delay).await;
        Ok(input.content.clone())
    }
}

/// `x -> 2x` over integer payloads.
#[must_use]
pub fn double() -> Arc<dyn Stage> {
    Arc::new(FnStage::new("double", |v| {
        v.as_i64()
            .map(|n| serde_json::json!(n * 2))
            .ok_or_else(|| StageError::new("double", format!("expected an integer, got {v}")))
    }))
}

/// `x -> x + 1` over integer payloads.
#[must_use]
pub fn increment() -> Arc<dyn Stage> {
    Arc::new(FnStage::new("increment", |v| {
        v.as_i64()
            .map(|n| serde_json::json!(n + 1))
            .ok_or_else(|| StageError::new("increment", format!("expected an integer, got {v}")))
    }))
}

/// A sink that records every delivered output.
#[derive(Debug, Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Message>>,
    notify: Notify,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the delivered messages.
    #[must_use]
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    /// Returns the payloads of the delivered messages, in delivery order.
    #[must_use]
    pub fn contents(&self) -> Vec<serde_json::Value> {
        self.received.lock().iter().map(|m| m.content.clone()).collect()
    }

    /// Number of deliveries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    /// Returns true if nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.received.lock().is_empty()
    }

    /// Waits until at least `n` outputs arrived. Returns false on timeout.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.len() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn deliver(&self, output: Message) -> Result<(), SinkError> {
        self.received.lock().push(output);
        self.notify.notify_waiters();
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// A sink that always fails.
#[derive(Debug)]
pub struct FailingSink {
    message: String,
}

impl FailingSink {
    /// Creates a failing sink.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Sink for FailingSink {
    async fn deliver(&self, _output: Message) -> Result<(), SinkError> {
        Err(SinkError::new(self.name(), &self.message))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
