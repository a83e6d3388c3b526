//! Stage trait and implementations.
//!
//! Stages are the units of work an [`OrderedPipeline`](crate::pipeline::OrderedPipeline)
//! runs in sequence. Every stage has the same shape: it receives one
//! [`Message`] and produces one JSON value. Which message it receives is a
//! property of the stage ([`InputMode`]), not a decision of the executor.

use crate::core::Message;
use crate::errors::StageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// What a stage receives as its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// The most recent history entry (the original item for the first stage).
    #[default]
    Previous,
    /// An empty marker message. Used by pure producers such as crawlers.
    Detached,
}

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns what this stage expects as input.
    fn input_mode(&self) -> InputMode {
        InputMode::Previous
    }

    /// Processes one input.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] when the stage or its collaborator fails.
    /// The executor propagates it unmodified and stops the run.
    async fn process(&self, input: &Message) -> Result<serde_json::Value, StageError>;
}

/// A simple function-based stage over the input payload.
pub struct FnStage<F>
where
    F: Fn(&serde_json::Value) -> Result<serde_json::Value, StageError> + Send + Sync,
{
    name: String,
    input_mode: InputMode,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&serde_json::Value) -> Result<serde_json::Value, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            input_mode: InputMode::Previous,
            func,
        }
    }

    /// Sets the input mode.
    #[must_use]
    pub fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&serde_json::Value) -> Result<serde_json::Value, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("input_mode", &self.input_mode)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&serde_json::Value) -> Result<serde_json::Value, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    async fn process(&self, input: &Message) -> Result<serde_json::Value, StageError> {
        (self.func)(input.content())
    }
}

/// An async function-based stage.
pub struct AsyncFnStage<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, StageError>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStage<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, StageError>> + Send,
{
    /// Creates a new async function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStage<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, StageError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> Stage for AsyncFnStage<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, StageError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, input: &Message) -> Result<serde_json::Value, StageError> {
        (self.func)(input.clone()).await
    }
}

/// A stage that returns its input unchanged.
#[derive(Debug, Clone)]
pub struct IdentityStage {
    name: String,
}

impl IdentityStage {
    /// Creates a new identity stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for IdentityStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, input: &Message) -> Result<serde_json::Value, StageError> {
        Ok(input.content().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("double", |v| {
            v.as_i64()
                .map(|n| json!(n * 2))
                .ok_or_else(|| StageError::new("double", "not a number"))
        });

        assert_eq!(stage.name(), "double");
        assert_eq!(stage.input_mode(), InputMode::Previous);
        assert_eq!(stage.process(&Message::new(json!(5))).await.unwrap(), json!(10));

        let err = stage.process(&Message::text("x")).await.unwrap_err();
        assert_eq!(err.message, "not a number");
    }

    #[tokio::test]
    async fn test_fn_stage_detached() {
        let stage = FnStage::new("produce", |_| Ok(json!("fresh"))).with_input_mode(InputMode::Detached);
        assert_eq!(stage.input_mode(), InputMode::Detached);
    }

    #[tokio::test]
    async fn test_async_fn_stage() {
        let stage = AsyncFnStage::new("shout", |msg: Message| async move {
            tokio::task::yield_now().await;
            Ok::<_, StageError>(json!(msg.as_text().to_uppercase()))
        });

        let out = stage.process(&Message::text("hi")).await.unwrap();
        assert_eq!(out, json!("HI"));
    }

    #[tokio::test]
    async fn test_identity_stage() {
        let stage = IdentityStage::new("echo");
        let out = stage.process(&Message::new(json!([1, 2]))).await.unwrap();
        assert_eq!(out, json!([1, 2]));
    }
}
