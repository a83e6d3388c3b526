//! Fluent builder for ordered pipelines.

use super::OrderedPipeline;
use crate::errors::PipelineValidationError;
use crate::events::EventSink;
use crate::stages::Stage;
use std::sync::Arc;

/// Builder for [`OrderedPipeline`]. Stages run in the order they are added.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    events: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            events: None,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a stage by value.
    #[must_use]
    pub fn then<S: Stage + 'static>(self, stage: S) -> Self {
        self.stage(Arc::new(stage))
    }

    /// Sets the event sink for stage events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if no stage was added or two stages share a name.
    pub fn build(self) -> Result<OrderedPipeline, PipelineValidationError> {
        let pipeline = OrderedPipeline::new(self.name, self.stages)?;
        Ok(match self.events {
            Some(events) => pipeline.with_event_sink(events),
            None => pipeline,
        })
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Message;
    use crate::stages::IdentityStage;
    use crate::testing::{double, increment};
    use serde_json::json;

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::new("test");
        assert_eq!(builder.name(), "test");
        assert_eq!(builder.stage_count(), 0);
    }

    #[test]
    fn test_builder_empty_build() {
        let err = PipelineBuilder::new("test").build().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-EMPTY"));
    }

    #[tokio::test]
    async fn test_builder_allows_repeated_stage() {
        let pipeline = PipelineBuilder::new("quad")
            .stage(double())
            .stage(double())
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["double", "double"]);
        let outcome = pipeline.run(Message::new(json!(5))).await.unwrap();
        assert_eq!(outcome.output.content, json!(20));
    }

    #[tokio::test]
    async fn test_builder_preserves_order() {
        let pipeline = PipelineBuilder::new("arith")
            .stage(double())
            .stage(increment())
            .then(IdentityStage::new("echo"))
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["double", "increment", "echo"]);
        let outcome = pipeline.run(Message::new(json!(5))).await.unwrap();
        assert_eq!(outcome.output.content, json!(11));
    }
}
