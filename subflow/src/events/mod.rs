//! Lifecycle events for observability.
//!
//! The executor and the subscription runner report what they do through an
//! [`EventSink`]. Event names are dotted strings; the ones emitted by this
//! crate are listed in [`names`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// Event names emitted by the executor and the runner.
pub mod names {
    /// A stage is about to process its input.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage produced an output.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage raised.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A pipeline run produced its final output.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A pump task was spawned.
    pub const SUBSCRIPTION_STARTED: &str = "subscription.started";
    /// A pump task ended normally and was reaped.
    pub const SUBSCRIPTION_COMPLETED: &str = "subscription.completed";
    /// A pump task ended with an error and was reaped.
    pub const SUBSCRIPTION_FAILED: &str = "subscription.failed";
    /// A subscription was cancelled.
    pub const SUBSCRIPTION_CANCELLED: &str = "subscription.cancelled";
    /// A pipeline output reached the sink.
    pub const ITEM_DELIVERED: &str = "item.delivered";
}
