//! # Subflow
//!
//! Long-lived subscriptions that connect sources of work items to ordered
//! processing pipelines and deliver the results to sinks.
//!
//! Subflow provides:
//!
//! - **Ordered pipelines**: a fixed sequence of stages, each consuming the
//!   previous stage's output and appending to a shared history
//! - **Sources and sinks**: timer, channel, stream and list sources; closure,
//!   channel, logging and fan-out sinks
//! - **Supervision**: a runner that pumps every subscription in its own task,
//!   reaps finished tasks and logs or escalates their failures
//! - **Cancellation**: cooperative cancellation that never delivers an
//!   interrupted item
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use subflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("doubler")
//!     .then(FnStage::new("double", |v| Ok(json!(v.as_i64().unwrap_or(0) * 2))))
//!     .build()?;
//!
//! let runner = SubscriptionRunner::default();
//! runner.subscribe(
//!     IntervalSource::new(Duration::from_secs(5), 21),
//!     pipeline,
//!     Arc::new(LoggingSink),
//! )?;
//! runner.run(true).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod runner;
pub mod sink;
pub mod source;
pub mod stages;
pub mod testing;
pub mod utils;

#[cfg(feature = "consumers")]
pub mod consumers;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{Message, TaskState};
    pub use crate::errors::{
        ContractErrorInfo, PipelineValidationError, Result, SinkError, StageError, SubflowError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::pipeline::{History, OrderedPipeline, PipelineBuilder, PipelineOutcome};
    pub use crate::runner::{
        ReapOutcome, RunnerConfig, SubscriptionKey, SubscriptionOptions, SubscriptionRunner,
    };
    pub use crate::sink::{ChannelSink, FanOutSink, FnSink, LoggingSink, Sink};
    pub use crate::source::{ChannelSource, IntervalSource, IterSource, Source, StreamSource};
    pub use crate::stages::{AsyncFnStage, FnStage, IdentityStage, InputMode, Stage};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};

    #[cfg(feature = "consumers")]
    pub use crate::consumers::{LanguageModel, LlmConfig, OpenAiChatModel};
}
