//! Testing utilities for subflow pipelines and subscriptions.
//!
//! This module provides:
//! - Mock, failing and slow stages
//! - Recording and failing sinks
//! - A scripted language model (with the `consumers` feature)

mod mocks;

pub use mocks::{
    double, increment, FailingSink, FailingStage, MockStage, RecordingSink, SlowStage,
};

#[cfg(feature = "consumers")]
mod model;

#[cfg(feature = "consumers")]
pub use model::MockLanguageModel;
