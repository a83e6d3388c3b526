//! Ordered pipeline execution.
//!
//! This module provides:
//! - [`OrderedPipeline`], a fixed non-empty list of stages run by order
//! - [`PipelineRun`], one cursor-driven run over one item
//! - [`History`], the append-only record of a run
//! - [`PipelineBuilder`] for assembling pipelines fluently

mod builder;
mod executor;
mod history;

pub use builder::PipelineBuilder;
pub use executor::{OrderedPipeline, PipelineOutcome, PipelineRun};
pub use history::History;
