//! Error types for the subflow runtime.
//!
//! Stage, sink and validation failures each have their own error type;
//! [`SubflowError`] gathers them so the executor, the pumps and the
//! supervisory loop can propagate any of them with `?`.

use crate::runner::SubscriptionKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SubflowError>;

/// The main error type for subflow operations.
#[derive(Debug, Error)]
pub enum SubflowError {
    /// A pipeline failed validation at construction time.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A stage raised while processing an item.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// The sink failed to deliver a pipeline output.
    #[error("{0}")]
    Sink(#[from] SinkError),

    /// `unsubscribe` was called with a key that has no active subscription.
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionKey),

    /// `subscribe_as` was called with a key that is already active.
    #[error("Subscription already active: {0}")]
    AlreadySubscribed(SubscriptionKey),

    /// The pump was cancelled before it finished.
    #[error("Subscription cancelled: {0}")]
    Cancelled(String),

    /// The pump task panicked.
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// A configuration value was missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SubflowError {
    /// Returns true if this error came from a cancellation request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Short machine-readable kind, used in emitted events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Stage(_) => "stage",
            Self::Sink(_) => "sink",
            Self::SubscriptionNotFound(_) => "subscription_not_found",
            Self::AlreadySubscribed(_) => "already_subscribed",
            Self::Cancelled(_) => "cancelled",
            Self::TaskPanicked(_) => "task_panicked",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

/// Error raised when a stage fails.
///
/// The runtime treats the message opaquely and never retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Stage '{stage}' failed: {message}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: String,
    /// Collaborator-specific error message.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Wraps any collaborator error, keeping its full cause chain in the message.
    #[must_use]
    pub fn from_error(stage: impl Into<String>, err: impl Into<anyhow::Error>) -> Self {
        let err: anyhow::Error = err.into();
        Self::new(stage, format!("{err:#}"))
    }
}

/// Error raised when a sink fails to deliver an output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Sink '{sink}' failed: {message}")]
pub struct SinkError {
    /// The sink that failed.
    pub sink: String,
    /// Error message.
    pub message: String,
}

impl SinkError {
    /// Creates a new sink error.
    #[must_use]
    pub fn new(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-EMPTY").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Fills in the fix hint from [`ContractSuggestions`] when none was given.
    #[must_use]
    pub fn with_default_hint(mut self) -> Self {
        if self.fix_hint.is_none() {
            self.fix_hint = ContractSuggestions::get(&self.code).map(String::from);
        }
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// Error for a pipeline built without any stage.
    #[must_use]
    pub fn empty(pipeline: &str) -> Self {
        Self::new(format!("Pipeline '{pipeline}' has no stages")).with_error_info(
            ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot build an empty pipeline")
                .with_context_entry("pipeline", pipeline)
                .with_default_hint(),
        )
    }
}

/// Provides default suggestions for common contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "CONTRACT-004-EMPTY" => Some("Add at least one stage to the pipeline before building."),
            _ => None,
        }
    }
}
