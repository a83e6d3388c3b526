//! Produce-and-validate consumer: write a program, then run it.

use super::llm::LanguageModel;
use crate::core::Message;
use crate::errors::{PipelineValidationError, StageError};
use crate::pipeline::{OrderedPipeline, PipelineBuilder};
use crate::stages::Stage;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Prompt used by [`WriteCodeStage`]. `{instruction}` is replaced by the input.
pub const WRITE_CODE_PROMPT: &str = "Write a python function that can {instruction} and provide two runnable test cases.
Return ```python your_code_here ``` with NO other texts,
your code:
";

/// Pulls the body of a ```` ```python ```` fence out of a model reply.
///
/// The match is greedy, so a reply with several fences yields everything
/// between the first opening and the last closing fence. Replies without a
/// fence are returned unchanged.
#[must_use]
pub fn extract_code(reply: &str) -> String {
    Regex::new(r"(?s)```python(.*)```")
        .ok()
        .and_then(|re| re.captures(reply))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| reply.to_string(), |m| m.as_str().to_string())
}

/// Asks the model to write code for the instruction it receives.
#[derive(Debug, Clone)]
pub struct WriteCodeStage {
    model: Arc<dyn LanguageModel>,
    template: String,
}

impl WriteCodeStage {
    /// Creates the stage with the default prompt.
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            template: WRITE_CODE_PROMPT.to_string(),
        }
    }

    /// Replaces the prompt template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}

#[async_trait]
impl Stage for WriteCodeStage {
    fn name(&self) -> &str {
        "write_code"
    }

    async fn process(&self, input: &Message) -> Result<serde_json::Value, StageError> {
        let prompt = self.template.replace("{instruction}", &input.as_text());
        let reply = self.model.ask(&prompt).await?;
        Ok(serde_json::Value::String(extract_code(&reply)))
    }
}

/// Runs the code it receives with an interpreter and returns stdout.
#[derive(Debug, Clone)]
pub struct RunCodeStage {
    interpreter: String,
    args: Vec<String>,
}

impl RunCodeStage {
    /// Runs code as `<interpreter> -c <code>`.
    #[must_use]
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            args: vec!["-c".to_string()],
        }
    }

    /// Replaces the arguments placed before the code.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for RunCodeStage {
    fn default() -> Self {
        Self::new("python3")
    }
}

#[async_trait]
impl Stage for RunCodeStage {
    fn name(&self) -> &str {
        "run_code"
    }

    async fn process(&self, input: &Message) -> Result<serde_json::Value, StageError> {
        let code = input.as_text();
        let output = Command::new(&self.interpreter)
            .args(&self.args)
            .arg(&code)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                StageError::from_error(
                    self.name(),
                    anyhow::Error::new(e).context(format!("failed to start {}", self.interpreter)),
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(interpreter = %self.interpreter, status = %output.status, "code run failed");
            return Err(StageError::new(
                self.name(),
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        info!(interpreter = %self.interpreter, stdout_bytes = stdout.len(), "code run finished");
        Ok(serde_json::Value::String(stdout))
    }
}

/// Builds the two-stage write-then-run pipeline.
///
/// # Errors
///
/// Never fails in practice; the error type comes from pipeline validation.
pub fn runnable_coder(
    model: Arc<dyn LanguageModel>,
    interpreter: impl Into<String>,
) -> Result<OrderedPipeline, PipelineValidationError> {
    PipelineBuilder::new("runnable_coder")
        .then(WriteCodeStage::new(model))
        .then(RunCodeStage::new(interpreter))
        .build()
}
