//! Scripted language model.

use crate::consumers::LanguageModel;
use crate::errors::StageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A [`LanguageModel`] that replays canned replies and records prompts.
///
/// Replies are handed out in order; the last one repeats once the script
/// runs out.
#[derive(Debug, Default)]
pub struct MockLanguageModel {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    failure: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockLanguageModel {
    /// Creates a model with scripted replies.
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Creates a model whose every call fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Returns every prompt received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn ask(&self, prompt: &str) -> Result<String, StageError> {
        self.prompts.lock().push(prompt.to_string());
        if let Some(message) = &self.failure {
            return Err(StageError::new("llm", message));
        }

        let mut last = self.last.lock();
        if let Some(reply) = self.replies.lock().pop_front() {
            *last = Some(reply);
        }
        last.clone()
            .ok_or_else(|| StageError::new("llm", "no scripted reply"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_repeats_last() {
        let model = MockLanguageModel::new(["one", "two"]);
        assert_eq!(model.ask("a").await.unwrap(), "one");
        assert_eq!(model.ask("b").await.unwrap(), "two");
        assert_eq!(model.ask("c").await.unwrap(), "two");
        assert_eq!(model.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failing_and_empty() {
        assert!(MockLanguageModel::failing("down").ask("x").await.is_err());
        let empty = MockLanguageModel::new(Vec::<String>::new());
        assert_eq!(empty.ask("x").await.unwrap_err().message, "no scripted reply");
    }
}
