//! The message type carried between sources, stages and sinks.

use crate::utils::{generate_uuid, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single value produced by a source or by a stage.
///
/// Stage outputs are recorded as messages in the pipeline history, tagged
/// with the name of the stage that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: Uuid,
    /// The payload.
    pub content: serde_json::Value,
    /// Name of the stage that produced this message, `None` for source items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_by: Option<String>,
    /// When the message was created.
    pub created_at: Timestamp,
}

impl Message {
    /// Creates a source message with the given payload.
    #[must_use]
    pub fn new(content: impl Into<serde_json::Value>) -> Self {
        Self {
            id: generate_uuid(),
            content: content.into(),
            produced_by: None,
            created_at: Utc::now(),
        }
    }

    /// Creates a source message with a text payload.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(serde_json::Value::String(text.into()))
    }

    /// The "no special input" marker handed to detached stages.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(serde_json::Value::Null)
    }

    /// Creates a message recording a stage output.
    #[must_use]
    pub fn from_stage(stage: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            produced_by: Some(stage.into()),
            ..Self::new(content)
        }
    }

    /// Returns the payload.
    #[must_use]
    pub fn content(&self) -> &serde_json::Value {
        &self.content
    }

    /// Returns the payload as text.
    ///
    /// String payloads are returned verbatim, anything else is rendered as JSON.
    #[must_use]
    pub fn as_text(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Returns the producing stage, if any.
    #[must_use]
    pub fn produced_by(&self) -> Option<&str> {
        self.produced_by.as_deref()
    }

    /// Returns true for the empty marker (null payload).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_null()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.produced_by {
            Some(stage) => write!(f, "{}: {}", stage, self.as_text()),
            None => write!(f, "{}", self.as_text()),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<serde_json::Value> for Message {
    fn from(content: serde_json::Value) -> Self {
        Self::new(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_message() {
        let msg = Message::text("the latest news about OpenAI");
        assert_eq!(msg.as_text(), "the latest news about OpenAI");
        assert!(msg.produced_by().is_none());
        assert!(!msg.is_empty());
    }

    #[test]
    fn test_non_string_payload_renders_as_json() {
        let msg = Message::new(json!({"stars": 10}));
        assert_eq!(msg.as_text(), r#"{"stars":10}"#);
    }

    #[test]
    fn test_from_stage_sets_producer() {
        let msg = Message::from_stage("double", json!(10));
        assert_eq!(msg.produced_by(), Some("double"));
        assert_eq!(msg.to_string(), "double: 10");
    }

    #[test]
    fn test_empty_marker() {
        assert!(Message::empty().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Message::text("a").id, Message::text("a").id);
    }

    #[test]
    fn test_serialization_skips_missing_producer() {
        let json = serde_json::to_value(Message::new(json!(5))).unwrap();
        assert!(json.get("produced_by").is_none());
        assert_eq!(json["content"], json!(5));
    }
}
