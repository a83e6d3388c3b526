//! Append-only record of one pipeline run.

use crate::core::Message;

/// The values produced during one run over one input item.
///
/// Entry 0 is the input; each completed stage appends exactly one entry.
/// Entries are never removed or replaced.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<Message>,
}

impl History {
    /// Creates a history seeded with the run's input.
    #[must_use]
    pub fn with_input(input: Message) -> Self {
        Self {
            entries: vec![input],
        }
    }

    /// Appends an entry.
    pub fn push(&mut self, message: Message) {
        self.entries.push(message);
    }

    /// The most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&Message> {
        self.entries.last()
    }

    /// The input the run started from.
    #[must_use]
    pub fn input(&self) -> Option<&Message> {
        self.entries.first()
    }

    /// Entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.entries.get(index)
    }

    /// The last `k` entries, oldest first.
    #[must_use]
    pub fn recent(&self, k: usize) -> &[Message] {
        let start = self.entries.len().saturating_sub(k);
        &self.entries[start..]
    }

    /// Entries produced by stages (everything after the input).
    #[must_use]
    pub fn stage_outputs(&self) -> &[Message] {
        self.entries.get(1..).unwrap_or_default()
    }

    /// The payloads of all entries, in order.
    #[must_use]
    pub fn contents(&self) -> Vec<serde_json::Value> {
        self.entries.iter().map(|m| m.content.clone()).collect()
    }

    /// Iterates over all entries.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.entries.iter()
    }

    /// Number of entries, including the input.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the history holds no entry at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
