//! Sources of input items.
//!
//! A [`Source`] is pulled one item at a time; `None` means the stream is
//! exhausted, which is a normal outcome rather than an error.

use crate::core::Message;
use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

/// A pull-based, possibly infinite sequence of input items.
#[async_trait]
pub trait Source: Send {
    /// Waits for the next item. `None` signals end of stream.
    async fn next(&mut self) -> Option<Message>;

    /// A name used in logs.
    fn name(&self) -> &str {
        "source"
    }
}

/// Yields a fixed list of items, optionally pausing after each one.
///
/// The pause happens after an item has been handed out and before the next
/// one is produced, so the first item is available immediately.
#[derive(Debug)]
pub struct IterSource {
    items: VecDeque<Message>,
    delay: Option<Duration>,
    started: bool,
}

impl IterSource {
    /// Creates a source over `items`.
    pub fn new(items: impl IntoIterator<Item = impl Into<Message>>) -> Self {
        Self {
            items: items.into_iter().map(Into::into).collect(),
            delay: None,
            started: false,
        }
    }

    /// Sets the pause between items.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of items not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl Source for IterSource {
    async fn next(&mut self) -> Option<Message> {
        if self.started {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
        self.started = true;
        self.items.pop_front()
    }

    fn name(&self) -> &str {
        "iter"
    }
}

/// Timer-driven source: yields a copy of a template every `period`.
///
/// The first tick fires immediately. Missed ticks are delayed, not burst.
#[derive(Debug)]
pub struct IntervalSource {
    template: serde_json::Value,
    interval: Interval,
    limit: Option<usize>,
    emitted: usize,
}

impl IntervalSource {
    /// Creates an unbounded interval source.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(period: Duration, template: impl Into<serde_json::Value>) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            template: template.into(),
            interval,
            limit: None,
            emitted: 0,
        }
    }

    /// Stops after `n` items.
    #[must_use]
    pub fn take(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Number of items yielded so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

#[async_trait]
impl Source for IntervalSource {
    async fn next(&mut self) -> Option<Message> {
        if self.limit.is_some_and(|limit| self.emitted >= limit) {
            return None;
        }
        self.interval.tick().await;
        self.emitted += 1;
        Some(Message::new(self.template.clone()))
    }

    fn name(&self) -> &str {
        "interval"
    }
}

/// Event-driven source fed through a tokio channel.
///
/// The stream ends once every sender has been dropped and the buffer drained.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<Message>,
}

impl ChannelSource {
    /// Wraps an existing receiver.
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<Message>) -> Self {
        Self { receiver }
    }

    /// Creates a bounded channel and returns its sender with the source.
    #[must_use]
    pub fn pair(capacity: usize) -> (mpsc::Sender<Message>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl Source for ChannelSource {
    async fn next(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Adapts any `futures` stream of messages.
pub struct StreamSource {
    stream: BoxStream<'static, Message>,
}

impl StreamSource {
    /// Wraps a stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Message> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
        }
    }
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl Source for StreamSource {
    async fn next(&mut self) -> Option<Message> {
        self.stream.next().await
    }

    fn name(&self) -> &str {
        "stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn drain(source: &mut dyn Source) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Some(msg) = source.next().await {
            out.push(msg.content);
        }
        out
    }

    #[tokio::test]
    async fn test_iter_source_yields_then_ends() {
        let mut source = IterSource::new([json!(1), json!(2), json!(3)]);
        assert_eq!(source.remaining(), 3);
        assert_eq!(drain(&mut source).await, vec![json!(1), json!(2), json!(3)]);
        assert!(source.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_iter_source_delay_between_items() {
        let mut source = IterSource::new(["a", "b"]).with_delay(Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        source.next().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        source.next().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_source_limit() {
        let mut source = IntervalSource::new(Duration::from_secs(5), "the latest news about OpenAI").take(3);
        let start = tokio::time::Instant::now();

        let items = drain(&mut source).await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], json!("the latest news about OpenAI"));
        assert_eq!(source.emitted(), 3);
        // First tick is immediate, then two periods.
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_channel_source_ends_when_senders_drop() {
        let (tx, mut source) = ChannelSource::pair(4);
        tx.send(Message::text("x")).await.unwrap();
        tx.send(Message::text("y")).await.unwrap();
        drop(tx);

        assert_eq!(drain(&mut source).await, vec![json!("x"), json!("y")]);
    }

    #[tokio::test]
    async fn test_stream_source() {
        let stream = futures::stream::iter(vec![Message::new(json!(1)), Message::new(json!(2))]);
        let mut source = StreamSource::new(stream);
        assert_eq!(source.name(), "stream");
        assert_eq!(drain(&mut source).await, vec![json!(1), json!(2)]);
    }
}
