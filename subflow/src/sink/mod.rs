//! Delivery sinks for pipeline outputs.

use crate::core::Message;
use crate::errors::SinkError;
use async_trait::async_trait;
use futures::future::join_all;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// The terminal consumer of a pipeline's final output.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Delivers one output.
    ///
    /// # Errors
    ///
    /// A failed delivery fails the subscription's pump task.
    async fn deliver(&self, output: Message) -> Result<(), SinkError>;

    /// A name used in logs and errors.
    fn name(&self) -> &str {
        "sink"
    }
}

/// Sink backed by an async closure.
pub struct FnSink<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SinkError>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnSink<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SinkError>> + Send,
{
    /// Creates a closure sink.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> std::fmt::Debug for FnSink<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SinkError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSink").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Sink for FnSink<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SinkError>> + Send,
{
    async fn deliver(&self, output: Message) -> Result<(), SinkError> {
        (self.func)(output).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Writes each output to the log. The default sink when nothing else is wired.
#[derive(Debug, Clone, Default)]
pub struct LoggingSink;

#[async_trait]
impl Sink for LoggingSink {
    async fn deliver(&self, output: Message) -> Result<(), SinkError> {
        info!(
            produced_by = output.produced_by().unwrap_or("source"),
            message_id = %output.id,
            "{}",
            output.as_text()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Forwards outputs into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Message>,
}

impl ChannelSink {
    /// Wraps a sender.
    #[must_use]
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn deliver(&self, output: Message) -> Result<(), SinkError> {
        self.sender
            .send(output)
            .await
            .map_err(|_| SinkError::new(self.name(), "receiver dropped"))
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Delivers every output to several downstream sinks concurrently.
///
/// All handlers run to completion; if any failed, the first failure (in
/// handler order) is returned.
#[derive(Clone, Default)]
pub struct FanOutSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanOutSink {
    /// Creates a fan-out over `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Adds a downstream sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of downstream sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if there is no downstream sink.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanOutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutSink")
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl Sink for FanOutSink {
    async fn deliver(&self, output: Message) -> Result<(), SinkError> {
        let results = join_all(self.sinks.iter().map(|sink| sink.deliver(output.clone()))).await;
        results.into_iter().collect()
    }

    fn name(&self) -> &str {
        "fan_out"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingSink, RecordingSink};
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_sink() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink = FnSink::new("collect", move |msg: Message| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().push(msg.content);
                Ok::<(), SinkError>(())
            }
        });

        sink.deliver(Message::new(json!(1))).await.unwrap();
        assert_eq!(sink.name(), "collect");
        assert_eq!(*seen.lock(), vec![json!(1)]);
    }

    #[tokio::test]
    async fn test_logging_sink() {
        tokio_test::assert_ok!(LoggingSink.deliver(Message::text("report")).await);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_receiver() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = ChannelSink::new(tx);
        sink.deliver(Message::text("a")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().as_text(), "a");

        drop(rx);
        let err = sink.deliver(Message::text("b")).await.unwrap_err();
        assert_eq!(err.sink, "channel");
    }

    #[tokio::test]
    async fn test_fan_out_delivers_to_all() {
        let a = Arc::new(RecordingSink::new());
        let b = Arc::new(RecordingSink::new());
        let sink = FanOutSink::default().with(a.clone()).with(b.clone());

        sink.deliver(Message::new(json!(7))).await.unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(a.contents(), vec![json!(7)]);
        assert_eq!(b.contents(), vec![json!(7)]);
    }

    #[tokio::test]
    async fn test_fan_out_runs_every_handler_before_failing() {
        let after = Arc::new(RecordingSink::new());
        let sink = FanOutSink::new(vec![
            Arc::new(FailingSink::new("wxpusher down")) as Arc<dyn Sink>,
            after.clone() as Arc<dyn Sink>,
        ]);

        let err = sink.deliver(Message::text("x")).await.unwrap_err();
        assert_eq!(err.message, "wxpusher down");
        assert_eq!(after.len(), 1);
    }
}
