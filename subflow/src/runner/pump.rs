//! The per-subscription pump task.

use super::record::{PumpReport, SubscriptionKey};
use crate::cancellation::CancellationToken;
use crate::errors::{Result, SubflowError};
use crate::events::{names, EventSink};
use crate::pipeline::OrderedPipeline;
use crate::sink::Sink;
use crate::source::Source;
use std::sync::Arc;
use tracing::debug;

/// Pulls items from one source, runs each through the pipeline and hands the
/// final output to the sink. Items are handled strictly one at a time.
pub(crate) struct Pump {
    pub(crate) key: SubscriptionKey,
    pub(crate) source: Box<dyn Source>,
    pub(crate) pipeline: OrderedPipeline,
    pub(crate) sink: Arc<dyn Sink>,
    pub(crate) token: CancellationToken,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) max_items: Option<usize>,
}

impl Pump {
    /// Runs until the source ends, the item limit is reached, an error occurs
    /// or the token is cancelled.
    ///
    /// Every suspension point is raced against the token with cancellation
    /// checked first, so an item whose pipeline run was interrupted never
    /// reaches the sink.
    pub(crate) async fn run(self) -> Result<PumpReport> {
        let Self {
            key,
            mut source,
            pipeline,
            sink,
            token,
            events,
            max_items,
        } = self;
        let mut report = PumpReport::default();

        loop {
            if max_items.is_some_and(|max| report.items_received >= max) {
                debug!(key = %key, items = report.items_received, "item limit reached");
                break;
            }

            let item = tokio::select! {
                biased;
                () = token.cancelled() => return Err(cancelled(&key, &token)),
                item = source.next() => item,
            };
            let Some(item) = item else {
                debug!(key = %key, source = source.name(), "source exhausted");
                break;
            };
            report.items_received += 1;

            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => return Err(cancelled(&key, &token)),
                outcome = pipeline.run(item) => outcome?,
            };

            let item_id = outcome.output.id;
            tokio::select! {
                biased;
                () = token.cancelled() => return Err(cancelled(&key, &token)),
                delivered = sink.deliver(outcome.output) => delivered?,
            }
            report.items_delivered += 1;

            events.try_emit(
                names::ITEM_DELIVERED,
                Some(serde_json::json!({
                    "key": key.as_str(),
                    "sink": sink.name(),
                    "message_id": item_id.to_string(),
                    "duration_ms": outcome.duration_ms,
                })),
            );
        }

        Ok(report)
    }
}

fn cancelled(key: &SubscriptionKey, token: &CancellationToken) -> SubflowError {
    let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
    SubflowError::Cancelled(format!("{key}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingEventSink, NoOpEventSink};
    use crate::pipeline::PipelineBuilder;
    use crate::source::{ChannelSource, IterSource};
    use crate::testing::{double, FailingSink, FailingStage, RecordingSink, SlowStage};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn pump(
        source: impl Source + 'static,
        pipeline: OrderedPipeline,
        sink: Arc<dyn Sink>,
        token: CancellationToken,
    ) -> Pump {
        Pump {
            key: SubscriptionKey::new("test"),
            source: Box::new(source),
            pipeline,
            sink,
            token,
            events: Arc::new(NoOpEventSink),
            max_items: None,
        }
    }

    #[tokio::test]
    async fn test_pump_delivers_in_order() {
        let pipeline = PipelineBuilder::new("double").stage(double()).build().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let events = Arc::new(CollectingEventSink::new());
        let mut task = pump(
            IterSource::new([json!(1), json!(2), json!(3)]),
            pipeline,
            sink.clone(),
            CancellationToken::new(),
        );
        task.events = events.clone() as Arc<dyn EventSink>;

        let report = task.run().await.unwrap();
        assert_eq!(
            report,
            PumpReport {
                items_received: 3,
                items_delivered: 3
            }
        );
        assert_eq!(sink.contents(), vec![json!(2), json!(4), json!(6)]);
        assert_eq!(events.count(names::ITEM_DELIVERED), 3);
    }

    #[tokio::test]
    async fn test_pump_honours_item_limit() {
        let pipeline = PipelineBuilder::new("double").stage(double()).build().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let mut task = pump(
            IterSource::new([json!(1), json!(2), json!(3)]),
            pipeline,
            sink.clone(),
            CancellationToken::new(),
        );
        task.max_items = Some(1);

        let report = task.run().await.unwrap();
        assert_eq!(report.items_delivered, 1);
        assert_eq!(sink.contents(), vec![json!(2)]);
    }

    #[tokio::test]
    async fn test_stage_error_stops_pump_before_sink() {
        let pipeline = PipelineBuilder::new("broken")
            .then(FailingStage::new("broken", "model unavailable"))
            .build()
            .unwrap();
        let sink = Arc::new(RecordingSink::new());
        let task = pump(
            IterSource::new(["a", "b"]),
            pipeline,
            sink.clone(),
            CancellationToken::new(),
        );

        let err = task.run().await.unwrap_err();
        assert_eq!(err.kind(), "stage");
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_sink_error_fails_pump() {
        let pipeline = PipelineBuilder::new("double").stage(double()).build().unwrap();
        let task = pump(
            IterSource::new([json!(1)]),
            pipeline,
            Arc::new(FailingSink::new("wxpusher down")),
            CancellationToken::new(),
        );

        let err = task.run().await.unwrap_err();
        assert_eq!(err.kind(), "sink");
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_source() {
        let (_tx, source) = ChannelSource::pair(1);
        let pipeline = PipelineBuilder::new("double").stage(double()).build().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(
            pump(source, pipeline, Arc::new(RecordingSink::new()), token.clone()).run(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("unsubscribed");

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("unsubscribed"));
    }

    #[tokio::test]
    async fn test_cancel_mid_pipeline_skips_delivery() {
        let slow = Arc::new(SlowStage::new("slow", Duration::from_secs(30)));
        let pipeline = PipelineBuilder::new("slow").stage(slow.clone()).build().unwrap();
        let sink = Arc::new(RecordingSink::new());
        let token = CancellationToken::new();
        let handle = tokio::spawn(
            pump(IterSource::new(["x"]), pipeline, sink.clone(), token.clone()).run(),
        );

        while slow.started() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        token.cancel("shutdown");

        assert!(handle.await.unwrap().unwrap_err().is_cancelled());
        assert!(sink.is_empty());
    }
}
