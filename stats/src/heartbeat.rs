//! Liveness heartbeat driven by flush cycles.
//!
//! A [`HeartBeater`] emits a constant gauge of `1` each time the metrics
//! context it watches completes a flush. The backend sees one heartbeat per
//! flush interval for as long as the process is alive and flushing.

use crate::statser::{StatsError, StatsResult, Statser, StatserExt};
use crate::tags::Tags;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Value carried by every heartbeat sample.
pub const HEARTBEAT_VALUE: f64 = 1.0;

/// Emits a heartbeat gauge on every flush until cancelled.
#[derive(Debug, Clone)]
pub struct HeartBeater {
    metric_name: String,
    tags: Tags,
}

impl HeartBeater {
    pub fn new(metric_name: impl Into<String>, tags: Tags) -> StatsResult<Self> {
        let metric_name = metric_name.into();
        if metric_name.is_empty() {
            return Err(StatsError::InvalidMetricName {
                reason: "heartbeat metric name cannot be empty".to_string(),
            });
        }
        Ok(Self { metric_name, tags })
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Runs until `token` is cancelled.
    ///
    /// Subscribes to flush cycles on a view of `statser` tagged with this
    /// heartbeat's tags and reports one sample per observed flush. The flush
    /// subscription is released on return. Consumes the heartbeat; build a
    /// new one to run again.
    pub async fn run(self, statser: Arc<dyn Statser>, token: CancellationToken) {
        let statser = statser.with_tags(&self.tags);
        let mut flushed = statser.register_flush();
        let reporter = statser.reporter();
        debug!(metric = %self.metric_name, "Heartbeat subscribed to flush cycles");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                signal = flushed.recv() => match signal {
                    Some(()) => {
                        reporter.report(&self.metric_name, HEARTBEAT_VALUE, &Tags::new());
                        trace!(metric = %self.metric_name, "Heartbeat emitted");
                    }
                    None => {
                        // The context stopped flushing; nothing left to observe.
                        token.cancelled().await;
                        break;
                    }
                },
            }
        }

        flushed.unsubscribe();
        debug!(metric = %self.metric_name, "Heartbeat stopped");
    }
}
