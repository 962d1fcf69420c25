use crate::flush::{FlushNotifier, FlushSubscription, Flushable};
use crate::metric::MetricPoint;
use crate::sink::MetricSink;
use crate::tags::Tags;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Invalid metric name: {reason}")]
    InvalidMetricName { reason: String },

    #[error("Sink {sink} failed to export metrics: {reason}")]
    ExportFailed { sink: String, reason: String },
}

pub type StatsResult<T> = Result<T, StatsError>;

/// A metrics context: accepts samples and announces flush cycles.
///
/// Sampling is fire-and-forget; implementations never surface failures to
/// the caller.
pub trait Statser: Send + Sync {
    fn gauge(&self, name: &str, value: f64, tags: &Tags);

    fn count(&self, name: &str, value: f64, tags: &Tags);

    /// Registers for flush-cycle notifications.
    fn register_flush(&self) -> FlushSubscription;
}

/// Views derived from a shared metrics context.
pub trait StatserExt {
    /// A view of this context that appends `tags` to every sample.
    fn with_tags(&self, tags: &Tags) -> Arc<dyn Statser>;

    /// A report function bound to this context.
    fn reporter(&self) -> Reporter;
}

impl StatserExt for Arc<dyn Statser> {
    fn with_tags(&self, tags: &Tags) -> Arc<dyn Statser> {
        Arc::new(TaggedStatser {
            inner: Arc::clone(self),
            tags: tags.clone(),
        })
    }

    fn reporter(&self) -> Reporter {
        Reporter {
            statser: Arc::clone(self),
        }
    }
}

struct TaggedStatser {
    inner: Arc<dyn Statser>,
    tags: Tags,
}

impl Statser for TaggedStatser {
    fn gauge(&self, name: &str, value: f64, tags: &Tags) {
        self.inner.gauge(name, value, &self.tags.concat(tags));
    }

    fn count(&self, name: &str, value: f64, tags: &Tags) {
        self.inner.count(name, value, &self.tags.concat(tags));
    }

    fn register_flush(&self) -> FlushSubscription {
        self.inner.register_flush()
    }
}

/// Reports gauge samples to the context it was obtained from.
#[derive(Clone)]
pub struct Reporter {
    statser: Arc<dyn Statser>,
}

impl Reporter {
    pub fn report(&self, name: &str, value: f64, tags: &Tags) {
        self.statser.gauge(name, value, tags);
    }
}

/// Metrics context that buffers samples until the next flush.
pub struct BufferedStatser {
    buffer: Mutex<Vec<MetricPoint>>,
    sink: Arc<dyn MetricSink>,
    notifier: FlushNotifier,
}

impl BufferedStatser {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            sink,
            notifier: FlushNotifier::new(),
        }
    }

    fn record(&self, point: MetricPoint) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(point);
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.notifier.subscriber_count()
    }
}

impl Statser for BufferedStatser {
    fn gauge(&self, name: &str, value: f64, tags: &Tags) {
        self.record(MetricPoint::gauge(name, value, tags.clone()));
    }

    fn count(&self, name: &str, value: f64, tags: &Tags) {
        self.record(MetricPoint::counter(name, value, tags.clone()));
    }

    fn register_flush(&self) -> FlushSubscription {
        self.notifier.subscribe()
    }
}

#[async_trait]
impl Flushable for BufferedStatser {
    /// Ships buffered samples to the sink, then announces the flush.
    async fn flush(&self) {
        let points = {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *buffer)
        };

        let exported = points.len();
        if !points.is_empty() {
            if let Err(e) = self.sink.export(points).await {
                error!(sink = self.sink.name(), error = %e, "Metrics export failed");
            }
        }

        let notified = self.notifier.notify();
        debug!(exported, notified, "Flush cycle complete");
    }
}

/// Metrics context that discards everything and never flushes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatser;

impl Statser for NullStatser {
    fn gauge(&self, _name: &str, _value: f64, _tags: &Tags) {}

    fn count(&self, _name: &str, _value: f64, _tags: &Tags) {}

    fn register_flush(&self) -> FlushSubscription {
        FlushSubscription::detached()
    }
}
