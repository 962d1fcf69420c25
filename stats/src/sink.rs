use crate::metric::MetricPoint;
use crate::statser::{StatsError, StatsResult};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Destination for flushed metric points.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn export(&self, points: Vec<MetricPoint>) -> StatsResult<()>;

    fn name(&self) -> &str;
}

/// Writes every point as a statsd line through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricSink for LogSink {
    async fn export(&self, points: Vec<MetricPoint>) -> StatsResult<()> {
        for point in &points {
            info!(target: "stats::sink", metric = %point.render(), "metric");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Keeps exported points in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    points: Mutex<Vec<MetricPoint>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose exports always fail, for exercising error paths.
    pub fn failing() -> Self {
        Self {
            points: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn points(&self) -> Vec<MetricPoint> {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn points_named(&self, name: &str) -> Vec<MetricPoint> {
        self.points()
            .into_iter()
            .filter(|p| p.name == name)
            .collect()
    }
}

#[async_trait]
impl MetricSink for MemorySink {
    async fn export(&self, points: Vec<MetricPoint>) -> StatsResult<()> {
        if self.fail {
            return Err(StatsError::ExportFailed {
                sink: self.name().to_string(),
                reason: "sink configured to fail".to_string(),
            });
        }
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(points);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::Tags;

    #[tokio::test]
    async fn test_memory_sink_accumulates() {
        let sink = MemorySink::new();
        sink.export(vec![MetricPoint::gauge("a", 1.0, Tags::new())])
            .await
            .unwrap();
        sink.export(vec![
            MetricPoint::gauge("b", 2.0, Tags::new()),
            MetricPoint::gauge("a", 3.0, Tags::new()),
        ])
        .await
        .unwrap();

        assert_eq!(sink.points().len(), 3);
        assert_eq!(sink.points_named("a").len(), 2);
        assert_eq!(sink.points_named("b")[0].value, 2.0);
    }

    #[tokio::test]
    async fn test_failing_sink_reports_error() {
        let sink = MemorySink::failing();
        let err = sink
            .export(vec![MetricPoint::gauge("a", 1.0, Tags::new())])
            .await
            .unwrap_err();
        assert!(matches!(err, StatsError::ExportFailed { .. }));
        assert!(err.to_string().contains("memory"));
    }

    #[tokio::test]
    async fn test_log_sink_accepts_points() {
        let sink = LogSink::new();
        assert!(sink
            .export(vec![MetricPoint::counter("a", 1.0, Tags::new())])
            .await
            .is_ok());
        assert_eq!(sink.name(), "log");
    }
}
