use crate::tags::Tags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of metrics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MetricType {
    /// Counter that accumulates between flushes
    Counter,
    /// Gauge holding the last reported value
    Gauge,
}

impl MetricType {
    fn statsd_suffix(self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Gauge => "g",
        }
    }
}

/// Metrics data point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricPoint {
    /// Metric name
    pub name: String,
    /// Metric type
    pub metric_type: MetricType,
    /// Metric value
    pub value: f64,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Labels/tags
    pub tags: Tags,
}

impl MetricPoint {
    pub fn new(name: &str, metric_type: MetricType, value: f64, tags: Tags) -> Self {
        Self {
            name: name.to_string(),
            metric_type,
            value,
            timestamp: Utc::now(),
            tags,
        }
    }

    pub fn gauge(name: &str, value: f64, tags: Tags) -> Self {
        Self::new(name, MetricType::Gauge, value, tags)
    }

    pub fn counter(name: &str, value: f64, tags: Tags) -> Self {
        Self::new(name, MetricType::Counter, value, tags)
    }

    /// Renders the point as a dogstatsd line, e.g. `name:1|g|#env:dev`.
    pub fn render(&self) -> String {
        let mut line = format!(
            "{}:{}|{}",
            self.name,
            self.value,
            self.metric_type.statsd_suffix()
        );
        if !self.tags.is_empty() {
            line.push_str("|#");
            line.push_str(&self.tags.to_string());
        }
        line
    }
}
