//! Metric identities and the canonical record published to the metrics topic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Structured identity of a metric: group, name and an ordered tag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricName {
    pub group: String,
    pub name: String,
    pub tags: BTreeMap<String, String>,
}

impl MetricName {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)?;
        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, "{{{}}}", tags.join(","))?;
        }
        Ok(())
    }
}

/// A live metric owned by the host process.
///
/// The reporter only reads the current value; registration and lifetime stay with the host.
pub trait MetricHandle: Send + Sync {
    fn name(&self) -> &MetricName;
    fn value(&self) -> f64;
}

/// Which entity a canonical record describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", content = "topic", rename_all = "snake_case")]
pub enum MetricScope {
    Broker,
    Topic(String),
    Custom,
}

/// Normalized value of one metric at one instant, as written to the metrics topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMetric {
    pub scope: MetricScope,
    pub node_id: i32,
    pub time_ms: i64,
    pub metric_type: String,
    pub value: f64,
}

impl CanonicalMetric {
    pub fn broker(metric_type: impl Into<String>, node_id: i32, time_ms: i64, value: f64) -> Self {
        Self {
            scope: MetricScope::Broker,
            node_id,
            time_ms,
            metric_type: metric_type.into(),
            value,
        }
    }

    pub fn topic(
        topic: impl Into<String>,
        metric_type: impl Into<String>,
        node_id: i32,
        time_ms: i64,
        value: f64,
    ) -> Self {
        Self {
            scope: MetricScope::Topic(topic.into()),
            node_id,
            time_ms,
            metric_type: metric_type.into(),
            value,
        }
    }

    /// Record key: the topic for topic-scoped records, the node id otherwise.
    pub fn partition_key(&self) -> String {
        match &self.scope {
            MetricScope::Topic(topic) => topic.clone(),
            MetricScope::Broker | MetricScope::Custom => self.node_id.to_string(),
        }
    }
}

/// Value read from the legacy gauge/counter registry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LegacyValue {
    Counter(f64),
    Gauge(f64),
    Histogram { count: u64, sum: f64 },
    Summary { count: u64, sum: f64 },
}

/// One metric visited while walking the legacy registry
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyMetric {
    pub name: MetricName,
    pub value: LegacyValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_record_is_keyed_by_topic() {
        let record = CanonicalMetric::topic("orders", "BYTES_IN", 7, 1_000, 42.0);
        assert_eq!(record.partition_key(), "orders");
    }

    #[test]
    fn test_node_records_are_keyed_by_node_id() {
        let broker = CanonicalMetric::broker("CPU_UTIL", 7, 1_000, 0.5);
        assert_eq!(broker.partition_key(), "7");

        let custom = CanonicalMetric {
            scope: MetricScope::Custom,
            ..broker
        };
        assert_eq!(custom.partition_key(), "7");
    }

    #[test]
    fn test_metric_name_display_includes_tags() {
        let name = MetricName::new("broker-topic-metrics", "bytes-in")
            .with_tag("topic", "orders")
            .with_tag("client", "a");
        assert_eq!(
            name.to_string(),
            "broker-topic-metrics:bytes-in{client=a,topic=orders}"
        );
        assert_eq!(name.tag("topic"), Some("orders"));
    }
}
