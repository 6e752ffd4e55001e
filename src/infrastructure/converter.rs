//! Default mapping from observed metrics to canonical records.

use crate::domain::errors::ReportError;
use crate::domain::metric::{CanonicalMetric, MetricName, MetricScope};
use crate::domain::ports::{HostSampler, InterestPredicate, MetricConverter};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const HOST_CPU_UTIL: &str = "BROKER_CPU_UTIL";
pub const TOPIC_TAG: &str = "topic";

/// Accepts metrics whose group is one of a fixed set.
#[derive(Debug, Clone)]
pub struct GroupInterest {
    groups: BTreeSet<String>,
}

impl GroupInterest {
    pub fn new<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

impl InterestPredicate for GroupInterest {
    fn is_interested(&self, name: &MetricName) -> bool {
        self.groups.contains(&name.group)
    }
}

/// Scopes a metric by its tags and group.
///
/// A `topic` tag makes the record topic-scoped; metrics of a broker group are
/// broker-scoped; everything else is custom. The metric type is the upper-cased metric name.
pub struct DefaultMetricConverter {
    sampler: Arc<dyn HostSampler>,
    broker_groups: BTreeSet<String>,
}

impl DefaultMetricConverter {
    pub fn new<I, S>(sampler: Arc<dyn HostSampler>, broker_groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sampler,
            broker_groups: broker_groups.into_iter().map(Into::into).collect(),
        }
    }

    fn scope_of(&self, name: &MetricName) -> MetricScope {
        match name.tag(TOPIC_TAG) {
            Some(topic) => MetricScope::Topic(topic.to_string()),
            None if self.broker_groups.contains(&name.group) => MetricScope::Broker,
            None => MetricScope::Custom,
        }
    }
}

pub fn metric_type_id(name: &MetricName) -> String {
    name.name.replace(['-', '.', ' '], "_").to_uppercase()
}

impl MetricConverter for DefaultMetricConverter {
    fn record_for(
        &self,
        name: &MetricName,
        value: f64,
        now_ms: i64,
        node_id: i32,
    ) -> Option<CanonicalMetric> {
        if !value.is_finite() {
            return None;
        }
        Some(CanonicalMetric {
            scope: self.scope_of(name),
            node_id,
            time_ms: now_ms,
            metric_type: metric_type_id(name),
            value,
        })
    }

    fn host_utilization(&self, now_ms: i64, node_id: i32) -> Result<CanonicalMetric, ReportError> {
        let utilization = self
            .sampler
            .cpu_utilization()
            .ok_or_else(|| ReportError::Conversion {
                metric: HOST_CPU_UTIL.to_string(),
                reason: "CPU utilization is not available".to_string(),
            })?;
        Ok(CanonicalMetric::broker(
            HOST_CPU_UTIL,
            node_id,
            now_ms,
            utilization,
        ))
    }
}
