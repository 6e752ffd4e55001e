use crate::config::ProducerEnvConfig;
use crate::domain::errors::{AdminError, PublishError, ReportError};
use crate::domain::metric::{CanonicalMetric, LegacyMetric, MetricHandle, MetricName};
use crate::domain::topic::{AlterConfigOp, TopicDescription, TopicDescriptor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Decides which host metrics are worth reporting.
pub trait InterestPredicate: Send + Sync {
    fn is_interested(&self, name: &MetricName) -> bool;
}

impl<F> InterestPredicate for F
where
    F: Fn(&MetricName) -> bool + Send + Sync,
{
    fn is_interested(&self, name: &MetricName) -> bool {
        self(name)
    }
}

/// Anything that accepts canonical records for publication.
pub trait MetricSink: Send + Sync {
    fn publish(&self, metric: CanonicalMetric) -> Result<(), ReportError>;
}

/// Per-walk context handed to the legacy registry visitor.
pub struct VisitContext<'a> {
    pub sink: &'a dyn MetricSink,
    pub time_ms: i64,
    pub node_id: i32,
    /// Configured reporting interval; a walk may run later than this after the previous one.
    pub interval: Duration,
}

pub trait LegacyMetricVisitor: Send {
    fn visit(&mut self, metric: &LegacyMetric, ctx: &VisitContext<'_>) -> Result<(), ReportError>;
}

/// The process-wide legacy gauge/counter registry.
pub trait LegacyMetricRegistry: Send + Sync {
    /// Invokes `visitor` once per currently registered metric.
    fn walk(
        &self,
        visitor: &mut dyn LegacyMetricVisitor,
        ctx: &VisitContext<'_>,
    ) -> Result<(), ReportError>;
}

/// Turns observed values into canonical records.
pub trait MetricConverter: Send + Sync {
    /// Returns `None` when the value cannot be represented (e.g. NaN).
    fn record_for(
        &self,
        name: &MetricName,
        value: f64,
        now_ms: i64,
        node_id: i32,
    ) -> Option<CanonicalMetric>;

    fn host_utilization(&self, now_ms: i64, node_id: i32) -> Result<CanonicalMetric, ReportError>;

    fn to_record(
        &self,
        metric: &dyn MetricHandle,
        now_ms: i64,
        node_id: i32,
    ) -> Option<CanonicalMetric> {
        self.record_for(metric.name(), metric.value(), now_ms, node_id)
    }
}

/// Samples resource usage of the host running the agent.
pub trait HostSampler: Send + Sync {
    /// CPU utilization in `0.0..=1.0`, if it could be sampled.
    fn cpu_utilization(&self) -> Option<f64>;
}

pub trait MetricSerializer: Send + Sync {
    fn serialize(&self, metric: &CanonicalMetric) -> Result<Vec<u8>, PublishError>;
}

/// Keyed message handed to the producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerRecord {
    pub topic: String,
    pub key: String,
    pub timestamp_ms: i64,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

pub type DeliveryCallback = Box<dyn FnOnce(Result<RecordMetadata, PublishError>) + Send + 'static>;

#[async_trait]
pub trait RecordProducer: Send + Sync {
    /// Queues a record without blocking. `on_complete` runs once the outcome is known,
    /// possibly on another thread.
    fn send(&self, record: ProducerRecord, on_complete: DeliveryCallback)
    -> Result<(), PublishError>;

    /// Waits until every record queued so far has completed or failed.
    async fn flush(&self) -> Result<(), PublishError>;

    async fn close(&self, timeout: Duration) -> Result<(), PublishError>;
}

#[async_trait]
pub trait TopicAdmin: Send + Sync {
    async fn create_topic(&self, descriptor: &TopicDescriptor) -> Result<(), AdminError>;
    async fn describe_config(&self, topic: &str) -> Result<HashMap<String, String>, AdminError>;
    async fn alter_config(&self, topic: &str, ops: &[AlterConfigOp]) -> Result<(), AdminError>;
    async fn describe_topic(&self, topic: &str) -> Result<TopicDescription, AdminError>;
    async fn increase_partitions(&self, topic: &str, total: u32) -> Result<(), AdminError>;
    async fn close(&self, timeout: Duration) -> Result<(), AdminError>;
}

/// Builds broker clients from the reporter's producer settings.
///
/// The admin client shares the producer's connection and security settings.
pub trait BrokerClientFactory: Send + Sync {
    fn producer(
        &self,
        config: &ProducerEnvConfig,
    ) -> Result<Arc<dyn RecordProducer>, PublishError>;

    fn admin(&self, config: &ProducerEnvConfig) -> Result<Arc<dyn TopicAdmin>, AdminError>;
}
