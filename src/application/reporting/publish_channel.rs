use crate::domain::errors::{PublishError, ReportError};
use crate::domain::metric::CanonicalMetric;
use crate::domain::ports::{MetricSerializer, MetricSink, ProducerRecord, RecordProducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const PRODUCER_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of failed deliveries since the last reset.
///
/// Cloned into every delivery callback; callbacks may run on producer threads.
#[derive(Debug, Clone, Default)]
pub struct FailureCounter(Arc<AtomicUsize>);

impl FailureCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    /// Resets to zero and returns the previous count.
    pub fn reset(&self) -> usize {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// Sends canonical records to the metrics topic and counts delivery failures.
pub struct PublishChannel {
    producer: Arc<dyn RecordProducer>,
    serializer: Arc<dyn MetricSerializer>,
    topic: String,
    failures: FailureCounter,
    closed: AtomicBool,
}

impl PublishChannel {
    pub fn new(
        producer: Arc<dyn RecordProducer>,
        serializer: Arc<dyn MetricSerializer>,
        topic: impl Into<String>,
        failures: FailureCounter,
    ) -> Self {
        Self {
            producer,
            serializer,
            topic: topic.into(),
            failures,
            closed: AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn failures(&self) -> &FailureCounter {
        &self.failures
    }

    /// Queues `metric` and returns immediately.
    ///
    /// Records of a topic share the topic name as key so one downstream sampler sees all
    /// of them; node-level records are keyed by node id. The record carries the metric's own
    /// timestamp rather than the send time.
    pub fn send_metric(&self, metric: CanonicalMetric) -> Result<(), PublishError> {
        let record = ProducerRecord {
            topic: self.topic.clone(),
            key: metric.partition_key(),
            timestamp_ms: metric.time_ms,
            value: self.serializer.serialize(&metric)?,
        };
        debug!("Sending metric {:?}.", metric);

        let failures = self.failures.clone();
        self.producer.send(
            record,
            Box::new(move |result| {
                if let Err(e) = result {
                    failures.increment();
                    warn!("Failed to send metric {:?}: {}", metric, e);
                }
            }),
        )
    }

    pub async fn flush(&self) -> Result<(), PublishError> {
        self.producer.flush().await
    }

    /// Delivers what is still buffered within `timeout`, then releases the producer.
    /// Only the first call has any effect.
    pub async fn close(&self, timeout: Duration) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match tokio::time::timeout(timeout, self.producer.close(timeout)).await {
            Ok(Ok(())) => info!("Metrics producer closed."),
            Ok(Err(e)) => warn!("Failed to close metrics producer: {}", e),
            Err(_) => warn!(
                "Metrics producer did not close within {:?}, dropping buffered metrics.",
                timeout
            ),
        }
    }
}

impl MetricSink for PublishChannel {
    fn publish(&self, metric: CanonicalMetric) -> Result<(), ReportError> {
        Ok(self.send_metric(metric)?)
    }
}
