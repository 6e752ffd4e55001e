use crate::domain::errors::PublishError;
use crate::domain::metric::CanonicalMetric;
use crate::domain::ports::MetricSerializer;

/// Encodes canonical records as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMetricSerializer;

impl MetricSerializer for JsonMetricSerializer {
    fn serialize(&self, metric: &CanonicalMetric) -> Result<Vec<u8>, PublishError> {
        serde_json::to_vec(metric).map_err(|e| PublishError::Serialization {
            reason: e.to_string(),
        })
    }
}
