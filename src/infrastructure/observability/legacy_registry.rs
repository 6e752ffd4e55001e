//! Walks a Prometheus registry as the legacy gauge/counter registry.

use crate::domain::errors::ReportError;
use crate::domain::metric::{LegacyMetric, LegacyValue, MetricName};
use crate::domain::ports::{LegacyMetricRegistry, LegacyMetricVisitor, VisitContext};
use prometheus::Registry;
use prometheus::proto::{Metric, MetricFamily, MetricType};
use tracing::trace;

/// Exposes every metric registered in a `prometheus::Registry` to the reporting loop.
///
/// All metrics share the group given at construction; the family name becomes the metric
/// name and the labels become tags.
#[derive(Clone)]
pub struct PrometheusLegacyRegistry {
    registry: Registry,
    group: String,
}

impl PrometheusLegacyRegistry {
    pub fn new(registry: Registry, group: impl Into<String>) -> Self {
        Self {
            registry,
            group: group.into(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn metrics_of(&self, family: &MetricFamily) -> Vec<LegacyMetric> {
        family
            .get_metric()
            .iter()
            .map(|metric| LegacyMetric {
                name: self.name_of(family, metric),
                value: value_of(family.get_field_type(), metric),
            })
            .collect()
    }

    fn name_of(&self, family: &MetricFamily, metric: &Metric) -> MetricName {
        metric.get_label().iter().fold(
            MetricName::new(self.group.clone(), family.get_name()),
            |name, label| name.with_tag(label.get_name(), label.get_value()),
        )
    }
}

fn value_of(metric_type: MetricType, metric: &Metric) -> LegacyValue {
    match metric_type {
        MetricType::COUNTER => LegacyValue::Counter(metric.get_counter().get_value()),
        MetricType::GAUGE => LegacyValue::Gauge(metric.get_gauge().get_value()),
        MetricType::UNTYPED => LegacyValue::Gauge(metric.get_untyped().get_value()),
        MetricType::HISTOGRAM => {
            let histogram = metric.get_histogram();
            LegacyValue::Histogram {
                count: histogram.get_sample_count(),
                sum: histogram.get_sample_sum(),
            }
        }
        MetricType::SUMMARY => {
            let summary = metric.get_summary();
            LegacyValue::Summary {
                count: summary.get_sample_count(),
                sum: summary.get_sample_sum(),
            }
        }
    }
}

impl LegacyMetricRegistry for PrometheusLegacyRegistry {
    fn walk(
        &self,
        visitor: &mut dyn LegacyMetricVisitor,
        ctx: &VisitContext<'_>,
    ) -> Result<(), ReportError> {
        for family in self.registry.gather() {
            for metric in self.metrics_of(&family) {
                trace!("Visiting legacy metric {}", metric.name);
                visitor.visit(&metric, ctx)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::CanonicalMetric;
    use crate::domain::ports::MetricSink;
    use prometheus::{Counter, GaugeVec, Histogram, HistogramOpts, Opts};
    use std::time::Duration;

    struct NullSink;

    impl MetricSink for NullSink {
        fn publish(&self, _metric: CanonicalMetric) -> Result<(), ReportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<LegacyMetric>);

    impl LegacyMetricVisitor for Recorder {
        fn visit(&mut self, metric: &LegacyMetric, _ctx: &VisitContext<'_>) -> Result<(), ReportError> {
            self.0.push(metric.clone());
            Ok(())
        }
    }

    #[test]
    fn test_walk_visits_every_metric_with_labels() {
        let registry = Registry::new();
        let requests = Counter::with_opts(Opts::new("requests_total", "Requests")).unwrap();
        registry.register(Box::new(requests.clone())).unwrap();
        requests.inc_by(3.0);

        let log_size = GaugeVec::new(Opts::new("log_size_bytes", "Log size"), &["topic"]).unwrap();
        registry.register(Box::new(log_size.clone())).unwrap();
        log_size.with_label_values(&["orders"]).set(2048.0);

        let latency =
            Histogram::with_opts(HistogramOpts::new("produce_latency_ms", "Latency")).unwrap();
        registry.register(Box::new(latency.clone())).unwrap();
        latency.observe(4.0);
        latency.observe(6.0);

        let walker = PrometheusLegacyRegistry::new(registry, "server");
        let mut recorder = Recorder::default();
        let ctx = VisitContext {
            sink: &NullSink,
            time_ms: 0,
            node_id: 0,
            interval: Duration::from_secs(60),
        };
        walker.walk(&mut recorder, &ctx).unwrap();

        let visited = recorder.0;
        assert_eq!(visited.len(), 3);

        let size = visited
            .iter()
            .find(|m| m.name.name == "log_size_bytes")
            .unwrap();
        assert_eq!(size.name.group, "server");
        assert_eq!(size.name.tag("topic"), Some("orders"));
        assert_eq!(size.value, LegacyValue::Gauge(2048.0));

        let total = visited
            .iter()
            .find(|m| m.name.name == "requests_total")
            .unwrap();
        assert_eq!(total.value, LegacyValue::Counter(3.0));

        let histogram = visited
            .iter()
            .find(|m| m.name.name == "produce_latency_ms")
            .unwrap();
        assert_eq!(
            histogram.value,
            LegacyValue::Histogram {
                count: 2,
                sum: 10.0
            }
        );
    }
}
