use crate::domain::errors::ReportError;
use crate::domain::metric::{LegacyMetric, LegacyValue, MetricName};
use crate::domain::ports::{LegacyMetricVisitor, MetricConverter, VisitContext};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Last observation of a legacy counter
#[derive(Debug, Clone, Copy, PartialEq)]
struct CounterSample {
    count: f64,
    time_ms: i64,
}

/// Visitor that converts legacy registry entries into canonical records and publishes them.
///
/// Counters are reported as per-second rates over the time elapsed since their previous
/// observation, so the first observation of a counter only seeds its baseline. Baselines of
/// counters missing from a completed walk are dropped.
pub struct LegacyMetricProcessor {
    converter: Arc<dyn MetricConverter>,
    previous_counts: HashMap<MetricName, CounterSample>,
    seen: HashSet<MetricName>,
}

impl LegacyMetricProcessor {
    pub fn new(converter: Arc<dyn MetricConverter>) -> Self {
        Self {
            converter,
            previous_counts: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    /// Number of counters with a stored baseline.
    pub fn tracked_counters(&self) -> usize {
        self.previous_counts.len()
    }

    /// Ends a complete walk: forgets counters that were not visited during it.
    pub fn finish_walk(&mut self) {
        let seen = std::mem::take(&mut self.seen);
        self.previous_counts.retain(|name, _| seen.contains(name));
    }

    fn reportable_value(&mut self, metric: &LegacyMetric, ctx: &VisitContext<'_>) -> Option<f64> {
        match metric.value {
            LegacyValue::Gauge(value) => Some(value),
            LegacyValue::Counter(count) => {
                self.seen.insert(metric.name.clone());
                let current = CounterSample {
                    count,
                    time_ms: ctx.time_ms,
                };
                let previous = self.previous_counts.insert(metric.name.clone(), current)?;
                let elapsed_ms = current.time_ms.saturating_sub(previous.time_ms);
                if elapsed_ms <= 0 {
                    return None;
                }
                // A counter that went backwards was reset; count from zero.
                let delta = if count >= previous.count {
                    count - previous.count
                } else {
                    count
                };
                Some(delta / (elapsed_ms as f64 / 1000.0))
            }
            LegacyValue::Histogram { count, sum } | LegacyValue::Summary { count, sum } => {
                (count > 0).then(|| sum / count as f64)
            }
        }
    }
}

impl LegacyMetricVisitor for LegacyMetricProcessor {
    fn visit(&mut self, metric: &LegacyMetric, ctx: &VisitContext<'_>) -> Result<(), ReportError> {
        trace!("Processing legacy metric {}", metric.name);
        let Some(value) = self.reportable_value(metric, ctx) else {
            return Ok(());
        };
        match self
            .converter
            .record_for(&metric.name, value, ctx.time_ms, ctx.node_id)
        {
            Some(record) => ctx.sink.publish(record),
            None => Ok(()),
        }
    }
}
