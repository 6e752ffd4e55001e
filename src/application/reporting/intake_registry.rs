use crate::domain::metric::{MetricHandle, MetricName};
use crate::domain::ports::InterestPredicate;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Host metrics the reporter has been told about and chose to keep.
///
/// Registration callbacks arrive on arbitrary host threads while the reporting loop
/// takes a snapshot once per tick. The map is sharded, so a snapshot only ever holds a
/// single shard lock at a time.
pub struct IntakeRegistry {
    metrics: DashMap<MetricName, Arc<dyn MetricHandle>>,
    interest: Arc<dyn InterestPredicate>,
}

impl IntakeRegistry {
    pub fn new(interest: Arc<dyn InterestPredicate>) -> Self {
        Self {
            metrics: DashMap::new(),
            interest,
        }
    }

    /// Stores `metric` if the interest predicate accepts it, replacing any handle
    /// registered under the same name. Returns whether the metric was kept.
    pub fn add_if_interested(&self, metric: Arc<dyn MetricHandle>) -> bool {
        let name = metric.name().clone();
        trace!("Checking metric {}", name);
        if !self.interest.is_interested(&name) {
            return false;
        }
        debug!("Added new metric {} to the metrics reporter.", name);
        self.metrics.insert(name, metric);
        true
    }

    /// Returns whether a metric was registered under `name`.
    pub fn remove(&self, name: &MetricName) -> bool {
        self.metrics.remove(name).is_some()
    }

    /// Point-in-time copy of the registered handles, safe to iterate while the host
    /// keeps adding and removing metrics.
    pub fn snapshot(&self) -> Vec<Arc<dyn MetricHandle>> {
        self.metrics
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn contains(&self, name: &MetricName) -> bool {
        self.metrics.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    struct StaticMetric {
        name: MetricName,
        value: f64,
    }

    impl MetricHandle for StaticMetric {
        fn name(&self) -> &MetricName {
            &self.name
        }

        fn value(&self) -> f64 {
            self.value
        }
    }

    fn metric(group: &str, name: &str, value: f64) -> Arc<dyn MetricHandle> {
        Arc::new(StaticMetric {
            name: MetricName::new(group, name),
            value,
        })
    }

    fn server_only() -> Arc<dyn InterestPredicate> {
        Arc::new(|name: &MetricName| name.group == "server")
    }

    #[test]
    fn test_only_interesting_metrics_are_kept() {
        let registry = IntakeRegistry::new(server_only());

        assert!(registry.add_if_interested(metric("server", "bytes-in", 1.0)));
        assert!(!registry.add_if_interested(metric("client", "bytes-in", 1.0)));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&MetricName::new("server", "bytes-in")));
    }

    #[test]
    fn test_re_adding_replaces_the_handle() {
        let registry = IntakeRegistry::new(server_only());
        registry.add_if_interested(metric("server", "requests", 1.0));
        registry.add_if_interested(metric("server", "requests", 2.0));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].value(), 2.0);
    }

    #[test]
    fn test_remove_unknown_metric_is_noop() {
        let registry = IntakeRegistry::new(server_only());
        registry.add_if_interested(metric("server", "requests", 1.0));

        assert!(!registry.remove(&MetricName::new("server", "unknown")));
        assert!(registry.remove(&MetricName::new("server", "requests")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_matches_operations_under_concurrent_reads() {
        let registry = Arc::new(IntakeRegistry::new(server_only()));
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let registry = Arc::clone(&registry);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut snapshots = 0usize;
                while !done.load(Ordering::Acquire) {
                    let _ = registry.snapshot().len();
                    snapshots += 1;
                }
                snapshots
            })
        };

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..200 {
                        registry.add_if_interested(metric("server", &format!("m-{w}-{i}"), 1.0));
                        registry.add_if_interested(metric("client", &format!("m-{w}-{i}"), 1.0));
                        if i % 2 == 0 {
                            registry.remove(&MetricName::new("server", format!("m-{w}-{i}")));
                        }
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap();

        let names: BTreeSet<String> = registry
            .snapshot()
            .iter()
            .map(|m| m.name().name.clone())
            .collect();
        let expected: BTreeSet<String> = (0..4)
            .flat_map(|w| (0..200).filter(|i| i % 2 == 1).map(move |i| format!("m-{w}-{i}")))
            .collect();
        assert_eq!(names, expected);
    }
}
