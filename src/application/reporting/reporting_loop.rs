use crate::application::reporting::intake_registry::IntakeRegistry;
use crate::application::reporting::legacy_processor::LegacyMetricProcessor;
use crate::application::reporting::publish_channel::PublishChannel;
use crate::application::reporting::topic_provisioner::{
    ADMIN_CLIENT_CLOSE_TIMEOUT, TopicProvisioner,
};
use crate::domain::errors::{PublishError, ReportError};
use crate::domain::metric::CanonicalMetric;
use crate::domain::ports::{LegacyMetricRegistry, MetricConverter, MetricSink, VisitContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Stand-in for deadlines too far out for the runtime timer
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Wall-clock milliseconds derived from a monotonic anchor.
///
/// Deadlines computed in epoch milliseconds map back onto `tokio::time::Instant`, so the
/// loop sleeps on the runtime timer (and follows paused time in tests).
#[derive(Debug, Clone, Copy)]
pub struct ReportingClock {
    origin_ms: i64,
    origin: Instant,
}

impl ReportingClock {
    pub fn new() -> Self {
        Self::starting_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn starting_at(origin_ms: i64) -> Self {
        Self {
            origin_ms,
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.origin_ms + self.origin.elapsed().as_millis() as i64
    }

    pub fn instant_at(&self, time_ms: i64) -> Instant {
        let offset = time_ms.saturating_sub(self.origin_ms).max(0) as u64;
        let offset = Duration::from_millis(offset).min(FAR_FUTURE);
        self.origin
            .checked_add(offset)
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
    }
}

impl Default for ReportingClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters describing what the loop did over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub published: u64,
    pub delivery_failures: u64,
}

/// The background task that collects and publishes metrics on a fixed cadence.
///
/// It is the single writer of the reporting time and the only caller of publish and flush.
/// The publish channel is not closed here; that belongs to the owner's shutdown path.
pub struct ReportingLoop {
    node_id: i32,
    interval: Duration,
    intake: Arc<IntakeRegistry>,
    channel: Arc<PublishChannel>,
    converter: Arc<dyn MetricConverter>,
    legacy_registry: Option<Arc<dyn LegacyMetricRegistry>>,
    legacy_processor: LegacyMetricProcessor,
    provisioner: Option<TopicProvisioner>,
    clock: ReportingClock,
    last_reporting_time: i64,
    shutdown: CancellationToken,
    stats: LoopStats,
}

impl ReportingLoop {
    pub fn new(
        node_id: i32,
        interval: Duration,
        intake: Arc<IntakeRegistry>,
        channel: Arc<PublishChannel>,
        converter: Arc<dyn MetricConverter>,
        shutdown: CancellationToken,
    ) -> Self {
        let clock = ReportingClock::new();
        Self {
            node_id,
            interval,
            intake,
            channel,
            legacy_processor: LegacyMetricProcessor::new(Arc::clone(&converter)),
            converter,
            legacy_registry: None,
            provisioner: None,
            last_reporting_time: clock.now_ms(),
            clock,
            shutdown,
            stats: LoopStats::default(),
        }
    }

    pub fn with_legacy_registry(mut self, registry: Arc<dyn LegacyMetricRegistry>) -> Self {
        self.legacy_registry = Some(registry);
        self
    }

    pub fn with_provisioner(mut self, provisioner: TopicProvisioner) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Replaces the clock; the first tick is due one interval after the clock's current time.
    pub fn with_clock(mut self, clock: ReportingClock) -> Self {
        self.last_reporting_time = clock.now_ms();
        self.clock = clock;
        self
    }

    pub fn spawn(self) -> JoinHandle<LoopStats> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> LoopStats {
        info!(
            "Starting metrics reporter with reporting interval of {} ms.",
            self.interval.as_millis()
        );
        self.provision_topic().await;

        let interval_ms = i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX);
        while !self.shutdown.is_cancelled() {
            let now = self.clock.now_ms();
            debug!("Reporting metrics for time {}.", now);

            if now >= self.last_reporting_time.saturating_add(interval_ms) {
                self.channel.failures().reset();
                self.last_reporting_time = now;
                self.stats.ticks += 1;
                self.guarded_tick(now);
            }
            self.flush().await;

            let failures = self.channel.failures().reset();
            if failures > 0 {
                warn!("Failed to send {} metrics for time {}", failures, now);
                self.stats.delivery_failures += failures as u64;
            }

            let next_report_time = now.saturating_add(interval_ms);
            debug!(
                "Reporting finished for time {} in {} ms. Next reporting time {}",
                now,
                self.clock.now_ms() - now,
                next_report_time
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = tokio::time::sleep_until(self.clock.instant_at(next_report_time)) => {}
            }
        }

        info!("Metrics reporter exited.");
        self.stats
    }

    async fn provision_topic(&mut self) {
        let Some(provisioner) = self.provisioner.take() else {
            return;
        };
        tokio::select! {
            outcome = provisioner.provision() => {
                debug!("Metrics topic provisioning finished: {:?}", outcome);
            }
            _ = self.shutdown.cancelled() => {
                info!("Metrics topic provisioning interrupted due to shutdown request.");
            }
        }
        provisioner.release(ADMIN_CLIENT_CLOSE_TIMEOUT).await;
    }

    /// Runs one collection pass; errors and panics end the tick, never the loop.
    fn guarded_tick(&mut self, now: i64) {
        let mut published = 0;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.report(now, &mut published)
        }));
        // Records queued before a failure still count
        self.stats.published += published as u64;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.stats.failed_ticks += 1;
                error!("Got error in metrics reporter for time {}: {}", now, e);
            }
            Err(_) => {
                self.stats.failed_ticks += 1;
                error!("Metrics reporter panicked while reporting time {}", now);
            }
        }
    }

    fn report(&mut self, now: i64, published: &mut usize) -> Result<(), ReportError> {
        self.report_legacy_metrics(now, published)?;
        self.report_registered_metrics(now, published)?;
        self.report_host_utilization(now, published)
    }

    fn report_legacy_metrics(
        &mut self,
        now: i64,
        published: &mut usize,
    ) -> Result<(), ReportError> {
        let Some(registry) = &self.legacy_registry else {
            return Ok(());
        };
        debug!("Reporting legacy metrics.");
        let counting = CountingSink::new(self.channel.as_ref());
        let ctx = VisitContext {
            sink: &counting,
            time_ms: now,
            node_id: self.node_id,
            interval: self.interval,
        };
        let walked = registry.walk(&mut self.legacy_processor, &ctx);
        *published += counting.count();
        walked?;
        self.legacy_processor.finish_walk();
        debug!("Finished reporting legacy metrics.");
        Ok(())
    }

    fn report_registered_metrics(
        &self,
        now: i64,
        published: &mut usize,
    ) -> Result<(), ReportError> {
        let metrics = self.intake.snapshot();
        debug!("Reporting {} registered metrics.", metrics.len());
        for metric in metrics {
            trace!("Converting registered metric {}", metric.name());
            if let Some(record) = self.converter.to_record(metric.as_ref(), now, self.node_id) {
                self.channel.publish(record)?;
                *published += 1;
            }
        }
        debug!("Finished reporting registered metrics.");
        Ok(())
    }

    fn report_host_utilization(&self, now: i64, published: &mut usize) -> Result<(), ReportError> {
        debug!("Reporting host utilization.");
        let record = self.converter.host_utilization(now, self.node_id)?;
        self.channel.publish(record)?;
        *published += 1;
        Ok(())
    }

    async fn flush(&self) {
        tokio::select! {
            biased;
            result = self.channel.flush() => match result {
                Ok(()) => {}
                Err(PublishError::Interrupted) if self.shutdown.is_cancelled() => {
                    info!("Metrics reporter is interrupted during flush due to shutdown request.");
                }
                Err(e) => error!("Failed to flush metrics: {}", e),
            },
            _ = self.shutdown.cancelled() => {
                info!("Metrics reporter is interrupted during flush due to shutdown request.");
            }
        }
    }
}

/// Counts records forwarded to the wrapped sink during one legacy walk.
struct CountingSink<'a> {
    inner: &'a dyn MetricSink,
    count: AtomicUsize,
}

impl<'a> CountingSink<'a> {
    fn new(inner: &'a dyn MetricSink) -> Self {
        Self {
            inner,
            count: AtomicUsize::new(0),
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl MetricSink for CountingSink<'_> {
    fn publish(&self, metric: CanonicalMetric) -> Result<(), ReportError> {
        self.inner.publish(metric)?;
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_runtime_time() {
        let clock = ReportingClock::starting_at(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_maps_deadlines_to_instants() {
        let clock = ReportingClock::starting_at(5_000);
        let deadline = clock.instant_at(6_500);

        tokio::time::sleep_until(deadline).await;
        assert_eq!(clock.now_ms(), 6_500);
        // Deadlines in the past resolve to the anchor
        assert!(clock.instant_at(0) <= Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_caps_distant_deadlines() {
        let clock = ReportingClock::starting_at(1_000);
        let deadline = clock.instant_at(i64::MAX);

        assert!(deadline > Instant::now() + Duration::from_secs(86_400 * 365));
        assert_eq!(deadline, clock.instant_at(i64::MAX - 1));
    }
}
