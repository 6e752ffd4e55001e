use crate::application::reporting::intake_registry::IntakeRegistry;
use crate::application::reporting::publish_channel::{
    FailureCounter, PRODUCER_CLOSE_TIMEOUT, PublishChannel,
};
use crate::application::reporting::reporting_loop::{LoopStats, ReportingClock, ReportingLoop};
use crate::application::reporting::topic_provisioner::{
    ADMIN_CLIENT_CLOSE_TIMEOUT, TopicProvisioner,
};
use crate::config::ReporterConfig;
use crate::domain::metric::{MetricHandle, MetricName};
use crate::domain::ports::{
    BrokerClientFactory, InterestPredicate, LegacyMetricRegistry, MetricConverter,
    MetricSerializer,
};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// External collaborators the reporter is wired with
pub struct ReporterComponents {
    /// Builds the producer, and the admin client when the topic is provisioned automatically
    pub clients: Arc<dyn BrokerClientFactory>,
    pub serializer: Arc<dyn MetricSerializer>,
    pub converter: Arc<dyn MetricConverter>,
    pub interest: Arc<dyn InterestPredicate>,
    pub legacy_registry: Option<Arc<dyn LegacyMetricRegistry>>,
}

/// Host-facing lifecycle of the metrics reporter.
///
/// `configure` wires the components, `init` starts the background loop, the host reports
/// metric registrations as they happen, and `close` runs the shutdown path.
pub struct MetricsReporter {
    config: ReporterConfig,
    intake: Arc<IntakeRegistry>,
    channel: Arc<PublishChannel>,
    converter: Arc<dyn MetricConverter>,
    legacy_registry: Option<Arc<dyn LegacyMetricRegistry>>,
    provisioner: Mutex<Option<TopicProvisioner>>,
    clock: Option<ReportingClock>,
    shutdown: CancellationToken,
    runner: Mutex<Option<JoinHandle<LoopStats>>>,
}

impl MetricsReporter {
    /// Builds the clients from the producer settings and wires the reporter.
    ///
    /// Fails only when the producer cannot be created. Problems with topic provisioning
    /// disable it with a warning.
    pub fn configure(config: ReporterConfig, components: ReporterComponents) -> Result<Self> {
        let producer = components
            .clients
            .producer(&config.producer)
            .context("Failed to create metrics producer")?;
        let channel = Arc::new(PublishChannel::new(
            producer,
            components.serializer,
            config.topic.name.clone(),
            FailureCounter::new(),
        ));

        let provisioner = if config.topic.auto_create {
            match config.topic.descriptor() {
                Ok(descriptor) => match components.clients.admin(&config.producer) {
                    Ok(admin) => Some(TopicProvisioner::new(admin, descriptor)),
                    Err(e) => {
                        warn!("Metrics topic auto creation was disabled: {}", e);
                        None
                    }
                },
                Err(e) => {
                    warn!("Metrics topic auto creation was disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            intake: Arc::new(IntakeRegistry::new(components.interest)),
            channel,
            converter: components.converter,
            legacy_registry: components.legacy_registry,
            provisioner: Mutex::new(provisioner),
            clock: None,
            shutdown: CancellationToken::new(),
            runner: Mutex::new(None),
            config,
        })
    }

    /// Anchors the reporting loop to `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: ReportingClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    pub fn intake(&self) -> &Arc<IntakeRegistry> {
        &self.intake
    }

    pub fn channel(&self) -> &Arc<PublishChannel> {
        &self.channel
    }

    pub fn will_provision_topic(&self) -> bool {
        lock(&self.provisioner).is_some()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.runner).is_some()
    }

    /// Registers the initial metrics and starts the reporting loop. Must be called from
    /// within a Tokio runtime; calling it twice has no effect.
    pub fn init(&self, metrics: impl IntoIterator<Item = Arc<dyn MetricHandle>>) {
        let mut runner = lock(&self.runner);
        if runner.is_some() || self.shutdown.is_cancelled() {
            warn!("Metrics reporter already started, ignoring init.");
            return;
        }

        for metric in metrics {
            self.intake.add_if_interested(metric);
        }
        info!(
            "Added {} metrics for the metrics reporter during initialization.",
            self.intake.len()
        );

        let mut reporting_loop = ReportingLoop::new(
            self.config.node_id,
            self.config.reporting_interval,
            Arc::clone(&self.intake),
            Arc::clone(&self.channel),
            Arc::clone(&self.converter),
            self.shutdown.child_token(),
        );
        if let Some(registry) = &self.legacy_registry {
            reporting_loop = reporting_loop.with_legacy_registry(Arc::clone(registry));
        }
        if let Some(provisioner) = lock(&self.provisioner).take() {
            reporting_loop = reporting_loop.with_provisioner(provisioner);
        }
        if let Some(clock) = self.clock {
            reporting_loop = reporting_loop.with_clock(clock);
        }
        *runner = Some(reporting_loop.spawn());
    }

    pub fn metric_change(&self, metric: Arc<dyn MetricHandle>) {
        self.intake.add_if_interested(metric);
    }

    pub fn metric_removal(&self, name: &MetricName) {
        self.intake.remove(name);
    }

    /// Stops the loop and closes the clients with a fixed grace period.
    ///
    /// Returns the loop statistics when the loop was running and exited cleanly.
    pub async fn close(&self) -> Option<LoopStats> {
        info!("Closing metrics reporter.");
        self.shutdown.cancel();

        let runner = lock(&self.runner).take();
        let stats = match runner {
            Some(mut handle) => match tokio::time::timeout(LOOP_JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(stats)) => Some(stats),
                Ok(Err(e)) => {
                    error!("Metrics reporter task failed: {}", e);
                    None
                }
                Err(_) => {
                    warn!(
                        "Metrics reporter did not stop within {:?}, aborting it.",
                        LOOP_JOIN_TIMEOUT
                    );
                    handle.abort();
                    None
                }
            },
            None => None,
        };

        // The admin client of a loop that never started is still open
        let unused = lock(&self.provisioner).take();
        if let Some(provisioner) = unused {
            provisioner.release(ADMIN_CLIENT_CLOSE_TIMEOUT).await;
        }

        self.channel.close(PRODUCER_CLOSE_TIMEOUT).await;
        stats
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
