//! Metrics reporter agent - standalone runner
//!
//! Runs the reporting loop against an in-memory broker, with a Prometheus registry as the
//! legacy metric source. Useful to watch the loop, provisioning and failure accounting in
//! the logs without a real cluster.
//!
//! # Usage
//! ```sh
//! NODE_ID=1 METRICS_REPORTER_INTERVAL_MS=5000 cargo run -- --run-for 30
//! ```
//!
//! # Environment Variables
//! - `NODE_ID` - Node identifier (required)
//! - `METRICS_REPORTER_INTERVAL_MS` - Reporting interval (default: 60000)
//! - `METRICS_TOPIC_AUTO_CREATE` - Provision the metrics topic at startup (default: false)
//! - `RUST_LOG` - Log filter (default: info)

use anyhow::Result;
use clap::Parser;
use metrics_reporter::application::system::{MetricsReporter, ReporterComponents};
use metrics_reporter::config::ReporterConfig;
use metrics_reporter::domain::metric::{MetricHandle, MetricName};
use metrics_reporter::infrastructure::observability::{
    PrometheusLegacyRegistry, SysinfoHostSampler,
};
use metrics_reporter::infrastructure::{
    DefaultMetricConverter, GroupInterest, InMemoryBroker, JsonMetricSerializer,
};
use prometheus::{IntCounter, Opts, Registry};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Broker metrics reporter agent", long_about = None)]
struct Cli {
    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    run_for: Option<u64>,

    /// Metric groups whose registrations are reported
    #[arg(long, value_delimiter = ',', default_value = "server,network,log")]
    groups: Vec<String>,

    /// Group assigned to metrics of the legacy registry
    #[arg(long, default_value = "server")]
    legacy_group: String,
}

/// Host-side gauge registered with the reporter
struct DemoGauge {
    name: MetricName,
    bits: AtomicU64,
}

impl DemoGauge {
    fn new(name: MetricName, value: f64) -> Self {
        Self {
            name,
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl MetricHandle for DemoGauge {
    fn name(&self) -> &MetricName {
        &self.name
    }

    fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    info!("Metrics reporter {} starting...", env!("CARGO_PKG_VERSION"));

    let config = ReporterConfig::from_env()?;
    info!(
        "Configuration loaded: node={}, topic={}, interval={:?}, auto_create={}",
        config.node_id, config.topic.name, config.reporting_interval, config.topic.auto_create
    );

    let broker = InMemoryBroker::new();
    let registry = Registry::new();
    let requests = IntCounter::with_opts(Opts::new("requests_total", "Handled requests"))?;
    registry.register(Box::new(requests.clone()))?;

    let components = ReporterComponents {
        clients: Arc::new(broker.clone()),
        serializer: Arc::new(JsonMetricSerializer),
        converter: Arc::new(DefaultMetricConverter::new(
            Arc::new(SysinfoHostSampler::new()),
            cli.groups.iter().cloned(),
        )),
        interest: Arc::new(GroupInterest::new(cli.groups.iter().cloned())),
        legacy_registry: Some(Arc::new(PrometheusLegacyRegistry::new(
            registry,
            cli.legacy_group.clone(),
        ))),
    };
    let reporter = MetricsReporter::configure(config.clone(), components)?;

    let queue_depth = Arc::new(DemoGauge::new(
        MetricName::new("network", "request-queue-size"),
        0.0,
    ));
    let topic_bytes = Arc::new(DemoGauge::new(
        MetricName::new("server", "bytes-in").with_tag("topic", "orders"),
        0.0,
    ));
    reporter.init([
        queue_depth.clone() as Arc<dyn MetricHandle>,
        topic_bytes.clone() as Arc<dyn MetricHandle>,
    ]);

    // Simulated host activity
    let activity = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(200));
        let mut step = 0u64;
        loop {
            ticker.tick().await;
            step += 1;
            requests.inc();
            queue_depth.set((step % 17) as f64);
            topic_bytes.set((step * 512) as f64);
        }
    });

    match cli.run_for {
        Some(seconds) => {
            info!("Running for {}s.", seconds);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }
        None => {
            info!("Reporter running. Press Ctrl+C to shutdown.");
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received.");
        }
    }

    activity.abort();
    if let Some(stats) = reporter.close().await {
        info!(
            "Reporter stopped after {} ticks ({} failed), {} metrics published, {} delivery failures.",
            stats.ticks, stats.failed_ticks, stats.published, stats.delivery_failures
        );
    }
    info!(
        "{} records on topic {}.",
        broker.records(&config.topic.name).len(),
        config.topic.name
    );

    Ok(())
}
