//! Local metric sources read by the reporter.
//!
//! 1. **Legacy registry**: a Prometheus registry walked once per tick
//! 2. **Host sampler**: CPU utilization of the machine running the agent

pub mod host_sampler;
pub mod legacy_registry;

pub use host_sampler::SysinfoHostSampler;
pub use legacy_registry::PrometheusLegacyRegistry;
