use crate::domain::ports::HostSampler;
use std::sync::Mutex;
use sysinfo::System;

/// Host CPU sampler backed by the `sysinfo` crate.
///
/// Utilization is measured between two refreshes, so the very first sample after
/// construction may read zero.
pub struct SysinfoHostSampler {
    system: Mutex<System>,
}

impl SysinfoHostSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoHostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler for SysinfoHostSampler {
    fn cpu_utilization(&self) -> Option<f64> {
        let mut system = self.system.lock().ok()?;
        system.refresh_cpu_usage();
        let usage = f64::from(system.global_cpu_usage()) / 100.0;
        usage.is_finite().then(|| usage.clamp(0.0, 1.0))
    }
}
