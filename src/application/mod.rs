// Reporting core: intake, provisioning, publishing and the loop
pub mod reporting;

// Host-facing lifecycle
pub mod system;
