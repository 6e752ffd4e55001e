// Domain-specific error types
pub mod errors;

// Metric identities and canonical records
pub mod metric;

// Port interfaces
pub mod ports;

// Metrics topic descriptor and reconciliation types
pub mod topic;
