// Host metric registrations
pub mod intake_registry;

// Legacy registry visitor
pub mod legacy_processor;

// Keyed, asynchronous publishing with failure accounting
pub mod publish_channel;

// Background collect-and-publish loop
pub mod reporting_loop;

// Metrics topic creation and reconciliation
pub mod topic_provisioner;

pub use intake_registry::IntakeRegistry;
pub use publish_channel::{FailureCounter, PublishChannel};
pub use reporting_loop::{LoopStats, ReportingClock, ReportingLoop};
pub use topic_provisioner::{ProvisionOutcome, TopicProvisioner};
