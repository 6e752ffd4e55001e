pub mod metrics_reporter;

pub use metrics_reporter::{MetricsReporter, ReporterComponents};
