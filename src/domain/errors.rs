use std::time::Duration;
use thiserror::Error;

/// Errors raised while turning raw settings into typed reporter configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {key}")]
    Missing { key: String },

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error(
        "The metrics topic configuration must explicitly set the replication factor and the number of partitions (partitions={partitions}, replication_factor={replication_factor})"
    )]
    InvalidTopicDescriptor {
        partitions: i32,
        replication_factor: i16,
    },
}

/// Errors returned by the broker administrative client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("Topic {topic} already exists")]
    TopicExists { topic: String },

    #[error("Topic {topic} does not exist")]
    UnknownTopic { topic: String },

    #[error("Admin request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Not authorized: {reason}")]
    Authorization { reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Network failure: {reason}")]
    Network { reason: String },
}

/// Errors returned by the record producer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("Producer is closed")]
    Closed,

    #[error("Operation interrupted")]
    Interrupted,

    #[error("Delivery to {topic} failed: {reason}")]
    Delivery { topic: String, reason: String },

    #[error("Failed to serialize metric: {reason}")]
    Serialization { reason: String },

    #[error("Producer did not finish within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Invalid producer configuration: {reason}")]
    Configuration { reason: String },
}

/// Errors that abort the processing of a single reporting tick
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to publish metric: {0}")]
    Publish(#[from] PublishError),

    #[error("Failed to convert metric {metric}: {reason}")]
    Conversion { metric: String, reason: String },

    #[error("Legacy registry walk failed: {reason}")]
    Registry { reason: String },
}
