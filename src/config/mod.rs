//! Configuration module for the metrics reporter.
//!
//! Settings are read through a single lookup function keyed by property name
//! (`metrics.reporter.linger.ms`). The host may hand over its own property map, or the
//! values can come from environment variables, where each property maps to its upper-case,
//! underscore-separated form (`METRICS_REPORTER_LINGER_MS`).

mod producer_config;
mod topic_config;

pub use producer_config::{
    ACKS, BATCH_SIZE, BOOTSTRAP_SERVERS, CLIENT_ID, COMPRESSION_TYPE, KEY_SERIALIZER, LINGER_MS,
    ProducerEnvConfig, RETRIES, SECURITY_PROTOCOL, VALUE_SERIALIZER,
};
pub use topic_config::{
    DEFAULT_METRICS_TOPIC, METRICS_TOPIC, METRICS_TOPIC_AUTO_CREATE,
    METRICS_TOPIC_CLEANUP_POLICY, METRICS_TOPIC_NUM_PARTITIONS, METRICS_TOPIC_REPLICATION_FACTOR,
    METRICS_TOPIC_RETENTION_MS, TopicEnvConfig,
};

use crate::domain::errors::ConfigError;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

pub const REPORTING_INTERVAL_MS: &str = "metrics.reporter.interval.ms";
pub const NODE_ID: &str = "node.id";
pub const DEFAULT_REPORTING_INTERVAL_MS: u64 = 60_000;
/// Largest interval that still fits epoch-millisecond arithmetic
pub const MAX_REPORTING_INTERVAL_MS: u64 = i64::MAX as u64;

/// Resolves a property name to its raw value.
pub(crate) type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub(crate) fn parse_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

/// Environment variable holding `property`.
pub fn env_var_name(property: &str) -> String {
    property.replace(['.', '-'], "_").to_uppercase()
}

/// Complete reporter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    pub producer: ProducerEnvConfig,
    pub topic: TopicEnvConfig,
    pub reporting_interval: Duration,
    pub node_id: i32,
}

impl ReporterConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|property| env::var(env_var_name(property)).ok())
    }

    /// Load configuration from a host-supplied property map.
    pub fn from_map(properties: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(&|property| properties.get(property).cloned())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        let node_id = lookup(NODE_ID).ok_or_else(|| ConfigError::Missing {
            key: NODE_ID.to_string(),
        })?;
        let node_id = node_id
            .trim()
            .parse::<i32>()
            .map_err(|e| ConfigError::InvalidValue {
                key: NODE_ID.to_string(),
                value: node_id.clone(),
                reason: e.to_string(),
            })?;

        let interval_ms: u64 =
            parse_or(lookup, REPORTING_INTERVAL_MS, DEFAULT_REPORTING_INTERVAL_MS)?;
        if interval_ms == 0 || interval_ms > MAX_REPORTING_INTERVAL_MS {
            return Err(ConfigError::InvalidValue {
                key: REPORTING_INTERVAL_MS.to_string(),
                value: interval_ms.to_string(),
                reason: format!(
                    "reporting interval must be between 1 and {} ms",
                    MAX_REPORTING_INTERVAL_MS
                ),
            }
            .into());
        }

        let producer =
            ProducerEnvConfig::from_lookup(lookup).context("Failed to load producer config")?;
        let topic = TopicEnvConfig::from_lookup(lookup).context("Failed to load topic config")?;

        Ok(Self {
            producer,
            topic,
            reporting_interval: Duration::from_millis(interval_ms),
            node_id,
        })
    }
}
