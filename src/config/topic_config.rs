//! Metrics topic configuration.

use super::{Lookup, parse_or};
use crate::domain::errors::ConfigError;
use crate::domain::topic::{CleanupPolicy, TopicDescriptor};
use std::time::Duration;

pub const METRICS_TOPIC: &str = "metrics.topic";
pub const METRICS_TOPIC_AUTO_CREATE: &str = "metrics.topic.auto.create";
pub const METRICS_TOPIC_NUM_PARTITIONS: &str = "metrics.topic.num.partitions";
pub const METRICS_TOPIC_REPLICATION_FACTOR: &str = "metrics.topic.replication.factor";
pub const METRICS_TOPIC_RETENTION_MS: &str = "metrics.topic.retention.ms";
pub const METRICS_TOPIC_CLEANUP_POLICY: &str = "metrics.topic.cleanup.policy";

pub const DEFAULT_METRICS_TOPIC: &str = "__BrokerMetrics";
pub const DEFAULT_RETENTION_MS: u64 = 5 * 60 * 60 * 1000;

/// Metrics topic environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicEnvConfig {
    pub name: String,
    pub auto_create: bool,
    /// Signed so an unset value (-1) survives until descriptor validation
    pub partitions: i32,
    pub replication_factor: i16,
    pub retention: Duration,
    pub cleanup_policy: CleanupPolicy,
}

impl Default for TopicEnvConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_METRICS_TOPIC.to_string(),
            auto_create: false,
            partitions: -1,
            replication_factor: -1,
            retention: Duration::from_millis(DEFAULT_RETENTION_MS),
            cleanup_policy: CleanupPolicy::Delete,
        }
    }
}

impl TopicEnvConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cleanup_policy = match lookup(METRICS_TOPIC_CLEANUP_POLICY) {
            Some(raw) => raw.parse::<CleanupPolicy>()?,
            None => defaults.cleanup_policy,
        };
        let name = lookup(METRICS_TOPIC)
            .map(|n| n.trim().to_string())
            .unwrap_or(defaults.name);
        if name.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: METRICS_TOPIC.to_string(),
                value: name,
                reason: "topic name must not be empty".to_string(),
            });
        }

        Ok(Self {
            name,
            auto_create: parse_or(lookup, METRICS_TOPIC_AUTO_CREATE, defaults.auto_create)?,
            partitions: parse_or(lookup, METRICS_TOPIC_NUM_PARTITIONS, defaults.partitions)?,
            replication_factor: parse_or(
                lookup,
                METRICS_TOPIC_REPLICATION_FACTOR,
                defaults.replication_factor,
            )?,
            retention: Duration::from_millis(parse_or(
                lookup,
                METRICS_TOPIC_RETENTION_MS,
                DEFAULT_RETENTION_MS,
            )?),
            cleanup_policy,
        })
    }

    /// Desired topic state, validated before any broker request.
    pub fn descriptor(&self) -> Result<TopicDescriptor, ConfigError> {
        TopicDescriptor::new(
            self.name.clone(),
            self.partitions,
            self.replication_factor,
            self.retention,
            self.cleanup_policy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<TopicEnvConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TopicEnvConfig::from_lookup(&|key| map.get(key).cloned())
    }

    #[test]
    fn test_topic_config_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.name, DEFAULT_METRICS_TOPIC);
        assert!(!config.auto_create);
        assert_eq!(config.retention, Duration::from_secs(5 * 3600));
        assert_eq!(config.cleanup_policy, CleanupPolicy::Delete);
        // Partitions and replication must be set explicitly before a descriptor exists
        assert!(config.descriptor().is_err());
    }

    #[test]
    fn test_explicit_topic_settings_build_a_descriptor() {
        let config = load(&[
            (METRICS_TOPIC, "cluster-metrics"),
            (METRICS_TOPIC_AUTO_CREATE, "true"),
            (METRICS_TOPIC_NUM_PARTITIONS, "4"),
            (METRICS_TOPIC_REPLICATION_FACTOR, "1"),
            (METRICS_TOPIC_RETENTION_MS, "86400000"),
            (METRICS_TOPIC_CLEANUP_POLICY, "delete"),
        ])
        .unwrap();

        let descriptor = config.descriptor().unwrap();
        assert_eq!(descriptor.name(), "cluster-metrics");
        assert_eq!(descriptor.partitions(), 4);
        assert_eq!(descriptor.replication_factor(), 1);
        assert_eq!(descriptor.retention(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_unparsable_values_are_errors() {
        assert!(load(&[(METRICS_TOPIC_NUM_PARTITIONS, "many")]).is_err());
        assert!(load(&[(METRICS_TOPIC_CLEANUP_POLICY, "keep")]).is_err());
        assert!(load(&[(METRICS_TOPIC, "  ")]).is_err());
    }
}
