//! Desired and observed state of the metrics topic.

use crate::domain::errors::ConfigError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const RETENTION_MS_CONFIG: &str = "retention.ms";
pub const CLEANUP_POLICY_CONFIG: &str = "cleanup.policy";

/// Log cleanup policy of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPolicy {
    Delete,
    Compact,
    CompactDelete,
}

impl CleanupPolicy {
    pub fn as_config_value(&self) -> &'static str {
        match self {
            CleanupPolicy::Delete => "delete",
            CleanupPolicy::Compact => "compact",
            CleanupPolicy::CompactDelete => "compact,delete",
        }
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_value())
    }
}

impl FromStr for CleanupPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = policy_set(s);
        let has_delete = parts.contains("delete");
        let has_compact = parts.contains("compact");
        match (has_delete, has_compact, parts.len()) {
            (true, false, 1) => Ok(CleanupPolicy::Delete),
            (false, true, 1) => Ok(CleanupPolicy::Compact),
            (true, true, 2) => Ok(CleanupPolicy::CompactDelete),
            _ => Err(ConfigError::InvalidValue {
                key: CLEANUP_POLICY_CONFIG.to_string(),
                value: s.to_string(),
                reason: "must be 'delete', 'compact' or 'compact,delete'".to_string(),
            }),
        }
    }
}

fn policy_set(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Desired shape of the metrics topic.
///
/// Built once at startup; partitions and replication factor are validated before any
/// request reaches the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescriptor {
    name: String,
    partitions: u32,
    replication_factor: u16,
    retention: Duration,
    cleanup_policy: CleanupPolicy,
}

impl TopicDescriptor {
    pub fn new(
        name: impl Into<String>,
        partitions: i32,
        replication_factor: i16,
        retention: Duration,
        cleanup_policy: CleanupPolicy,
    ) -> Result<Self, ConfigError> {
        if partitions <= 0 || replication_factor <= 0 {
            return Err(ConfigError::InvalidTopicDescriptor {
                partitions,
                replication_factor,
            });
        }
        Ok(Self {
            name: name.into(),
            partitions: partitions as u32,
            replication_factor: replication_factor as u16,
            retention,
            cleanup_policy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    pub fn replication_factor(&self) -> u16 {
        self.replication_factor
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn cleanup_policy(&self) -> CleanupPolicy {
        self.cleanup_policy
    }

    /// Topic-level configs the agent owns; everything else is left to operators.
    pub fn configs(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                RETENTION_MS_CONFIG.to_string(),
                self.retention.as_millis().to_string(),
            ),
            (
                CLEANUP_POLICY_CONFIG.to_string(),
                self.cleanup_policy.as_config_value().to_string(),
            ),
        ])
    }

    /// Minimal set of SET operations bringing `live` in line with the owned configs.
    ///
    /// Keys absent from `live` count as differing. Cleanup policies compare as sets.
    pub fn config_diff(&self, live: &HashMap<String, String>) -> Vec<AlterConfigOp> {
        let mut ops: Vec<AlterConfigOp> = self
            .configs()
            .into_iter()
            .filter(|(key, desired)| match live.get(key) {
                Some(current) if key == CLEANUP_POLICY_CONFIG => {
                    policy_set(current) != policy_set(desired)
                }
                Some(current) => current.trim() != desired,
                None => true,
            })
            .map(|(key, value)| AlterConfigOp::set(key, value))
            .collect();
        ops.sort_by(|a, b| a.key.cmp(&b.key));
        ops
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterOpType {
    Set,
    Delete,
}

/// Incremental change to one topic config key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterConfigOp {
    pub key: String,
    pub value: String,
    pub op: AlterOpType,
}

impl AlterConfigOp {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            op: AlterOpType::Set,
        }
    }
}

/// Live topic layout as reported by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub name: String,
    pub partitions: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TopicDescriptor {
        TopicDescriptor::new(
            "__BrokerMetrics",
            4,
            1,
            Duration::from_secs(24 * 3600),
            CleanupPolicy::Delete,
        )
        .unwrap()
    }

    #[test]
    fn test_descriptor_rejects_non_positive_values() {
        let retention = Duration::from_secs(60);
        assert!(TopicDescriptor::new("t", 0, 1, retention, CleanupPolicy::Delete).is_err());
        assert!(TopicDescriptor::new("t", 3, -1, retention, CleanupPolicy::Delete).is_err());
        assert!(TopicDescriptor::new("t", 3, 1, retention, CleanupPolicy::Delete).is_ok());
    }

    #[test]
    fn test_diff_is_empty_when_configs_match() {
        let live = HashMap::from([
            (RETENTION_MS_CONFIG.to_string(), "86400000".to_string()),
            (CLEANUP_POLICY_CONFIG.to_string(), "delete".to_string()),
            ("segment.bytes".to_string(), "1073741824".to_string()),
        ]);
        assert!(descriptor().config_diff(&live).is_empty());
    }

    #[test]
    fn test_diff_only_contains_drifted_keys() {
        let live = HashMap::from([
            (RETENTION_MS_CONFIG.to_string(), "3600000".to_string()),
            (CLEANUP_POLICY_CONFIG.to_string(), "delete".to_string()),
        ]);
        let ops = descriptor().config_diff(&live);
        assert_eq!(ops, vec![AlterConfigOp::set(RETENTION_MS_CONFIG, "86400000")]);
    }

    #[test]
    fn test_diff_treats_missing_keys_as_drift() {
        let ops = descriptor().config_diff(&HashMap::new());
        let keys: Vec<&str> = ops.iter().map(|op| op.key.as_str()).collect();
        assert_eq!(keys, vec![CLEANUP_POLICY_CONFIG, RETENTION_MS_CONFIG]);
    }

    #[test]
    fn test_cleanup_policy_compares_as_set() {
        let desired = TopicDescriptor::new(
            "t",
            1,
            1,
            Duration::from_millis(10),
            CleanupPolicy::CompactDelete,
        )
        .unwrap();
        let live = HashMap::from([
            (RETENTION_MS_CONFIG.to_string(), "10".to_string()),
            (CLEANUP_POLICY_CONFIG.to_string(), "delete, compact".to_string()),
        ]);
        assert!(desired.config_diff(&live).is_empty());
    }

    #[test]
    fn test_cleanup_policy_parsing() {
        assert_eq!("delete".parse::<CleanupPolicy>(), Ok(CleanupPolicy::Delete));
        assert_eq!(
            "Delete,Compact".parse::<CleanupPolicy>(),
            Ok(CleanupPolicy::CompactDelete)
        );
        assert!("forever".parse::<CleanupPolicy>().is_err());
    }
}
