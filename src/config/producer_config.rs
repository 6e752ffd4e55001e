//! Producer client settings.
//!
//! Settings are kept as an ordered property map. Values supplied by the host always win;
//! defaults are only filled in where a key is absent.

use super::{Lookup, parse_or};
use crate::domain::errors::ConfigError;
use std::collections::BTreeMap;
use tracing::info;

pub const BOOTSTRAP_SERVERS: &str = "bootstrap.servers";
pub const SECURITY_PROTOCOL: &str = "security.protocol";
pub const CLIENT_ID: &str = "client.id";
pub const LINGER_MS: &str = "linger.ms";
pub const BATCH_SIZE: &str = "batch.size";
pub const RETRIES: &str = "retries";
pub const COMPRESSION_TYPE: &str = "compression.type";
pub const KEY_SERIALIZER: &str = "key.serializer";
pub const VALUE_SERIALIZER: &str = "value.serializer";
pub const ACKS: &str = "acks";

/// Prefix under which producer settings are read from the host configuration
pub const PRODUCER_PREFIX: &str = "metrics.reporter.";

const PASSTHROUGH_KEYS: [&str; 10] = [
    BOOTSTRAP_SERVERS,
    SECURITY_PROTOCOL,
    CLIENT_ID,
    LINGER_MS,
    BATCH_SIZE,
    RETRIES,
    COMPRESSION_TYPE,
    KEY_SERIALIZER,
    VALUE_SERIALIZER,
    ACKS,
];

pub const DEFAULT_CLIENT_ID: &str = "metrics-reporter";
pub const DEFAULT_LINGER_MS: u64 = 500;
pub const DEFAULT_BATCH_SIZE: u32 = 800 * 1000;
pub const DEFAULT_RETRIES: u32 = 5;
pub const DEFAULT_PORT: u16 = 9092;

/// Producer configuration environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProducerEnvConfig {
    properties: BTreeMap<String, String>,
}

impl ProducerEnvConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in PASSTHROUGH_KEYS {
            if let Some(value) = lookup(&format!("{PRODUCER_PREFIX}{key}")) {
                config.properties.insert(key.to_string(), value);
            }
        }

        if !config.contains(BOOTSTRAP_SERVERS) {
            let port: u16 = parse_or(lookup, "port", DEFAULT_PORT)?;
            let bootstrap = format!("localhost:{port}");
            info!("Using default value of {} for {}", bootstrap, BOOTSTRAP_SERVERS);
            config.set_if_absent(BOOTSTRAP_SERVERS, bootstrap);
        }
        if !config.contains(SECURITY_PROTOCOL) {
            info!("Using default value of PLAINTEXT for {}", SECURITY_PROTOCOL);
            config.set_if_absent(SECURITY_PROTOCOL, "PLAINTEXT");
        }
        config.set_if_absent(CLIENT_ID, DEFAULT_CLIENT_ID);
        config.set_if_absent(LINGER_MS, DEFAULT_LINGER_MS.to_string());
        config.set_if_absent(BATCH_SIZE, DEFAULT_BATCH_SIZE.to_string());
        config.set_if_absent(RETRIES, DEFAULT_RETRIES.to_string());
        config.set_if_absent(COMPRESSION_TYPE, "gzip");
        config.set_if_absent(KEY_SERIALIZER, "string");
        config.set_if_absent(VALUE_SERIALIZER, "json");
        config.set_if_absent(ACKS, "all");

        config.validate()?;
        Ok(config)
    }

    pub fn set_if_absent(&mut self, key: &str, value: impl Into<String>) {
        self.properties
            .entry(key.to_string())
            .or_insert_with(|| value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn linger_ms(&self) -> u64 {
        self.numeric(LINGER_MS).unwrap_or(DEFAULT_LINGER_MS)
    }

    pub fn batch_size(&self) -> u32 {
        self.numeric(BATCH_SIZE).unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn retries(&self) -> u32 {
        self.numeric(RETRIES).unwrap_or(DEFAULT_RETRIES)
    }

    fn numeric<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_numeric::<u64>(self, LINGER_MS)?;
        check_numeric::<u32>(self, BATCH_SIZE)?;
        check_numeric::<u32>(self, RETRIES)?;
        if let Some(acks) = self.get(ACKS) {
            if !matches!(acks, "all" | "-1" | "0" | "1") {
                return Err(ConfigError::InvalidValue {
                    key: ACKS.to_string(),
                    value: acks.to_string(),
                    reason: "must be one of all, -1, 0, 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn check_numeric<T: std::str::FromStr>(
    config: &ProducerEnvConfig,
    key: &str,
) -> Result<(), ConfigError> {
    match config.get(key) {
        Some(value) if value.trim().parse::<T>().is_err() => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "not a valid non-negative integer".to_string(),
        }),
        _ => Ok(()),
    }
}
