// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching policy for the telemetry channel.
//!
//! The policy can be built in code, deserialized from a host configuration
//! file (`max_batch_size`, `batch_interval_secs`, `max_in_flight_flushes`) or
//! read from the environment:
//!
//! - `TELEMETRY_MAX_BATCH_SIZE`
//! - `TELEMETRY_BATCH_INTERVAL_SECS`
//! - `TELEMETRY_MAX_IN_FLIGHT_FLUSHES`

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::errors::ConfigError;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_IN_FLIGHT_FLUSHES: usize = 1;

// Smaller batches are accepted but produce a file per handful of records.
const RECOMMENDED_MIN_BATCH_SIZE: usize = 5;

const MAX_BATCH_SIZE_ENV: &str = "TELEMETRY_MAX_BATCH_SIZE";
const BATCH_INTERVAL_ENV: &str = "TELEMETRY_BATCH_INTERVAL_SECS";
const MAX_IN_FLIGHT_FLUSHES_ENV: &str = "TELEMETRY_MAX_IN_FLIGHT_FLUSHES";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of queued records that triggers a flush.
    pub max_batch_size: usize,
    /// Period of the flush timer.
    #[serde(rename = "batch_interval_secs", deserialize_with = "deserialize_secs")]
    pub batch_interval: Duration,
    /// Automatic flushes allowed to be in the sink at once before the
    /// channel reports busy.
    pub max_in_flight_flushes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            max_in_flight_flushes: DEFAULT_MAX_IN_FLIGHT_FLUSHES,
        }
    }
}

impl BatchConfig {
    /// Defaults overridden by any `TELEMETRY_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(size) = parse_env::<usize>(MAX_BATCH_SIZE_ENV)? {
            config.max_batch_size = size;
        }
        if let Some(secs) = parse_env::<u64>(BATCH_INTERVAL_ENV)? {
            config.batch_interval = Duration::from_secs(secs);
        }
        if let Some(in_flight) = parse_env::<usize>(MAX_IN_FLIGHT_FLUSHES_ENV)? {
            config.max_in_flight_flushes = in_flight;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_max_batch_size(self.max_batch_size)?;
        validate_batch_interval(self.batch_interval)?;
        if self.max_in_flight_flushes == 0 {
            return Err(ConfigError::InvalidInFlight);
        }
        Ok(())
    }
}

pub(crate) fn validate_max_batch_size(size: usize) -> Result<(), ConfigError> {
    if size == 0 {
        return Err(ConfigError::InvalidBatchSize);
    }
    if size < RECOMMENDED_MIN_BATCH_SIZE {
        warn!(
            "Max batch size {size} is below the recommended minimum of {RECOMMENDED_MIN_BATCH_SIZE}"
        );
    }
    Ok(())
}

pub(crate) fn validate_batch_interval(interval: Duration) -> Result<(), ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::InvalidInterval);
    }
    Ok(())
}

fn parse_env<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(None),
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var(MAX_BATCH_SIZE_ENV);
        env::remove_var(BATCH_INTERVAL_ENV);
        env::remove_var(MAX_IN_FLIGHT_FLUSHES_ENV);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = BatchConfig::default();
        assert_eq!(config.max_batch_size, 50);
        assert_eq!(config.batch_interval, Duration::from_secs(15));
        assert_eq!(config.max_in_flight_flushes, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = BatchConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidBatchSize));

        let config = BatchConfig {
            batch_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidInterval));

        let config = BatchConfig {
            max_in_flight_flushes: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidInFlight));
    }

    #[test]
    fn test_small_batch_size_is_accepted() {
        let config = BatchConfig {
            max_batch_size: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: BatchConfig =
            serde_json::from_str(r#"{"max_batch_size": 10, "batch_interval_secs": 3}"#).unwrap();
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.batch_interval, Duration::from_secs(3));
        assert_eq!(config.max_in_flight_flushes, DEFAULT_MAX_IN_FLIGHT_FLUSHES);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = BatchConfig::from_env().unwrap();
        assert_eq!(config, BatchConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var(MAX_BATCH_SIZE_ENV, "150");
        env::set_var(BATCH_INTERVAL_ENV, " 30 ");
        env::set_var(MAX_IN_FLIGHT_FLUSHES_ENV, "2");

        let config = BatchConfig::from_env().unwrap();
        assert_eq!(config.max_batch_size, 150);
        assert_eq!(config.batch_interval, Duration::from_secs(30));
        assert_eq!(config.max_in_flight_flushes, 2);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_number() {
        clear_env();
        env::set_var(MAX_BATCH_SIZE_ENV, "fifty");

        let config = BatchConfig::from_env();
        assert_eq!(
            config.unwrap_err(),
            ConfigError::InvalidValue {
                key: MAX_BATCH_SIZE_ENV,
                value: "fifty".to_string()
            }
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_zero_batch_size_fails_validation() {
        clear_env();
        env::set_var(MAX_BATCH_SIZE_ENV, "0");

        assert_eq!(
            BatchConfig::from_env().unwrap_err(),
            ConfigError::InvalidBatchSize
        );
        clear_env();
    }
}
