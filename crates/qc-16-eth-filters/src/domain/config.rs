//! Filter subsystem configuration with validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default filter time-to-live (5 minutes).
pub const DEFAULT_FILTER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Main filter subsystem configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Time a filter survives without being polled
    #[serde(with = "humantime_serde")]
    pub filter_timeout: Duration,
    /// Period of the eviction sweep (defaults to `filter_timeout`)
    #[serde(with = "humantime_serde::option")]
    pub sweep_interval: Option<Duration>,
    /// Threads used to fan finalized blocks out to filters
    pub broadcast_workers: usize,
    /// Threads used to stamp receipt metadata
    pub finalize_workers: usize,
    /// Max events the aggregator holds back for a later state
    pub max_deferred_events: usize,
    /// Heights the filter manager keeps open behind the newest one
    pub max_pending_heights: u64,
    /// Event bus channel capacity
    pub bus_capacity: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_timeout: DEFAULT_FILTER_TIMEOUT,
            sweep_interval: None,
            broadcast_workers: 4,
            finalize_workers: 4,
            max_deferred_events: 1024,
            max_pending_heights: 64,
            bus_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl FilterConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "filter_timeout cannot be 0".into(),
            ));
        }

        if self.sweep_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval cannot be 0".into(),
            ));
        }

        if self.broadcast_workers == 0 || self.finalize_workers == 0 {
            return Err(ConfigError::InvalidWorkers(
                "worker pools need at least one thread".into(),
            ));
        }

        if self.max_deferred_events == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_deferred_events cannot be 0".into(),
            ));
        }

        if self.max_pending_heights == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_pending_heights cannot be 0".into(),
            ));
        }

        if self.bus_capacity == 0 {
            return Err(ConfigError::InvalidLimit("bus_capacity cannot be 0".into()));
        }

        Ok(())
    }

    /// Effective eviction sweep period.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval.unwrap_or(self.filter_timeout)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid worker pool size
    #[error("invalid worker count: {0}")]
    InvalidWorkers(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn format_duration(duration: Duration) -> String {
        if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be tried before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
