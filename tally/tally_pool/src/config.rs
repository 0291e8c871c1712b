//! Harness configuration, loaded from TOML.

use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pool::DEFAULT_CAPACITY;

/// Settings for a harness run.
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```toml
/// workers = 4
/// iterations = 10
/// seed = 42
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Units in each pool
    pub capacity: usize,

    /// Concurrent worker tasks per blocking variant
    pub workers: usize,

    /// Acquire/release rounds per worker
    pub iterations: usize,

    /// Smallest request a worker draws
    pub min_request: usize,

    /// Largest request a worker draws
    pub max_request: usize,

    /// Shortest hold or pause, in microseconds
    pub min_delay_us: u64,

    /// Longest hold or pause, in microseconds
    pub max_delay_us: u64,

    /// Base seed for reproducible load; worker `i` uses `seed + i`
    pub seed: Option<u64>,

    /// How long to wait for all workers before cancelling them
    pub completion_timeout_ms: u64,

    /// How long cancelled workers and pool threads get to wind down
    pub shutdown_timeout_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            workers: 8,
            iterations: 20,
            min_request: 1,
            max_request: 3,
            min_delay_us: 1000,
            max_delay_us: 8000,
            seed: None,
            completion_timeout_ms: 60_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl HarnessConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check that the values describe a run that can finish
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.min_request == 0 {
            return Err(ConfigError::Invalid("min_request must be at least 1".into()));
        }
        if self.min_request > self.max_request {
            return Err(ConfigError::Invalid(format!(
                "min_request {} is greater than max_request {}",
                self.min_request, self.max_request
            )));
        }
        if self.max_request > self.capacity {
            return Err(ConfigError::Invalid(format!(
                "max_request {} exceeds capacity {}",
                self.max_request, self.capacity
            )));
        }
        if self.min_delay_us > self.max_delay_us {
            return Err(ConfigError::Invalid(format!(
                "min_delay_us {} is greater than max_delay_us {}",
                self.min_delay_us, self.max_delay_us
            )));
        }
        Ok(())
    }

    /// Inclusive range of request sizes
    pub fn request_range(&self) -> RangeInclusive<usize> {
        self.min_request..=self.max_request
    }

    /// Inclusive range of delays in microseconds
    pub fn delay_range_us(&self) -> RangeInclusive<u64> {
        self.min_delay_us..=self.max_delay_us
    }

    /// Seed for worker `id`, if seeding is enabled
    pub fn worker_seed(&self, id: usize) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(id as u64))
    }

    /// Bound on waiting for workers to finish
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    /// Bound on the wind-down after completion or cancellation
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
