//! Configuration for the bulk engine and the run driver.
//!
//! Both structs deserialize from JSON with every field optional; missing
//! fields take their `Default` values. Validation is separate from parsing so
//! that CLI overrides can be applied before the configuration is checked.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// ThrottleConfig
// ============================================================================

/// Options consumed by the concurrency controller and the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Concurrency level used for the first batch.
    /// Default: 4
    pub initial_concurrency_level: usize,

    /// Ceiling the level never exceeds.
    /// Default: 64
    pub max_concurrency_level: usize,

    /// Capacity units a batch round may consume before growth stops.
    /// Default: 10000
    pub capacity_budget_per_batch: f64,

    /// Retry rounds allowed per batch while rate limiting persists.
    /// Default: 3
    pub max_retries_per_batch: u32,

    /// Multiplier applied to the level after a rate-limited round.
    /// Default: 0.5
    pub rate_limit_backoff_factor: f64,

    /// Level increment after a clean round under budget.
    /// Default: 1
    pub growth_step: usize,

    /// Fraction of the budget below which a clean round grows the level.
    /// Default: 0.8
    pub growth_threshold: f64,

    /// Fixed shuffle seed. `None` seeds from OS entropy.
    /// Default: None
    pub shuffle_seed: Option<u64>,

    /// Per-operation call timeout in milliseconds. `None` relies on the store client.
    /// Default: None
    pub operation_timeout_ms: Option<u64>,

    /// Upper bound on the pause before a retry round, in milliseconds. The
    /// pause is the largest retry-after hint among the rate-limited writes.
    /// Zero retries immediately.
    /// Default: 5000
    pub max_retry_wait_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            initial_concurrency_level: 4,
            max_concurrency_level: 64,
            capacity_budget_per_batch: 10_000.0,
            max_retries_per_batch: 3,
            rate_limit_backoff_factor: 0.5,
            growth_step: 1,
            growth_threshold: 0.8,
            shuffle_seed: None,
            operation_timeout_ms: None,
            max_retry_wait_ms: 5_000,
        }
    }
}

impl ThrottleConfig {
    pub fn with_initial_level(mut self, level: usize) -> Self {
        self.initial_concurrency_level = level;
        self
    }

    pub fn with_max_level(mut self, level: usize) -> Self {
        self.max_concurrency_level = level;
        self
    }

    pub fn with_capacity_budget(mut self, budget: f64) -> Self {
        self.capacity_budget_per_batch = budget;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries_per_batch = retries;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.rate_limit_backoff_factor = factor;
        self
    }

    pub fn with_growth_step(mut self, step: usize) -> Self {
        self.growth_step = step;
        self
    }

    pub fn with_growth_threshold(mut self, threshold: f64) -> Self {
        self.growth_threshold = threshold;
        self
    }

    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_max_retry_wait(mut self, wait: Duration) -> Self {
        self.max_retry_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn max_retry_wait(&self) -> Duration {
        Duration::from_millis(self.max_retry_wait_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    /// Check bounds and factors. Called once at orchestrator construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency_level < 1 {
            return Err(ConfigError::InvalidCeiling(self.max_concurrency_level));
        }
        if self.initial_concurrency_level < 1
            || self.initial_concurrency_level > self.max_concurrency_level
        {
            return Err(ConfigError::InvalidInitialLevel {
                level: self.initial_concurrency_level,
                ceiling: self.max_concurrency_level,
            });
        }
        // NaN fails every comparison, so test for the valid range and negate
        if !(self.capacity_budget_per_batch > 0.0) || !self.capacity_budget_per_batch.is_finite() {
            return Err(ConfigError::InvalidBudget(self.capacity_budget_per_batch));
        }
        if !(self.rate_limit_backoff_factor > 0.0 && self.rate_limit_backoff_factor < 1.0) {
            return Err(ConfigError::InvalidBackoffFactor(self.rate_limit_backoff_factor));
        }
        if self.growth_step < 1 {
            return Err(ConfigError::InvalidGrowthStep(self.growth_step));
        }
        if !(self.growth_threshold > 0.0 && self.growth_threshold <= 1.0) {
            return Err(ConfigError::InvalidGrowthThreshold(self.growth_threshold));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroOperationTimeout);
        }
        Ok(())
    }
}

// ============================================================================
// LoaderConfig
// ============================================================================

/// Options for a whole load run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Elements handed to the orchestrator per batch.
    /// Default: 10000
    pub batch_size: usize,

    /// Upsert (true) or insert (false) elements.
    /// Default: true
    pub upsert: bool,

    /// Write to the store. When false, elements are parsed and counted only.
    /// Default: true
    pub load: bool,

    /// Accumulated element failures tolerated before the run halts.
    /// Default: 0
    pub failure_tolerance: usize,

    /// Marker file written with the summary when the run completes.
    pub done_marker: Option<PathBuf>,

    /// Marker file written with the error when the run fails.
    pub error_marker: Option<PathBuf>,

    /// Log every parsed element instead of only the first few.
    /// Default: false
    pub verbose: bool,

    pub throttle: ThrottleConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            upsert: true,
            load: true,
            failure_tolerance: 0,
            done_marker: None,
            error_marker: None,
            verbose: false,
            throttle: ThrottleConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Load from a JSON file. Fields absent from the file keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn with_failure_tolerance(mut self, tolerance: usize) -> Self {
        self.failure_tolerance = tolerance;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size < 1 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        self.throttle.validate()
    }
}
