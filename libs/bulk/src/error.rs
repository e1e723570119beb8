//! Error taxonomy for the bulk engine.
//!
//! | Error | Raised? | Meaning |
//! |-------|---------|---------|
//! | [`ConfigError`] | yes, at startup | invalid concurrency bounds or budget |
//! | [`WriteError::RateLimited`] | no, recorded | store throughput exceeded, retried at lower concurrency |
//! | other [`WriteError`]s | no, recorded | element write failure, never retried by the engine |
//! | [`FatalBatchError`] | no, reported | a batch ended without every element written |
//! | [`LoadError`] | yes | run-level failure that stops the load |
//!
//! Per-operation failures are values carried in reports. Only configuration,
//! connection and run-level failures unwind.

use std::time::Duration;

use thiserror::Error;

use crate::loader::LoadReport;

/// HTTP-style status code the store uses to signal throttling.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Invalid engine or loader configuration. Detected before any write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_concurrency_level must be >= 1, got {0}")]
    InvalidCeiling(usize),

    #[error("initial_concurrency_level must be in [1, {ceiling}], got {level}")]
    InvalidInitialLevel { level: usize, ceiling: usize },

    #[error("capacity_budget_per_batch must be > 0, got {0}")]
    InvalidBudget(f64),

    #[error("rate_limit_backoff_factor must be in (0, 1), got {0}")]
    InvalidBackoffFactor(f64),

    #[error("growth_step must be >= 1, got {0}")]
    InvalidGrowthStep(usize),

    #[error("growth_threshold must be in (0, 1], got {0}")]
    InvalidGrowthThreshold(f64),

    #[error("batch_size must be >= 1, got {0}")]
    InvalidBatchSize(usize),

    #[error("operation_timeout must be non-zero")]
    ZeroOperationTimeout,
}

/// Failure of a single element write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    /// The store rejected the request because the throughput budget is spent.
    #[error("request rate is large (429), retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// An element with the same id already exists and the mode was insert.
    #[error("conflict: element {id} already exists")]
    Conflict { id: String },

    /// The store refused the element as malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The call did not resolve within the operation timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Transport or availability failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Unexpected failure, including a panicked write task.
    #[error("internal error: {0}")]
    Internal(String),

    /// The operation was never started because the batch was cancelled.
    #[error("cancelled before the operation started")]
    Cancelled,
}

impl WriteError {
    /// HTTP-style status code for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            WriteError::RateLimited { .. } => STATUS_TOO_MANY_REQUESTS,
            WriteError::Conflict { .. } => 409,
            WriteError::Validation(_) => 400,
            WriteError::Timeout(_) => 408,
            WriteError::Unavailable(_) => 503,
            WriteError::Internal(_) => 500,
            WriteError::Cancelled => 499,
        }
    }

    /// Whether the store signalled throttling. Only these failures are retried.
    pub fn is_rate_limit(&self) -> bool {
        self.status_code() == STATUS_TOO_MANY_REQUESTS
    }
}

/// Why a batch terminated in the Fatal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalBatchError {
    #[error("rate limiting persisted after {retries} retries, {remaining} elements unwritten")]
    RetriesExhausted { retries: u32, remaining: usize },

    #[error("{failed} elements failed with non-retryable errors")]
    ElementWrite { failed: usize },

    #[error("batch cancelled, {remaining} elements unwritten")]
    Cancelled { remaining: usize },
}

/// Hard failures that stop a run.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to connect to graph store: {0}")]
    Connection(String),

    #[error("failed to read elements: {0}")]
    Source(#[source] anyhow::Error),

    #[error("failed to write marker: {0}")]
    Marker(#[source] anyhow::Error),

    /// The run stopped early; `report` holds everything written up to that point.
    #[error("accumulated failures {failures} exceed tolerance {tolerance}")]
    FailureToleranceExceeded {
        failures: usize,
        tolerance: usize,
        report: Box<LoadReport>,
    },

    #[error("load cancelled after {} batches", .report.summary.batches)]
    Cancelled { report: Box<LoadReport> },
}

impl LoadError {
    /// Aggregate of a run that halted after writing, if this error carries one.
    pub fn report(&self) -> Option<&LoadReport> {
        match self {
            LoadError::FailureToleranceExceeded { report, .. } | LoadError::Cancelled { report } => {
                Some(report.as_ref())
            }
            _ => None,
        }
    }
}
