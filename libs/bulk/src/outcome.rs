//! Write operations, their outcomes, and batch-level aggregation.

use std::sync::Arc;
use std::time::Duration;

use crate::element::GraphElement;
use crate::error::{FatalBatchError, WriteError};

// ============================================================================
// WriteOperation
// ============================================================================

/// How the store should treat an element whose id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with a conflict if the id exists.
    Insert,
    /// Replace the existing element.
    Upsert,
}

impl WriteMode {
    pub fn from_upsert(upsert: bool) -> Self {
        if upsert {
            WriteMode::Upsert
        } else {
            WriteMode::Insert
        }
    }
}

/// A pending write of one element.
#[derive(Debug, Clone)]
pub struct WriteOperation {
    pub element: Arc<GraphElement>,
    pub mode: WriteMode,
}

impl WriteOperation {
    pub fn new(element: Arc<GraphElement>, mode: WriteMode) -> Self {
        Self { element, mode }
    }

    pub fn partition_key(&self) -> &str {
        self.element.partition_key()
    }
}

// ============================================================================
// OperationOutcome
// ============================================================================

/// Result of attempting one write. Produced exactly once per operation.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub element: Arc<GraphElement>,
    pub capacity_consumed: f64,
    pub error: Option<WriteError>,
}

impl OperationOutcome {
    pub fn success(element: Arc<GraphElement>, capacity_consumed: f64) -> Self {
        Self {
            element,
            capacity_consumed,
            error: None,
        }
    }

    pub fn failure(element: Arc<GraphElement>, capacity_consumed: f64, error: WriteError) -> Self {
        Self {
            element,
            capacity_consumed,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// BatchReport
// ============================================================================

/// An element that was not written, with the last error observed for it.
#[derive(Debug, Clone)]
pub struct ElementFailure {
    pub element: Arc<GraphElement>,
    pub error: WriteError,
}

/// Aggregate over one batch.
///
/// Invariant: `success_count + failures.len()` equals the number of elements
/// the report covers. A report straight from the executor covers one round;
/// the orchestrator folds rounds into a cumulative report and fills in
/// `retries` and `fatal`.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub elapsed: Duration,
    pub total_capacity_consumed: f64,
    pub success_count: usize,
    pub failures: Vec<ElementFailure>,
    /// Retry rounds performed after the first attempt.
    pub retries: u32,
    /// Set when the batch terminated in the Fatal state.
    pub fatal: Option<FatalBatchError>,
}

impl BatchReport {
    /// Aggregate outcomes in resolution order.
    pub fn from_outcomes(outcomes: Vec<OperationOutcome>, elapsed: Duration) -> Self {
        let mut report = BatchReport {
            elapsed,
            ..Default::default()
        };
        for outcome in outcomes {
            report.total_capacity_consumed += outcome.capacity_consumed;
            match outcome.error {
                None => report.success_count += 1,
                Some(error) => report.failures.push(ElementFailure {
                    element: outcome.element,
                    error,
                }),
            }
        }
        report
    }

    /// Number of elements the report accounts for.
    pub fn element_count(&self) -> usize {
        self.success_count + self.failures.len()
    }

    pub fn rate_limit_failures(&self) -> usize {
        self.failures.iter().filter(|f| f.error.is_rate_limit()).count()
    }

    pub fn has_rate_limit_failures(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_rate_limit())
    }

    /// True when there are failures and every one of them is a rate-limit rejection.
    pub fn only_rate_limit_failures(&self) -> bool {
        !self.failures.is_empty() && self.failures.iter().all(|f| f.error.is_rate_limit())
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }
}

// ============================================================================
// RunTotals
// ============================================================================

/// Process-wide accumulation of batch reports for final reporting.
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    pub batches: usize,
    pub fatal_batches: usize,
    pub elapsed: Duration,
    pub total_capacity_consumed: f64,
    pub success_count: usize,
    pub retries: u64,
    pub failures: Vec<ElementFailure>,
}

impl RunTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, report: BatchReport) {
        self.batches += 1;
        if report.is_fatal() {
            self.fatal_batches += 1;
        }
        self.elapsed += report.elapsed;
        self.total_capacity_consumed += report.total_capacity_consumed;
        self.success_count += report.success_count;
        self.retries += u64::from(report.retries);
        self.failures.extend(report.failures);
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn element_count(&self) -> usize {
        self.success_count + self.failures.len()
    }
}
