//! Batch executor: fan out a plan's groups, join each, aggregate outcomes.
//!
//! Each operation in a group runs as its own tokio task against the shared
//! store handle. The executor awaits every task of a group before spawning
//! the next group, so at most one group's worth of writes is in flight.
//!
//! Failures are values. A failed or panicked write becomes a failed
//! [`OperationOutcome`]; siblings and later groups still run. Retry policy
//! lives in the orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::element::GraphElement;
use crate::error::WriteError;
use crate::outcome::{BatchReport, OperationOutcome, WriteMode};
use crate::store::{GraphStore, WriteResponse};
use crate::throttle::Plan;

// ============================================================================
// CancelSignal
// ============================================================================

/// Cooperative cancellation, honored between groups.
///
/// In-flight writes of the current group always drain; operations of groups
/// not yet started are recorded as [`WriteError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// BatchExecutor
// ============================================================================

/// Fan-out/join primitive over a [`GraphStore`].
pub struct BatchExecutor<S: GraphStore + ?Sized> {
    store: Arc<S>,
    operation_timeout: Option<Duration>,
    cancel: Option<CancelSignal>,
}

impl<S: GraphStore + ?Sized + 'static> BatchExecutor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            operation_timeout: None,
            cancel: None,
        }
    }

    /// Bound every write by `timeout`. An elapsed timeout is a
    /// [`WriteError::Timeout`] failure.
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled)
    }

    /// Run every group of `plan` in order and report on all of its operations.
    #[tracing::instrument(skip(self, plan), fields(store = self.store.name(), groups = plan.len()))]
    pub async fn execute(&self, plan: Plan) -> BatchReport {
        let start = Instant::now();
        let total: usize = plan.iter().map(Vec::len).sum();
        let mut outcomes = Vec::with_capacity(total);

        let mut groups = plan.into_iter();
        while let Some(group) = groups.next() {
            if self.is_cancelled() {
                let skipped = group.into_iter().chain(groups.by_ref().flatten());
                let before = outcomes.len();
                outcomes.extend(skipped.map(|op| {
                    OperationOutcome::failure(op.element, 0.0, WriteError::Cancelled)
                }));
                tracing::warn!(
                    skipped = outcomes.len() - before,
                    "Batch cancelled between groups"
                );
                break;
            }

            let handles: Vec<(Arc<GraphElement>, JoinHandle<WriteResponse>)> = group
                .into_iter()
                .map(|op| {
                    let store = Arc::clone(&self.store);
                    let element = Arc::clone(&op.element);
                    let mode = op.mode;
                    let timeout = self.operation_timeout;
                    let handle = tokio::spawn(async move {
                        write_one(store.as_ref(), &element, mode, timeout).await
                    });
                    (op.element, handle)
                })
                .collect();

            // Group barrier
            for (element, handle) in handles {
                let outcome = match handle.await {
                    Ok(response) => match response.result {
                        Ok(()) => OperationOutcome::success(element, response.request_charge),
                        Err(error) => {
                            OperationOutcome::failure(element, response.request_charge, error)
                        }
                    },
                    Err(join_error) => {
                        tracing::error!(id = %element.id(), error = %join_error, "Write task failed");
                        OperationOutcome::failure(
                            element,
                            0.0,
                            WriteError::Internal(format!("write task failed: {}", join_error)),
                        )
                    }
                };
                outcomes.push(outcome);
            }
        }

        let report = BatchReport::from_outcomes(outcomes, start.elapsed());
        tracing::debug!(
            operations = total,
            succeeded = report.success_count,
            failed = report.failures.len(),
            rate_limited = report.rate_limit_failures(),
            capacity = report.total_capacity_consumed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Executed plan"
        );
        report
    }
}

async fn write_one<S: GraphStore + ?Sized>(
    store: &S,
    element: &GraphElement,
    mode: WriteMode,
    timeout: Option<Duration>,
) -> WriteResponse {
    match timeout {
        None => store.write_element(element, mode).await,
        Some(limit) => match tokio::time::timeout(limit, store.write_element(element, mode)).await {
            Ok(response) => response,
            Err(_) => WriteResponse::err(0.0, WriteError::Timeout(limit)),
        },
    }
}
