//! Bulk orchestrator: one call per caller batch, adaptive retry inside.
//!
//! # State machine
//!
//! ```text
//!            ┌──────────┐
//!   batch ──►│ Planning │ build operations, plan at current level
//!            └────┬─────┘
//!                 ▼
//!            ┌───────────┐   all succeeded            ┌──────┐
//!         ┌─►│ Executing │───────────────────────────►│ Done │
//!         │  └────┬──────┘                            └──────┘
//!         │       │ only 429s and retries < max
//!         │       ▼
//!         │  ┌──────────┐
//!         └──│ Retrying │ level lowered, failed elements re-planned
//!            └──────────┘
//!                 any other failure, or 429s at retries == max ──► Fatal
//! ```
//!
//! The concurrency state survives across batches; a level learned on one
//! batch is the starting level of the next. Partial failure is never an
//! `Err`: it comes back as a report with `failures` populated and `fatal`
//! set. Only configuration and connection problems, detected in
//! [`BulkOrchestrator::connect`] before any write, are errors.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ThrottleConfig;
use crate::element::GraphElement;
use crate::error::{FatalBatchError, LoadError, WriteError};
use crate::executor::{BatchExecutor, CancelSignal};
use crate::outcome::{BatchReport, WriteMode, WriteOperation};
use crate::store::GraphStore;
use crate::throttle::{ConcurrencyController, ConcurrencyState};

/// Phase of a batch inside [`BulkOrchestrator::submit_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Planning,
    Executing,
    Retrying,
    Done,
    Fatal,
}

/// Drives batches of elements into a [`GraphStore`] under adaptive concurrency.
pub struct BulkOrchestrator<S: GraphStore + ?Sized> {
    store: Arc<S>,
    controller: ConcurrencyController,
    executor: BatchExecutor<S>,
    state: ConcurrencyState,
    cancel: CancelSignal,
    max_retries: u32,
    max_retry_wait: Duration,
    batches: u64,
    phase: BatchState,
}

impl<S: GraphStore + ?Sized + 'static> BulkOrchestrator<S> {
    /// Validate `config` and check that the store answers.
    ///
    /// # Errors
    ///
    /// - [`LoadError::Config`] when the throttle configuration is invalid
    /// - [`LoadError::Connection`] when the store does not answer the ping
    pub async fn connect(store: Arc<S>, config: ThrottleConfig) -> Result<Self, LoadError> {
        let controller = ConcurrencyController::new(config)?;

        store
            .ping()
            .await
            .map_err(|e| LoadError::Connection(format!("{}: {}", store.name(), e)))?;

        let cancel = CancelSignal::new();
        let config = controller.config();
        let executor = BatchExecutor::new(Arc::clone(&store))
            .with_operation_timeout(config.operation_timeout())
            .with_cancel_signal(cancel.clone());
        let max_retries = config.max_retries_per_batch;
        let max_retry_wait = config.max_retry_wait();
        let state = controller.initial_state();

        tracing::info!(
            store = store.name(),
            level = state.level,
            ceiling = controller.ceiling(),
            budget = state.capacity_budget,
            max_retries,
            "Connected bulk orchestrator"
        );

        Ok(Self {
            store,
            controller,
            executor,
            state,
            cancel,
            max_retries,
            max_retry_wait,
            batches: 0,
            phase: BatchState::Done,
        })
    }

    /// Current concurrency level.
    pub fn level(&self) -> usize {
        self.state.level
    }

    pub fn concurrency_state(&self) -> ConcurrencyState {
        self.state
    }

    /// Phase the most recent batch is in; `Done` or `Fatal` between calls.
    pub fn batch_state(&self) -> BatchState {
        self.phase
    }

    fn enter(&mut self, phase: BatchState) {
        tracing::trace!(from = ?self.phase, to = ?phase, "Batch state transition");
        self.phase = phase;
    }

    /// Handle that cancels the running batch at its next group boundary.
    /// Once raised, every later batch is cancelled too.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Use `cancel` instead of the orchestrator's own signal.
    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.executor = self.executor.with_cancel_signal(cancel.clone());
        self.cancel = cancel;
        self
    }

    /// Write one batch, retrying rate-limited elements at lower concurrency.
    ///
    /// The returned report is cumulative over every round of the batch:
    /// capacity and elapsed time summed, successes counted once per element,
    /// and `failures` holding each element that never succeeded with the last
    /// error seen for it.
    #[tracing::instrument(skip(self, elements), fields(batch = self.batches + 1, elements = elements.len()))]
    pub async fn submit_batch(
        &mut self,
        elements: Vec<Arc<GraphElement>>,
        upsert: bool,
    ) -> BatchReport {
        self.batches += 1;
        let mode = WriteMode::from_upsert(upsert);
        let mut cumulative = BatchReport::default();
        if elements.is_empty() {
            self.enter(BatchState::Done);
            return cumulative;
        }

        let mut pending = elements;
        let mut retries: u32 = 0;

        loop {
            self.enter(BatchState::Planning);
            let operations: Vec<WriteOperation> = pending
                .iter()
                .map(|element| WriteOperation::new(Arc::clone(element), mode))
                .collect();
            let plan = self.controller.build_plan(operations, self.state.level);
            tracing::debug!(
                level = self.state.level,
                operations = pending.len(),
                groups = plan.len(),
                retry = retries,
                "Executing plan"
            );
            self.enter(BatchState::Executing);

            let round = self.executor.execute(plan).await;
            cumulative.elapsed += round.elapsed;
            cumulative.total_capacity_consumed += round.total_capacity_consumed;
            cumulative.success_count += round.success_count;

            if round.failures.is_empty() {
                // A batch that needed retries saw rate limiting, so it does not grow the level
                if retries == 0 {
                    self.state = self.controller.adjust_level(self.state, &round);
                }
                self.enter(BatchState::Done);
                cumulative.retries = retries;
                tracing::debug!(retries, level = self.state.level, "Batch complete");
                return cumulative;
            }

            if round.has_rate_limit_failures() {
                self.state = self.controller.adjust_level(self.state, &round);
            }

            if round.only_rate_limit_failures() && retries < self.max_retries {
                retries += 1;
                self.enter(BatchState::Retrying);
                let wait = self.retry_wait(&round);
                tracing::info!(
                    retry = retries,
                    rate_limited = round.failures.len(),
                    level = self.state.level,
                    wait_ms = wait.as_millis() as u64,
                    "Retrying rate-limited elements"
                );
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                pending = round.failures.into_iter().map(|f| f.element).collect();
                continue;
            }

            let fatal = classify_fatal(&round, retries);
            self.enter(BatchState::Fatal);
            tracing::warn!(
                retries,
                failed = round.failures.len(),
                error = %fatal,
                "Batch terminated"
            );
            cumulative.failures = round.failures;
            cumulative.retries = retries;
            cumulative.fatal = Some(fatal);
            return cumulative;
        }
    }

    /// Largest retry-after hint among the rate-limited writes, capped.
    fn retry_wait(&self, round: &BatchReport) -> Duration {
        round
            .failures
            .iter()
            .filter_map(|f| match f.error {
                WriteError::RateLimited { retry_after } => retry_after,
                _ => None,
            })
            .max()
            .unwrap_or(Duration::ZERO)
            .min(self.max_retry_wait)
    }

    /// Release the store connection.
    pub async fn shutdown(self) {
        tracing::info!(
            store = self.store.name(),
            batches = self.batches,
            level = self.state.level,
            "Shutting down bulk orchestrator"
        );
        self.store.close().await;
    }
}

fn classify_fatal(round: &BatchReport, retries: u32) -> FatalBatchError {
    let remaining = round.failures.len();
    if round
        .failures
        .iter()
        .any(|f| matches!(f.error, WriteError::Cancelled))
    {
        FatalBatchError::Cancelled { remaining }
    } else if round.only_rate_limit_failures() {
        FatalBatchError::RetriesExhausted { retries, remaining }
    } else {
        FatalBatchError::ElementWrite {
            failed: remaining - round.rate_limit_failures(),
        }
    }
}
