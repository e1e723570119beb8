//! Run driver: read batches, submit them, accumulate totals, write markers.
//!
//! [`BulkLoader`] is the caller loop around [`BulkOrchestrator`]. It pulls
//! `batch_size` elements at a time from an [`ElementReader`], hands each batch
//! to the orchestrator, and folds the reports into [`RunTotals`]. A fatal batch
//! does not stop the run by itself; the run stops when the accumulated
//! failures exceed the configured tolerance or the run is cancelled. A halted
//! run still yields its [`LoadReport`], carried by the returned [`LoadError`].

use std::io::BufRead;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::executor::CancelSignal;
use crate::marker::MarkerWriter;
use crate::orchestrator::BulkOrchestrator;
use crate::outcome::RunTotals;
use crate::source::ElementReader;
use crate::store::GraphStore;

// ============================================================================
// RunSummary
// ============================================================================

/// Final figures of a run, written to the done marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub batches: usize,
    pub fatal_batches: usize,
    pub rows_read: u64,
    pub rows_rejected: u64,
    pub succeeded: usize,
    pub failed: usize,
    pub retries: u64,
    pub capacity_consumed: f64,
    pub elapsed_ms: u64,
    pub final_level: Option<usize>,
}

impl RunSummary {
    fn new(totals: &RunTotals, rows_read: u64, rows_rejected: u64, elapsed: Duration) -> Self {
        Self {
            dry_run: false,
            batches: totals.batches,
            fatal_batches: totals.fatal_batches,
            rows_read,
            rows_rejected,
            succeeded: totals.success_count,
            failed: totals.failure_count(),
            retries: totals.retries,
            capacity_consumed: totals.total_capacity_consumed,
            elapsed_ms: elapsed.as_millis() as u64,
            final_level: None,
        }
    }
}

/// Everything a finished or halted run produced.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub summary: RunSummary,
    pub totals: RunTotals,
}

// ============================================================================
// BulkLoader
// ============================================================================

/// Why a run stopped before the source was exhausted.
enum Halt {
    Tolerance { failures: usize, tolerance: usize },
    Cancelled,
}

pub struct BulkLoader<S: GraphStore + ?Sized> {
    store: Arc<S>,
    config: LoaderConfig,
    cancel: CancelSignal,
}

impl<S: GraphStore + ?Sized + 'static> BulkLoader<S> {
    pub fn new(store: Arc<S>, config: LoaderConfig) -> Self {
        Self {
            store,
            config,
            cancel: CancelSignal::new(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Handle that stops the run at the next group boundary. The batch in
    /// progress reports its unstarted elements as cancelled and no further
    /// batch is read.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Run the load and write the matching marker.
    ///
    /// # Errors
    ///
    /// Any [`LoadError`]; the error marker is written first when configured,
    /// with the run summary appended when the error carries a report. A
    /// failure to write the done marker is reported as [`LoadError::Marker`].
    pub async fn run<R: BufRead>(&self, reader: ElementReader<R>) -> Result<LoadReport, LoadError> {
        let markers = MarkerWriter::new(
            self.config.done_marker.clone(),
            self.config.error_marker.clone(),
        );

        match self.drive(reader).await {
            Ok(report) => {
                markers
                    .write_done(&report.summary)
                    .map_err(LoadError::Marker)?;
                Ok(report)
            }
            Err(error) => {
                tracing::error!(error = %error, "Load failed");
                let written = match error.report() {
                    Some(report) => markers.write_error_with_summary(&error, &report.summary),
                    None => markers.write_error(&error),
                };
                if let Err(marker_error) = written {
                    tracing::warn!(error = %marker_error, "Failed to write error marker");
                }
                Err(error)
            }
        }
    }

    async fn drive<R: BufRead>(&self, reader: ElementReader<R>) -> Result<LoadReport, LoadError> {
        self.config.validate()?;
        let mut reader = reader.with_verbose(self.config.verbose);

        if !self.config.load {
            return self.dry_run(&mut reader);
        }

        let start = Instant::now();
        let mut orchestrator =
            BulkOrchestrator::connect(Arc::clone(&self.store), self.config.throttle.clone())
                .await?
                .with_cancel_signal(self.cancel.clone());
        let mut totals = RunTotals::new();

        let result = self
            .load_batches(&mut orchestrator, &mut reader, &mut totals)
            .await;
        let final_level = orchestrator.level();
        orchestrator.shutdown().await;
        let halt = result?;

        let mut summary = RunSummary::new(
            &totals,
            reader.rows_read(),
            reader.rows_rejected(),
            start.elapsed(),
        );
        summary.final_level = Some(final_level);
        tracing::info!(
            batches = summary.batches,
            succeeded = summary.succeeded,
            failed = summary.failed,
            retries = summary.retries,
            capacity = summary.capacity_consumed,
            elapsed_ms = summary.elapsed_ms,
            final_level,
            halted = halt.is_some(),
            "Load finished"
        );

        let report = LoadReport { summary, totals };
        match halt {
            None => Ok(report),
            Some(Halt::Tolerance { failures, tolerance }) => Err(LoadError::FailureToleranceExceeded {
                failures,
                tolerance,
                report: Box::new(report),
            }),
            Some(Halt::Cancelled) => Err(LoadError::Cancelled {
                report: Box::new(report),
            }),
        }
    }

    async fn load_batches<R: BufRead>(
        &self,
        orchestrator: &mut BulkOrchestrator<S>,
        reader: &mut ElementReader<R>,
        totals: &mut RunTotals,
    ) -> Result<Option<Halt>, LoadError> {
        let tolerance = self.config.failure_tolerance;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Some(Halt::Cancelled));
            }
            let batch = reader
                .next_batch(self.config.batch_size)
                .map_err(LoadError::Source)?;
            if batch.is_empty() {
                return Ok(None);
            }

            let number = totals.batches + 1;
            tracing::info!(batch = number, elements = batch.len(), "Start of batch load");
            let report = orchestrator.submit_batch(batch, self.config.upsert).await;
            tracing::info!(
                batch = number,
                succeeded = report.success_count,
                failed = report.failures.len(),
                retries = report.retries,
                capacity = report.total_capacity_consumed,
                elapsed_ms = report.elapsed.as_millis() as u64,
                level = orchestrator.level(),
                "Batch load complete"
            );
            for failure in &report.failures {
                tracing::debug!(id = %failure.element.id(), error = %failure.error, "Element failed");
            }
            totals.accumulate(report);

            if self.cancel.is_cancelled() {
                return Ok(Some(Halt::Cancelled));
            }
            if totals.failure_count() > tolerance {
                return Ok(Some(Halt::Tolerance {
                    failures: totals.failure_count(),
                    tolerance,
                }));
            }
        }
    }

    /// Parse and count every element without touching the store.
    fn dry_run<R: BufRead>(&self, reader: &mut ElementReader<R>) -> Result<LoadReport, LoadError> {
        let start = Instant::now();
        let mut batches = 0;
        loop {
            let batch = reader
                .next_batch(self.config.batch_size)
                .map_err(LoadError::Source)?;
            if batch.is_empty() {
                break;
            }
            batches += 1;
        }

        let totals = RunTotals::new();
        let mut summary = RunSummary::new(
            &totals,
            reader.rows_read(),
            reader.rows_rejected(),
            start.elapsed(),
        );
        summary.dry_run = true;
        summary.batches = batches;
        tracing::info!(
            batches,
            rows_read = summary.rows_read,
            rows_rejected = summary.rows_rejected,
            "Dry run complete, nothing written"
        );
        Ok(LoadReport { summary, totals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottleConfig;
    use crate::simulated::{SimulatedStore, SimulatedStoreConfig};
    use std::io::Cursor;

    fn rows(n: usize) -> String {
        (0..n)
            .map(|i| {
                format!(
                    r#"{{"kind":"vertex","id":"v{}","label":"station","partition_key":"p{}"}}"#,
                    i,
                    i % 4
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn config() -> LoaderConfig {
        LoaderConfig::default()
            .with_batch_size(10)
            .with_throttle(ThrottleConfig::default().with_shuffle_seed(3))
    }

    #[tokio::test]
    async fn test_run_writes_every_batch_and_closes_store() {
        let store = Arc::new(SimulatedStore::new(SimulatedStoreConfig::default()));
        let loader = BulkLoader::new(Arc::clone(&store), config());

        let report = loader
            .run(ElementReader::new(Cursor::new(rows(25))))
            .await
            .unwrap();

        assert_eq!(report.summary.batches, 3);
        assert_eq!(report.summary.succeeded, 25);
        assert_eq!(report.summary.failed, 0);
        assert_eq!(report.summary.rows_read, 25);
        // Three clean batches under budget: 4 -> 5 -> 6 -> 7
        assert_eq!(report.summary.final_level, Some(7));
        assert_eq!(store.stats().vertices, 25);
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_writing() {
        let store = Arc::new(SimulatedStore::new(SimulatedStoreConfig::default()));
        let mut config = config();
        config.load = false;
        let loader = BulkLoader::new(Arc::clone(&store), config);

        let input = format!("{}\nnot json\n", rows(12));
        let report = loader.run(ElementReader::new(Cursor::new(input))).await.unwrap();

        assert!(report.summary.dry_run);
        assert_eq!(report.summary.batches, 2);
        assert_eq!(report.summary.rows_read, 12);
        assert_eq!(report.summary.rows_rejected, 1);
        assert_eq!(report.summary.succeeded, 0);
        assert_eq!(store.stats().writes, 0);
        assert!(!store.is_closed());
    }

    #[tokio::test]
    async fn test_conflicts_past_tolerance_stop_the_run_and_write_error_marker() {
        let dir = tempfile::tempdir().unwrap();
        let error_marker = dir.path().join("load.error");
        let done_marker = dir.path().join("load.done");

        let store = Arc::new(SimulatedStore::new(SimulatedStoreConfig::default()));
        let mut config = config().with_upsert(false).with_failure_tolerance(1);
        config.error_marker = Some(error_marker.clone());
        config.done_marker = Some(done_marker.clone());
        let loader = BulkLoader::new(Arc::clone(&store), config);

        // Every id appears twice; the second insert of each conflicts
        let input = format!("{}\n{}", rows(5), rows(5));
        let err = loader
            .run(ElementReader::new(Cursor::new(input)))
            .await
            .unwrap_err();

        match err {
            LoadError::FailureToleranceExceeded {
                failures,
                tolerance,
                report,
            } => {
                assert_eq!(failures, 5);
                assert_eq!(tolerance, 1);
                assert_eq!(report.summary.succeeded, 5);
                assert_eq!(report.summary.failed, 5);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(store.is_closed());
        assert!(!done_marker.exists());
        let body = std::fs::read_to_string(&error_marker).unwrap();
        assert!(body.contains("exceed tolerance 1"));
    }

    #[tokio::test]
    async fn test_halted_run_keeps_its_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let error_marker = dir.path().join("load.error");

        let store = Arc::new(SimulatedStore::new(SimulatedStoreConfig::default()));
        let mut config = config().with_upsert(false);
        config.error_marker = Some(error_marker.clone());
        let loader = BulkLoader::new(Arc::clone(&store), config);

        let input = format!("{}\n{}", rows(3), rows(1));
        let err = loader
            .run(ElementReader::new(Cursor::new(input)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoadError::FailureToleranceExceeded { failures: 1, tolerance: 0, .. }
        ));
        let report = err.report().unwrap();
        assert_eq!(report.summary.batches, 1);
        assert_eq!(report.summary.succeeded, 3);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.final_level, Some(4));
        assert!(report.summary.capacity_consumed > 0.0);
        assert_eq!(report.totals.failures[0].element.id(), "v0");
        assert!(matches!(
            report.totals.failures[0].error,
            crate::error::WriteError::Conflict { .. }
        ));

        let body = std::fs::read_to_string(&error_marker).unwrap();
        let (head, summary) = body.split_once("summary:\n").unwrap();
        assert!(head.contains("accumulated failures 1 exceed tolerance 0"));
        let summary: serde_json::Value = serde_json::from_str(summary).unwrap();
        assert_eq!(summary["succeeded"], 3);
        assert_eq!(summary["failed"], 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_reads_no_batch() {
        let store = Arc::new(SimulatedStore::new(SimulatedStoreConfig::default()));
        let loader = BulkLoader::new(Arc::clone(&store), config());
        loader.cancel_signal().cancel();

        let err = loader
            .run(ElementReader::new(Cursor::new(rows(30))))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "load cancelled after 0 batches");
        let report = err.report().unwrap();
        assert_eq!(report.summary.batches, 0);
        assert_eq!(report.summary.rows_read, 0);
        assert_eq!(store.stats().writes, 0);
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_failures_within_tolerance_complete_with_done_marker() {
        let dir = tempfile::tempdir().unwrap();
        let done_marker = dir.path().join("load.done");

        let store = Arc::new(SimulatedStore::new(
            SimulatedStoreConfig::default().with_strict_edges(true),
        ));
        let mut config = config().with_failure_tolerance(5);
        config.done_marker = Some(done_marker.clone());
        let loader = BulkLoader::new(Arc::clone(&store), config);

        let input = format!(
            "{}\n{}",
            rows(3),
            r#"{"kind":"edge","id":"e1","label":"route","partition_key":"p0","source_id":"v0","target_id":"missing"}"#
        );
        let report = loader.run(ElementReader::new(Cursor::new(input))).await.unwrap();

        assert_eq!(report.summary.succeeded, 3);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.fatal_batches, 1);
        assert_eq!(report.totals.failures[0].element.id(), "e1");

        let body: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&done_marker).unwrap()).unwrap();
        assert_eq!(body["succeeded"], 3);
        assert_eq!(body["failed"], 1);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_connecting() {
        let store = Arc::new(SimulatedStore::new(SimulatedStoreConfig::default()));
        let loader = BulkLoader::new(Arc::clone(&store), config().with_batch_size(0));

        let err = loader
            .run(ElementReader::new(Cursor::new(rows(3))))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Config(_)));
        assert!(!store.is_closed());
    }
}
