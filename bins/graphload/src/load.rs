use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::Args as ClapArgs;
use graphload_bulk::{
    BulkLoader, ElementReader, LoadError, LoadReport, LoaderConfig, MarkerWriter,
    SimulatedStore, SimulatedStoreConfig,
};
use tokio::runtime::Runtime;

use crate::table::{OutputFormat, TablePrinter};

#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, ClapArgs)]
pub struct Command {
    /// JSON-lines file of graph elements
    #[clap(long, short = 'i')]
    pub input: PathBuf,

    /// JSON configuration file; flags given on the command line override it
    #[clap(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Elements per batch
    #[clap(long)]
    pub batch_size: Option<usize>,

    /// Insert elements instead of upserting them
    #[clap(long)]
    pub insert: bool,

    /// Concurrency level for the first batch
    #[clap(long)]
    pub initial_level: Option<usize>,

    /// Concurrency ceiling
    #[clap(long)]
    pub max_level: Option<usize>,

    /// Capacity units a round may consume before growth stops
    #[clap(long)]
    pub capacity_budget: Option<f64>,

    /// Retry rounds per batch for rate-limited elements
    #[clap(long)]
    pub max_retries: Option<u32>,

    /// Level multiplier after a rate-limited round
    #[clap(long)]
    pub backoff: Option<f64>,

    /// Level increment after a clean round
    #[clap(long)]
    pub growth_step: Option<usize>,

    /// Element failures tolerated before the run stops
    #[clap(long)]
    pub failure_tolerance: Option<usize>,

    /// Shuffle seed for reproducible plans
    #[clap(long)]
    pub seed: Option<u64>,

    /// Capacity units per second of the simulated store
    #[clap(long, default_value = "10000")]
    pub store_capacity: f64,

    /// Simulated per-write latency in milliseconds
    #[clap(long, default_value = "0")]
    pub store_latency_ms: u64,

    /// Reject edges whose endpoints have not been written
    #[clap(long)]
    pub strict_edges: bool,

    /// Marker file written with the summary on success
    #[clap(long)]
    pub done_marker: Option<PathBuf>,

    /// Marker file written with the error on failure
    #[clap(long)]
    pub error_marker: Option<PathBuf>,

    /// Parse and count elements without writing them
    #[clap(long)]
    pub dry_run: bool,

    /// Log every parsed element and per-element failures
    #[clap(long, short = 'v')]
    pub verbose: bool,

    /// Summary output format
    #[clap(long, short = 'f', value_enum, default_value = "table")]
    pub format: OutputFormat,
}

pub fn run(cmd: &Command) -> i32 {
    trace!("Running command: {:?}", cmd);
    println!("Start time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    let code = match run_load(cmd) {
        Ok(report) => {
            print_summary(&report, cmd.format);
            0
        }
        Err(e) => {
            error!("Load failed: {:#}", e);
            // A halted run still wrote elements; show what it got through
            if let Some(report) = e.downcast_ref::<LoadError>().and_then(LoadError::report) {
                print_summary(report, cmd.format);
            }
            eprintln!("Error: {:#}", e);
            1
        }
    };

    println!("Finish time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    code
}

fn run_load(cmd: &Command) -> anyhow::Result<LoadReport> {
    let config = loader_config(cmd)?;
    info!(
        input = %cmd.input.display(),
        batch_size = config.batch_size,
        upsert = config.upsert,
        load = config.load,
        "Loading elements"
    );

    let reader = match ElementReader::open(&cmd.input) {
        Ok(reader) => reader,
        Err(e) => {
            let error = LoadError::Source(e);
            MarkerWriter::new(None, config.error_marker.clone()).write_error(&error)?;
            return Err(error.into());
        }
    };
    let store = Arc::new(SimulatedStore::new(
        SimulatedStoreConfig::default()
            .with_capacity_per_window(cmd.store_capacity)
            .with_latency(Duration::from_millis(cmd.store_latency_ms))
            .with_strict_edges(cmd.strict_edges),
    ));

    let rt = Runtime::new()?;
    let loader = BulkLoader::new(store, config);

    let cancel = loader.cancel_signal();
    rt.spawn(async move {
        // Ctrl+C stops the run at the next group boundary
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current group");
            cancel.cancel();
        }
    });

    let report = rt.block_on(loader.run(reader))?;
    Ok(report)
}

/// Configuration file (or defaults) with command-line overrides applied.
pub fn loader_config(cmd: &Command) -> anyhow::Result<LoaderConfig> {
    let mut config = match &cmd.config {
        Some(path) => LoaderConfig::from_json_file(path)?,
        None => LoaderConfig::default(),
    };

    if let Some(batch_size) = cmd.batch_size {
        config.batch_size = batch_size;
    }
    if cmd.insert {
        config.upsert = false;
    }
    if cmd.dry_run {
        config.load = false;
    }
    if let Some(tolerance) = cmd.failure_tolerance {
        config.failure_tolerance = tolerance;
    }
    if cmd.done_marker.is_some() {
        config.done_marker = cmd.done_marker.clone();
    }
    if cmd.error_marker.is_some() {
        config.error_marker = cmd.error_marker.clone();
    }
    config.verbose |= cmd.verbose;

    let throttle = &mut config.throttle;
    if let Some(level) = cmd.initial_level {
        throttle.initial_concurrency_level = level;
    }
    if let Some(level) = cmd.max_level {
        throttle.max_concurrency_level = level;
    }
    if let Some(budget) = cmd.capacity_budget {
        throttle.capacity_budget_per_batch = budget;
    }
    if let Some(retries) = cmd.max_retries {
        throttle.max_retries_per_batch = retries;
    }
    if let Some(factor) = cmd.backoff {
        throttle.rate_limit_backoff_factor = factor;
    }
    if let Some(step) = cmd.growth_step {
        throttle.growth_step = step;
    }
    if let Some(seed) = cmd.seed {
        throttle.shuffle_seed = Some(seed);
    }

    config.validate().context("Invalid load configuration")?;
    Ok(config)
}

fn print_summary(report: &LoadReport, format: OutputFormat) {
    let summary = &report.summary;
    let mut table = TablePrinter::new(vec!["metric", "value"], format);
    let rows = [
        ("dry_run", summary.dry_run.to_string()),
        ("batches", summary.batches.to_string()),
        ("fatal_batches", summary.fatal_batches.to_string()),
        ("rows_read", summary.rows_read.to_string()),
        ("rows_rejected", summary.rows_rejected.to_string()),
        ("succeeded", summary.succeeded.to_string()),
        ("failed", summary.failed.to_string()),
        ("retries", summary.retries.to_string()),
        ("capacity_consumed", format!("{:.2}", summary.capacity_consumed)),
        ("elapsed_ms", summary.elapsed_ms.to_string()),
        (
            "final_level",
            summary
                .final_level
                .map_or_else(|| "-".to_string(), |level| level.to_string()),
        ),
    ];
    for (metric, value) in rows {
        table.add_row(vec![metric.to_string(), value]);
    }
    table.print();

    for failure in report.totals.failures.iter().take(10) {
        println!("failed: {} ({})", failure.element.id(), failure.error);
    }
    if report.totals.failures.len() > 10 {
        println!("... and {} more failures", report.totals.failures.len() - 10);
    }
}
