//! Completion markers for external schedulers.
//!
//! A run that finishes writes the "done" marker with its summary; a run that
//! fails writes the "error" marker with the error and its source chain,
//! followed by the summary when the run got far enough to have one. Either
//! path may be unset, in which case nothing is written for that outcome.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct MarkerWriter {
    done: Option<PathBuf>,
    error: Option<PathBuf>,
}

impl MarkerWriter {
    pub fn new(done: Option<PathBuf>, error: Option<PathBuf>) -> Self {
        Self { done, error }
    }

    /// Write `summary` as pretty JSON to the done marker.
    ///
    /// Returns the path written, or `None` when no done marker is configured.
    pub fn write_done<T: Serialize>(&self, summary: &T) -> Result<Option<PathBuf>> {
        let Some(path) = &self.done else {
            return Ok(None);
        };
        let body = serde_json::to_string_pretty(summary).context("Failed to encode run summary")?;
        write_marker(path, &body)?;
        tracing::info!(path = %path.display(), "Wrote done marker");
        Ok(Some(path.clone()))
    }

    /// Write `error` and each of its sources, one per line, to the error marker.
    pub fn write_error(&self, error: &(dyn std::error::Error + 'static)) -> Result<Option<PathBuf>> {
        let Some(path) = &self.error else {
            return Ok(None);
        };
        write_marker(path, &error_chain(error))?;
        tracing::info!(path = %path.display(), "Wrote error marker");
        Ok(Some(path.clone()))
    }

    /// Like [`write_error`](Self::write_error), with `summary` appended as pretty JSON.
    pub fn write_error_with_summary<T: Serialize>(
        &self,
        error: &(dyn std::error::Error + 'static),
        summary: &T,
    ) -> Result<Option<PathBuf>> {
        let Some(path) = &self.error else {
            return Ok(None);
        };
        let summary =
            serde_json::to_string_pretty(summary).context("Failed to encode run summary")?;
        let body = format!("{}summary:\n{}\n", error_chain(error), summary);
        write_marker(path, &body)?;
        tracing::info!(path = %path.display(), "Wrote error marker");
        Ok(Some(path.clone()))
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(text, "\ncaused by: {}", cause);
        source = cause.source();
    }
    text.push('\n');
    text
}

fn write_marker(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create marker directory {}", parent.display()))?;
    }
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write marker {}", path.display()))
}
