/// Instrumented store double for orchestrator integration tests
///
/// `RecordingStore` records, per element id, how many times it was written and
/// when its last write started and ended, and tracks the number of writes in
/// flight so tests can check the concurrency bound and the group barrier.
/// Failures are scripted:
/// - `rate_limit(id, n)`: the first `n` attempts for `id` are rejected with a 429
/// - `reject(id)`: every attempt for `id` fails with a validation error
use async_trait::async_trait;
use graphload_bulk::{GraphElement, GraphStore, Vertex, WriteError, WriteMode, WriteResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const CHARGE: f64 = 2.5;

#[derive(Default)]
pub struct RecordingStore {
    rate_limited: HashMap<String, u32>,
    rejected: Vec<String>,
    latency: Duration,
    attempts: Mutex<HashMap<String, u32>>,
    spans: Mutex<HashMap<String, (Instant, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate_limit(mut self, id: impl Into<String>, attempts: u32) -> Self {
        self.rate_limited.insert(id.into(), attempts);
        self
    }

    pub fn reject(mut self, id: impl Into<String>) -> Self {
        self.rejected.push(id.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Start and end of the last write of `id`.
    pub fn span(&self, id: &str) -> Option<(Instant, Instant)> {
        self.spans.lock().unwrap().get(id).copied()
    }
}

#[async_trait]
impl GraphStore for RecordingStore {
    async fn write_element(&self, element: &GraphElement, _mode: WriteMode) -> WriteResponse {
        let started = Instant::now();
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(element.id().to_string()).or_default();
            *n += 1;
            *n
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.spans
            .lock()
            .unwrap()
            .insert(element.id().to_string(), (started, Instant::now()));

        let id = element.id().to_string();
        if self.rejected.contains(&id) {
            return WriteResponse::err(1.0, WriteError::Validation(format!("{} rejected", id)));
        }
        if attempt <= self.rate_limited.get(&id).copied().unwrap_or(0) {
            return WriteResponse::err(0.0, WriteError::RateLimited { retry_after: None });
        }
        WriteResponse::ok(CHARGE)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// `n` vertices `v0..v{n-1}` spread round-robin over `partitions` partition keys.
pub fn vertices(n: usize, partitions: usize) -> Vec<Arc<GraphElement>> {
    (0..n)
        .map(|i| {
            Arc::new(
                Vertex::new(format!("v{}", i), "sensor", format!("p{}", i % partitions))
                    .with_property("index", i as i64)
                    .into(),
            )
        })
        .collect()
}
