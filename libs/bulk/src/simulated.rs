//! In-process graph store that throttles like a provisioned-throughput service.
//!
//! [`SimulatedStore`] keeps vertices and edges in memory and enforces a
//! capacity budget per fixed time window. Each write is charged a request
//! charge derived from the element's size; once the window's budget is spent,
//! writes are rejected with a 429 and a retry-after hint pointing at the start
//! of the next window.
//!
//! It backs the CLI so a load can be run end to end without a remote service,
//! and gives integration tests a store whose throttling reacts to concurrency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::element::GraphElement;
use crate::error::WriteError;
use crate::outcome::WriteMode;
use crate::store::{GraphStore, WriteResponse};

// ============================================================================
// Configuration
// ============================================================================

/// Throughput and behavior of a [`SimulatedStore`].
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Capacity units available per window.
    /// Default: 10000
    pub capacity_per_window: f64,

    /// Length of a throughput window.
    /// Default: 1 second
    pub window: Duration,

    /// Charge for writing an element with no properties.
    /// Default: 5.0
    pub base_charge: f64,

    /// Additional charge per property.
    /// Default: 0.5
    pub charge_per_property: f64,

    /// Charge for a rejected insert of an existing id.
    /// Default: 1.0
    pub conflict_charge: f64,

    /// Simulated round-trip latency per call.
    /// Default: zero
    pub latency: Duration,

    /// Reject edges whose endpoints are not known vertices.
    /// Default: false
    pub strict_edges: bool,
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        Self {
            capacity_per_window: 10_000.0,
            window: Duration::from_secs(1),
            base_charge: 5.0,
            charge_per_property: 0.5,
            conflict_charge: 1.0,
            latency: Duration::ZERO,
            strict_edges: false,
        }
    }
}

impl SimulatedStoreConfig {
    pub fn with_capacity_per_window(mut self, capacity: f64) -> Self {
        self.capacity_per_window = capacity;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_strict_edges(mut self, strict: bool) -> Self {
        self.strict_edges = strict;
        self
    }

    /// Request charge for writing `element`.
    pub fn request_charge(&self, element: &GraphElement) -> f64 {
        self.base_charge + self.charge_per_property * element.properties().len() as f64
    }
}

// ============================================================================
// SimulatedStore
// ============================================================================

struct Window {
    started: Instant,
    consumed: f64,
}

#[derive(Default)]
struct Graph {
    vertices: HashMap<String, GraphElement>,
    edges: HashMap<String, GraphElement>,
}

/// Counters for a [`SimulatedStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulatedStoreStats {
    pub writes: u64,
    pub throttled: u64,
    pub conflicts: u64,
    pub rejected: u64,
    pub vertices: usize,
    pub edges: usize,
}

/// Throttled in-memory graph store.
pub struct SimulatedStore {
    config: SimulatedStoreConfig,
    window: Mutex<Window>,
    graph: Mutex<Graph>,
    writes: AtomicU64,
    throttled: AtomicU64,
    conflicts: AtomicU64,
    rejected: AtomicU64,
    closed: AtomicBool,
}

impl SimulatedStore {
    pub fn new(config: SimulatedStoreConfig) -> Self {
        Self {
            config,
            window: Mutex::new(Window {
                started: Instant::now(),
                consumed: 0.0,
            }),
            graph: Mutex::new(Graph::default()),
            writes: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SimulatedStoreConfig {
        &self.config
    }

    pub fn contains(&self, id: &str) -> bool {
        self.graph()
            .map(|g| g.vertices.contains_key(id) || g.edges.contains_key(id))
            .unwrap_or(false)
    }

    pub fn get(&self, id: &str) -> Option<GraphElement> {
        let graph = self.graph().ok()?;
        graph
            .vertices
            .get(id)
            .or_else(|| graph.edges.get(id))
            .cloned()
    }

    pub fn stats(&self) -> SimulatedStoreStats {
        let (vertices, edges) = self
            .graph()
            .map(|g| (g.vertices.len(), g.edges.len()))
            .unwrap_or_default();
        SimulatedStoreStats {
            writes: self.writes.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            vertices,
            edges,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn graph(&self) -> Result<MutexGuard<'_, Graph>, WriteError> {
        self.graph
            .lock()
            .map_err(|_| WriteError::Internal("graph lock poisoned".to_string()))
    }

    /// Reserve `charge` in the current window, or return the time until the next one.
    fn reserve(&self, charge: f64) -> Result<(), Result<Duration, WriteError>> {
        let mut window = self
            .window
            .lock()
            .map_err(|_| Err(WriteError::Internal("window lock poisoned".to_string())))?;

        let now = Instant::now();
        let mut elapsed = now.duration_since(window.started);
        if elapsed >= self.config.window {
            window.started = now;
            window.consumed = 0.0;
            elapsed = Duration::ZERO;
        }

        if window.consumed + charge > self.config.capacity_per_window {
            return Err(Ok(self.config.window - elapsed));
        }
        window.consumed += charge;
        Ok(())
    }

    fn apply(&self, element: &GraphElement, mode: WriteMode) -> Result<(), WriteError> {
        let mut graph = self.graph()?;
        let id = element.id();
        let exists = graph.vertices.contains_key(id) || graph.edges.contains_key(id);
        if exists && mode == WriteMode::Insert {
            return Err(WriteError::Conflict {
                id: element.id().to_string(),
            });
        }

        match element {
            GraphElement::Vertex(v) => {
                graph.vertices.insert(v.id.clone(), element.clone());
            }
            GraphElement::Edge(e) => {
                if self.config.strict_edges {
                    for endpoint in [&e.source_id, &e.target_id] {
                        if !graph.vertices.contains_key(endpoint) {
                            return Err(WriteError::Validation(format!(
                                "edge {} references unknown vertex {}",
                                e.id, endpoint
                            )));
                        }
                    }
                }
                graph.edges.insert(e.id.clone(), element.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for SimulatedStore {
    async fn write_element(&self, element: &GraphElement, mode: WriteMode) -> WriteResponse {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
        if self.is_closed() {
            return WriteResponse::err(0.0, WriteError::Unavailable("store closed".to_string()));
        }

        let charge = self.config.request_charge(element);
        match self.reserve(charge) {
            Ok(()) => {}
            Err(Ok(retry_after)) => {
                self.throttled.fetch_add(1, Ordering::Relaxed);
                return WriteResponse::err(
                    0.0,
                    WriteError::RateLimited {
                        retry_after: Some(retry_after),
                    },
                );
            }
            Err(Err(error)) => return WriteResponse::err(0.0, error),
        }

        match self.apply(element, mode) {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                WriteResponse::ok(charge)
            }
            Err(error @ WriteError::Conflict { .. }) => {
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                WriteResponse::err(self.config.conflict_charge, error)
            }
            Err(error) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                WriteResponse::err(charge, error)
            }
        }
    }

    async fn ping(&self) -> Result<(), WriteError> {
        if self.is_closed() {
            Err(WriteError::Unavailable("store closed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
