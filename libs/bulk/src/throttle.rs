//! Concurrency controller ("throttle").
//!
//! Decides how many writes may be in flight at once and arranges a batch's
//! operations into an execution plan: ordered groups no larger than the
//! current level. The executor treats each group boundary as a barrier, so
//! the group size is the effective concurrency ceiling.
//!
//! # Partition diversity
//!
//! A throttled graph store enforces its budget per partition as well as in
//! aggregate. Operations are shuffled and then dealt into groups so that one
//! group rarely holds two writes to the same partition:
//!
//! 1. Shuffle all operations with the controller's seeded RNG.
//! 2. Bucket them by partition key, keeping the shuffled order inside buckets.
//! 3. Fill each group by taking one operation from each non-empty bucket,
//!    fullest bucket first (ties by first appearance in the shuffled order).
//! 4. If the group is still short because fewer partitions than `level`
//!    remain, deal another round from the same ordering.
//!
//! This is best effort. A partition repeats inside a group only when the
//! group could not otherwise be filled to `level`.
//!
//! # Level adjustment
//!
//! After each executor round the level is hill-climbed:
//!
//! | Round result | New level |
//! |--------------|-----------|
//! | any rate-limit failure | `floor(level * backoff_factor)`, at least 1 |
//! | no failures, capacity < `growth_threshold * budget` | `level + growth_step`, at most the ceiling |
//! | anything else | unchanged |

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::ThrottleConfig;
use crate::error::ConfigError;
use crate::outcome::{BatchReport, WriteOperation};

/// An execution plan: groups run one after another, members of a group run concurrently.
pub type Plan = Vec<Vec<WriteOperation>>;

// ============================================================================
// ConcurrencyState
// ============================================================================

/// Direction of the most recent level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Up,
    Down,
    Hold,
}

/// Mutable tuning state, owned by one orchestrator for the life of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcurrencyState {
    /// Current concurrency level, always in `[1, ceiling]`.
    pub level: usize,
    /// Capacity units one round may consume before growth stops.
    pub capacity_budget: f64,
    pub last_adjustment: Adjustment,
}

// ============================================================================
// ConcurrencyController
// ============================================================================

/// Builds execution plans and tunes the concurrency level.
#[derive(Debug)]
pub struct ConcurrencyController {
    config: ThrottleConfig,
    rng: StdRng,
}

impl ConcurrencyController {
    /// Create a controller, rejecting an invalid configuration.
    pub fn new(config: ThrottleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn ceiling(&self) -> usize {
        self.config.max_concurrency_level
    }

    /// State for the first batch of a run.
    pub fn initial_state(&self) -> ConcurrencyState {
        ConcurrencyState {
            level: self.config.initial_concurrency_level,
            capacity_budget: self.config.capacity_budget_per_batch,
            last_adjustment: Adjustment::Hold,
        }
    }

    /// Arrange `operations` into groups of at most `level` operations.
    ///
    /// Every operation appears in exactly one group. A `level` of zero is
    /// treated as one.
    pub fn build_plan(&mut self, mut operations: Vec<WriteOperation>, level: usize) -> Plan {
        let level = level.max(1);
        let total = operations.len();
        if total == 0 {
            return Vec::new();
        }

        operations.shuffle(&mut self.rng);

        let mut buckets: Vec<VecDeque<WriteOperation>> = Vec::new();
        let mut bucket_of: HashMap<String, usize> = HashMap::new();
        for op in operations {
            let index = match bucket_of.get(op.partition_key()) {
                Some(&index) => index,
                None => {
                    bucket_of.insert(op.partition_key().to_string(), buckets.len());
                    buckets.push(VecDeque::new());
                    buckets.len() - 1
                }
            };
            buckets[index].push_back(op);
        }

        let mut remaining = total;
        let mut plan = Vec::with_capacity(total.div_ceil(level));
        while remaining > 0 {
            let size = level.min(remaining);

            // Stable sort keeps first-appearance order among equally full buckets
            let mut order: Vec<usize> = (0..buckets.len())
                .filter(|&i| !buckets[i].is_empty())
                .collect();
            order.sort_by(|&a, &b| buckets[b].len().cmp(&buckets[a].len()));

            let mut group = Vec::with_capacity(size);
            while group.len() < size {
                for &i in &order {
                    if group.len() == size {
                        break;
                    }
                    if let Some(op) = buckets[i].pop_front() {
                        group.push(op);
                    }
                }
            }

            remaining -= group.len();
            plan.push(group);
        }

        tracing::trace!(
            operations = total,
            level,
            groups = plan.len(),
            partitions = buckets.len(),
            "Built execution plan"
        );
        plan
    }

    /// Derive the next state from the report of the round just executed.
    pub fn adjust_level(&self, state: ConcurrencyState, report: &BatchReport) -> ConcurrencyState {
        let previous = state.level;
        let level = if report.has_rate_limit_failures() {
            let reduced = (previous as f64 * self.config.rate_limit_backoff_factor).floor() as usize;
            reduced.max(1)
        } else if report.failures.is_empty()
            && report.total_capacity_consumed
                < self.config.growth_threshold * state.capacity_budget
        {
            previous
                .saturating_add(self.config.growth_step)
                .min(self.config.max_concurrency_level)
        } else {
            previous
        };

        let last_adjustment = match level.cmp(&previous) {
            std::cmp::Ordering::Greater => Adjustment::Up,
            std::cmp::Ordering::Less => Adjustment::Down,
            std::cmp::Ordering::Equal => Adjustment::Hold,
        };

        if last_adjustment != Adjustment::Hold {
            tracing::debug!(
                from = previous,
                to = level,
                direction = ?last_adjustment,
                rate_limited = report.rate_limit_failures(),
                capacity = report.total_capacity_consumed,
                "Adjusted concurrency level"
            );
        }

        ConcurrencyState {
            level,
            last_adjustment,
            ..state
        }
    }
}
