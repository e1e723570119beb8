use std::collections::HashSet;
use std::sync::Arc;

use clap::Args as ClapArgs;
use graphload_bulk::{ConcurrencyController, ThrottleConfig, Vertex, WriteMode, WriteOperation};

use crate::table::{OutputFormat, TablePrinter};

#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, ClapArgs)]
pub struct Command {
    /// Number of synthetic operations to plan
    #[clap(long, default_value = "1000")]
    pub base_count: usize,

    /// Highest concurrency level to plan for
    #[clap(long, default_value = "16")]
    pub max_level: usize,

    /// Distinct partition keys among the synthetic operations
    #[clap(long, default_value = "10")]
    pub partitions: usize,

    /// Shuffle seed
    #[clap(long, default_value = "0")]
    pub seed: u64,

    /// Output format
    #[clap(long, short = 'f', value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Shape of one plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanShape {
    pub level: usize,
    pub groups: usize,
    pub largest_group: usize,
    /// Groups holding two operations on the same partition.
    pub mixed_groups: usize,
}

pub fn run(cmd: &Command) -> i32 {
    trace!("Running command: {:?}", cmd);
    match plan_shapes(cmd) {
        Ok(shapes) => {
            let mut table = TablePrinter::new(
                vec!["level", "groups", "largest_group", "mixed_groups"],
                cmd.format,
            );
            for shape in shapes {
                table.add_row(vec![
                    shape.level.to_string(),
                    shape.groups.to_string(),
                    shape.largest_group.to_string(),
                    shape.mixed_groups.to_string(),
                ]);
            }
            table.print();
            0
        }
        Err(e) => {
            error!("Throttle demo failed: {:#}", e);
            1
        }
    }
}

/// Plan `base_count` synthetic writes at every level from 1 to `max_level`.
pub fn plan_shapes(cmd: &Command) -> anyhow::Result<Vec<PlanShape>> {
    let partitions = cmd.partitions.max(1);
    let config = ThrottleConfig::default()
        .with_initial_level(1)
        .with_max_level(cmd.max_level)
        .with_shuffle_seed(cmd.seed);
    let mut controller = ConcurrencyController::new(config)?;

    let operations: Vec<WriteOperation> = (0..cmd.base_count)
        .map(|i| {
            let vertex = Vertex::new(format!("v{}", i), "synthetic", format!("p{}", i % partitions));
            WriteOperation::new(Arc::new(vertex.into()), WriteMode::Upsert)
        })
        .collect();

    let mut shapes = Vec::with_capacity(cmd.max_level);
    for level in 1..=cmd.max_level {
        let plan = controller.build_plan(operations.clone(), level);
        let mixed_groups = plan
            .iter()
            .filter(|group| {
                let keys: HashSet<&str> = group.iter().map(|op| op.partition_key()).collect();
                keys.len() < group.len()
            })
            .count();
        shapes.push(PlanShape {
            level,
            groups: plan.len(),
            largest_group: plan.iter().map(Vec::len).max().unwrap_or(0),
            mixed_groups,
        });
    }
    debug!(levels = shapes.len(), operations = cmd.base_count, "Planned synthetic batch");
    Ok(shapes)
}
