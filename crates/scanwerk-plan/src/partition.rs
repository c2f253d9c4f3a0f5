// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Balanced partitioning of a plan into independent sub-plans.
//
// Shards are contiguous page ranges of size ceil(N / n); the last shard takes
// the remainder and shards that would be empty are not produced.

use std::path::Path;

use tracing::{debug, info, instrument};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{ShardId, ShardRange, ShardTask};

use crate::store::{PROJECT_EXTENSION, ProcessingPlan};

/// One shard of a plan, ready to be persisted for a worker.
#[derive(Debug, Clone)]
pub struct SubPlan {
    pub shard: ShardId,
    pub range: ShardRange,
    /// Unique within one partitioning: `<plan name>-<shard index>.ScanTailor`.
    pub file_name: String,
    pub plan: ProcessingPlan,
}

impl SubPlan {
    /// Write the sub-plan into `dir` and describe it as a worker task.
    pub fn persist(&self, dir: &Path) -> Result<ShardTask> {
        let plan_path = dir.join(&self.file_name);
        self.plan.save(&plan_path)?;
        Ok(ShardTask {
            shard: self.shard,
            range: self.range,
            plan_path,
        })
    }
}

/// Compute the page ranges for splitting `total` pages into `shards` parts.
///
/// `shards` is clamped to `total`; zero pages yield no ranges.
pub fn shard_ranges(total: usize, shards: usize) -> Result<Vec<ShardRange>> {
    if shards == 0 {
        return Err(ScanwerkError::InvalidShardCount(shards));
    }
    if total == 0 {
        return Ok(Vec::new());
    }

    let shards = shards.min(total);
    let per_shard = total.div_ceil(shards);
    let ranges = (0..shards)
        .map(|k| k * per_shard)
        .take_while(|&start| start < total)
        .map(|start| ShardRange::new(start, (start + per_shard).min(total)))
        .collect();
    Ok(ranges)
}

/// Split `plan` into at most `shards` sub-plans, in shard order.
///
/// All four page collections are restricted to the same index range, and
/// the job-level settings are copied into every sub-plan unchanged.
#[instrument(skip(plan), fields(plan = plan.name(), pages = plan.len()))]
pub fn partition(plan: &ProcessingPlan, shards: usize) -> Result<Vec<SubPlan>> {
    let ranges = shard_ranges(plan.len(), shards)?;
    let subplans: Vec<SubPlan> = ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| SubPlan {
            shard: ShardId(index),
            range,
            file_name: format!("{}-{index}.{PROJECT_EXTENSION}", plan.name()),
            plan: plan.slice(range),
        })
        .collect();

    info!(requested = shards, produced = subplans.len(), "plan partitioned");
    Ok(subplans)
}

/// Persist every sub-plan into `dir`.
#[instrument(skip_all, fields(dir = %dir.display(), count = subplans.len()))]
pub fn persist_all(subplans: &[SubPlan], dir: &Path) -> Result<Vec<ShardTask>> {
    subplans
        .iter()
        .map(|subplan| {
            let task = subplan.persist(dir)?;
            debug!(shard = %task.shard, range = %task.range, path = %task.plan_path.display(), "sub-plan written");
            Ok(task)
        })
        .collect()
}
