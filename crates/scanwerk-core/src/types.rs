// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk sharding engine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScanwerkError};

/// Stage number of ScanTailor's "generate output" filter.
///
/// Stages are numbered from 1 (fix orientation) through 6 (output).
pub const OUTPUT_STAGE: u32 = 6;

/// Unique identifier for one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive, 1-based range of pipeline stages that run non-interactively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRange {
    pub start_filter: u32,
    pub end_filter: u32,
}

/// Zero-based index of a shard within one partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(pub usize);

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

/// Half-open page index range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardRange {
    pub start: usize,
    pub end: usize,
}

impl ShardRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "shard range start after end");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl std::fmt::Display for ShardRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A persisted sub-plan ready to be handed to one worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardTask {
    pub shard: ShardId,
    pub range: ShardRange,
    /// Location of the sub-plan's project file.
    pub plan_path: PathBuf,
}

/// Terminal state of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardStatus {
    /// Worker exited with status 0.
    Succeeded,
    /// Worker exited non-zero (`None` when killed by a signal).
    Exited { code: Option<i32> },
    /// The worker could not be started or waited on.
    Errored(String),
    /// Terminated, or never started, because the run was cancelled.
    Cancelled,
}

impl ShardStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Failures that are not the result of cancellation.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Exited { .. } | Self::Errored(_))
    }
}

impl std::fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Exited { code: Some(code) } => write!(f, "exit code {code}"),
            Self::Exited { code: None } => write!(f, "terminated by signal"),
            Self::Errored(detail) => write!(f, "{detail}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What happened to one shard during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardOutcome {
    pub shard: ShardId,
    pub range: ShardRange,
    pub status: ShardStatus,
    pub elapsed_ms: u64,
}

/// A failed shard as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardFailure {
    pub shard: ShardId,
    pub range: ShardRange,
    pub reason: String,
}

/// Summary of one output-generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub plan_name: String,
    /// SHA-256 of the plan file the run started from.
    pub plan_digest: String,
    pub page_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the run was cut short by its deadline.
    pub timeout_secs: Option<u64>,
    /// Per-shard outcomes in shard order.
    pub outcomes: Vec<ShardOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_success())
    }

    pub fn failures(&self) -> Vec<ShardFailure> {
        self.outcomes
            .iter()
            .filter(|o| o.status.is_failure())
            .map(|o| ShardFailure {
                shard: o.shard,
                range: o.range,
                reason: o.status.to_string(),
            })
            .collect()
    }

    /// Page ranges that did not finish successfully.
    pub fn unfinished(&self) -> Vec<ShardRange> {
        self.outcomes
            .iter()
            .filter(|o| !o.status.is_success())
            .map(|o| o.range)
            .collect()
    }

    /// Reconcile the per-shard outcomes into one overall result.
    ///
    /// Hard worker failures take precedence over cancellation; the ranges
    /// of stopped shards are still listed alongside them.
    pub fn into_result(self) -> Result<Self> {
        let failed = self.failures();
        if !failed.is_empty() {
            let interrupted = self
                .outcomes
                .iter()
                .filter(|o| !o.status.is_success() && !o.status.is_failure())
                .map(|o| o.range)
                .collect();
            return Err(ScanwerkError::WorkerFailure { failed, interrupted });
        }
        if self.is_success() {
            return Ok(self);
        }
        let interrupted = self.unfinished();
        match self.timeout_secs {
            Some(secs) => Err(ScanwerkError::RunTimeout { secs, interrupted }),
            None => Err(ScanwerkError::Cancelled { interrupted }),
        }
    }
}

/// How the configuration step finds the page area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    #[default]
    Content,
    Page,
}

/// Page margins in millimetres.
///
/// Serialized as `[top, right, bottom, left]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(2.5)
    }
}

impl From<[f32; 4]> for Margins {
    fn from([top, right, bottom, left]: [f32; 4]) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }
}

impl From<Margins> for [f32; 4] {
    fn from(m: Margins) -> Self {
        [m.top, m.right, m.bottom, m.left]
    }
}

impl Margins {
    pub fn uniform(value: f32) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, range: (usize, usize), status: ShardStatus) -> ShardOutcome {
        ShardOutcome {
            shard: ShardId(index),
            range: ShardRange::new(range.0, range.1),
            status,
            elapsed_ms: 0,
        }
    }

    fn report(outcomes: Vec<ShardOutcome>, timeout_secs: Option<u64>) -> RunReport {
        let now = Utc::now();
        RunReport {
            run_id: RunId::new(),
            plan_name: "book".into(),
            plan_digest: String::new(),
            page_count: 10,
            started_at: now,
            finished_at: now,
            timeout_secs,
            outcomes,
        }
    }

    #[test]
    fn shard_range_display_and_len() {
        let range = ShardRange::new(3, 6);
        assert_eq!(range.to_string(), "[3, 6)");
        assert_eq!(range.len(), 3);
        assert!(!range.is_empty());
        assert!(ShardRange::new(4, 4).is_empty());
    }

    #[test]
    fn successful_report_reconciles_to_ok() {
        let r = report(
            vec![
                outcome(0, (0, 5), ShardStatus::Succeeded),
                outcome(1, (5, 10), ShardStatus::Succeeded),
            ],
            None,
        );
        assert!(r.into_result().is_ok());
    }

    #[test]
    fn failure_wins_over_cancellation() {
        let r = report(
            vec![
                outcome(0, (0, 5), ShardStatus::Exited { code: Some(2) }),
                outcome(1, (5, 10), ShardStatus::Cancelled),
            ],
            None,
        );
        match r.into_result() {
            Err(ScanwerkError::WorkerFailure { failed, interrupted }) => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].shard, ShardId(0));
                assert_eq!(failed[0].reason, "exit code 2");
                assert_eq!(interrupted, vec![ShardRange::new(5, 10)]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn failure_after_timeout_keeps_stopped_ranges() {
        let r = report(
            vec![
                outcome(0, (0, 3), ShardStatus::Succeeded),
                outcome(1, (3, 6), ShardStatus::Errored("failed to start worker".into())),
                outcome(2, (6, 9), ShardStatus::Cancelled),
                outcome(3, (9, 10), ShardStatus::Cancelled),
            ],
            Some(60),
        );
        let err = r.into_result().expect_err("failure");
        assert!(
            err.to_string()
                .ends_with("; unfinished page ranges: [6, 9), [9, 10)"),
            "{err}"
        );
    }

    #[test]
    fn cancelled_report_lists_unfinished_ranges() {
        let r = report(
            vec![
                outcome(0, (0, 5), ShardStatus::Succeeded),
                outcome(1, (5, 10), ShardStatus::Cancelled),
            ],
            None,
        );
        match r.into_result() {
            Err(ScanwerkError::Cancelled { interrupted }) => {
                assert_eq!(interrupted, vec![ShardRange::new(5, 10)]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn timed_out_report_maps_to_timeout() {
        let r = report(vec![outcome(0, (0, 10), ShardStatus::Cancelled)], Some(30));
        assert!(matches!(
            r.into_result(),
            Err(ScanwerkError::RunTimeout { secs: 30, .. })
        ));
    }

    #[test]
    fn detection_mode_uses_lowercase_names() {
        let mode: DetectionMode = serde_json::from_str("\"page\"").expect("parse");
        assert_eq!(mode, DetectionMode::Page);
    }

    #[test]
    fn margins_serialize_as_four_values() {
        let margins: Margins = serde_json::from_str("[1.0, 2.0, 3.0, 4.0]").expect("parse");
        assert_eq!(margins.right, 2.0);
        assert_eq!(margins.left, 4.0);
        assert_eq!(serde_json::to_string(&margins).expect("serialize"), "[1.0,2.0,3.0,4.0]");
    }
}
