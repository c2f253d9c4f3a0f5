// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ShardFailure, ShardRange};

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanwerkError {
    // -- Configuration errors --
    #[error("no processing stage is enabled")]
    NoStagesEnabled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    // -- Plan errors --
    #[error("could not load plan {}: {reason}", path.display())]
    PlanLoad { path: PathBuf, reason: String },

    #[error(
        "plan collections are misaligned: {files} files, {images} images, \
         {pages} pages, {disambiguation} disambiguation records"
    )]
    MisalignedPlan {
        files: usize,
        images: usize,
        pages: usize,
        disambiguation: usize,
    },

    #[error("could not write plan {}: {reason}", path.display())]
    PlanWrite { path: PathBuf, reason: String },

    // -- Partition errors --
    #[error("invalid shard count: {0}")]
    InvalidShardCount(usize),

    // -- Worker errors --
    #[error(
        "{} worker(s) failed: {}{}",
        failed.len(),
        describe_failures(failed),
        describe_interrupted(interrupted)
    )]
    WorkerFailure {
        failed: Vec<ShardFailure>,
        /// Ranges of shards that were stopped or never started.
        interrupted: Vec<ShardRange>,
    },

    #[error("run cancelled; unfinished page ranges: {}", describe_ranges(interrupted))]
    Cancelled { interrupted: Vec<ShardRange> },

    #[error("run timed out after {secs}s; unfinished page ranges: {}", describe_ranges(interrupted))]
    RunTimeout { secs: u64, interrupted: Vec<ShardRange> },

    // -- External tools --
    #[error("{tool} failed: {reason}")]
    ToolInvocation { tool: String, reason: String },

    // -- Cleanup --
    #[error("temporary directory cleanup failed: {0}")]
    Cleanup(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn describe_failures(failed: &[ShardFailure]) -> String {
    failed
        .iter()
        .map(|f| format!("{} {} ({})", f.shard, f.range, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_interrupted(interrupted: &[ShardRange]) -> String {
    if interrupted.is_empty() {
        return String::new();
    }
    format!("; unfinished page ranges: {}", describe_ranges(interrupted))
}

fn describe_ranges(ranges: &[ShardRange]) -> String {
    if ranges.is_empty() {
        return "none".into();
    }
    ranges
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanwerkError>;
