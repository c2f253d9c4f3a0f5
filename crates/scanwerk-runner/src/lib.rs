// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk Runner — stage selection, the ScanTailor worker pool, scratch
// space handling, and the end-to-end processing workflow.  This crate drives
// the external `scantailor-cli` / `scantailor` executables over plans
// produced by `scanwerk-plan`.

pub mod cancel;
pub mod generate;
pub mod pool;
mod process;
pub mod review;
pub mod scratch;
pub mod stages;
pub mod toolchain;
pub mod workflow;

pub use cancel::CancelToken;
pub use pool::{PoolOutcome, WorkerCommand, WorkerPool};
pub use scratch::ScratchSpace;
pub use stages::compute_stage_range;
pub use toolchain::{ToolCapabilities, Toolchain};
pub use workflow::{ProjectLayout, Workflow};
