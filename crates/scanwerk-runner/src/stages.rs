// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stage selection for the non-interactive configuration pass.
//
// ScanTailor numbers its filters from 1, so the first configurable stage in
// the flag list is filter 1.  The end filter is one past the last enabled
// flag's 1-based position.

use scanwerk_core::config::StageConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::StageRange;

/// Derive the inclusive filter range from per-stage enable flags.
///
/// Flags are given in pipeline order.  Fails with
/// [`ScanwerkError::NoStagesEnabled`] when no flag is set.
pub fn compute_stage_range(flags: &[bool]) -> Result<StageRange> {
    let first = flags
        .iter()
        .position(|&enabled| enabled)
        .ok_or(ScanwerkError::NoStagesEnabled)?;
    let from_end = flags
        .iter()
        .rev()
        .position(|&enabled| enabled)
        .ok_or(ScanwerkError::NoStagesEnabled)?;

    Ok(StageRange {
        start_filter: (first + 1) as u32,
        end_filter: (flags.len() - from_end + 1) as u32,
    })
}

/// Stage range for the toggles in a workflow configuration.
pub fn stage_range_for(stages: &StageConfig) -> Result<StageRange> {
    compute_stage_range(&stages.flags())
}
