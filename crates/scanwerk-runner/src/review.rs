// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Interactive review in the ScanTailor GUI.

use std::path::Path;

use tokio::process::Command;
use tracing::{info, instrument};

use scanwerk_core::error::Result;
use scanwerk_plan::fingerprint_file;

use crate::cancel::CancelToken;
use crate::process::run_tool;

/// Open `plan` in the GUI and wait until the user closes it.
///
/// Returns whether the project file changed during the session.
#[instrument(skip_all, fields(plan = %plan.display()))]
pub async fn review_plan(gui: &Path, plan: &Path, cancel: &CancelToken) -> Result<bool> {
    let before = fingerprint_file(plan)?;
    info!("opening ScanTailor for manual adjustment");

    let mut command = Command::new(gui);
    command.arg(plan);
    run_tool("scantailor", command, cancel).await?;

    let changed = fingerprint_file(plan)? != before;
    info!(changed, "manual adjustment finished");
    Ok(changed)
}
