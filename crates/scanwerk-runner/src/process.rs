// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Running a single external tool to completion under a cancel token.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use scanwerk_core::error::{Result, ScanwerkError};

use crate::cancel::CancelToken;

/// Render a command line for log output.
pub(crate) fn describe(command: &Command) -> String {
    let std = command.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Spawn `command` and wait for it to exit successfully.
///
/// The child is killed and reaped if `cancel` fires first, which yields a
/// `Cancelled` error with no page ranges attached.
pub(crate) async fn run_tool(tool: &str, mut command: Command, cancel: &CancelToken) -> Result<()> {
    command.stdin(Stdio::null()).kill_on_drop(true);
    debug!(command = %describe(&command), "launching {tool}");

    let mut child = command.spawn().map_err(|e| ScanwerkError::ToolInvocation {
        tool: tool.to_string(),
        reason: format!("failed to start: {e}"),
    })?;

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| ScanwerkError::ToolInvocation {
                tool: tool.to_string(),
                reason: format!("failed to wait: {e}"),
            })?;
            if status.success() {
                Ok(())
            } else {
                Err(ScanwerkError::ToolInvocation {
                    tool: tool.to_string(),
                    reason: format!("exited with {status}"),
                })
            }
        }
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill {tool}");
            }
            Err(ScanwerkError::Cancelled { interrupted: Vec::new() })
        }
    }
}
