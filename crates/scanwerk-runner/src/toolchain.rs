// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Discovery of the ScanTailor executables and their capabilities.
//
// "Enhanced" ScanTailor builds accept a whole image directory and support
// page detection.  They are recognised by their usage text, which lists
// `<images|directory|->` on its eighth line.  The check runs once per
// workflow; the result is passed around by value.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument};

use scanwerk_core::config::ToolConfig;
use scanwerk_core::error::{Result, ScanwerkError};

use crate::pool::WorkerCommand;

const ENHANCED_USAGE_LINE: usize = 7;
const ENHANCED_USAGE_MARKER: &str = "<images|directory|->";

/// Resolve an executable the way a shell would.
///
/// Names containing a path separator are checked directly; bare names are
/// searched for on `PATH`.
pub fn find_in_path(program: &Path) -> Option<PathBuf> {
    match which::which(program) {
        Ok(found) => Some(found),
        Err(e) => {
            debug!(program = %program.display(), error = %e, "executable not found");
            None
        }
    }
}

/// What the installed `scantailor-cli` supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolCapabilities {
    pub enhanced: bool,
}

impl ToolCapabilities {
    /// Classify a build from the usage text it prints when run without
    /// arguments.
    pub fn from_usage(usage: &str) -> Self {
        let enhanced = usage
            .lines()
            .nth(ENHANCED_USAGE_LINE)
            .is_some_and(|line| line.contains(ENHANCED_USAGE_MARKER));
        Self { enhanced }
    }

    /// Run `cli` without arguments and classify its usage text.
    #[instrument(skip_all, fields(cli = %cli.display()))]
    pub async fn detect(cli: &Path) -> Result<Self> {
        let output = Command::new(cli)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                ScanwerkError::MissingDependency(format!("could not run {}: {e}", cli.display()))
            })?;
        // The usage screen usually comes with a non-zero exit status.
        let capabilities = Self::from_usage(&String::from_utf8_lossy(&output.stdout));
        debug!(enhanced = capabilities.enhanced, "checked scantailor-cli usage");
        Ok(capabilities)
    }
}

/// Resolved ScanTailor executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub cli: PathBuf,
    /// Only resolved when interactive review is wanted.
    pub gui: Option<PathBuf>,
    pub launcher: Vec<String>,
    pub capabilities: ToolCapabilities,
}

impl Toolchain {
    /// Build a toolchain from already-known paths, skipping discovery.
    pub fn new(cli: impl Into<PathBuf>, gui: Option<PathBuf>, capabilities: ToolCapabilities) -> Self {
        Self {
            cli: cli.into(),
            gui,
            launcher: Vec::new(),
            capabilities,
        }
    }

    /// Locate the executables named in `tools` and determine capabilities.
    ///
    /// The GUI is only required when `needs_gui` is set.  A configured
    /// `enhanced` value replaces the usage check.
    #[instrument(skip_all, fields(cli = %tools.cli.display(), needs_gui = needs_gui))]
    pub async fn discover(tools: &ToolConfig, needs_gui: bool) -> Result<Self> {
        let cli = find_in_path(&tools.cli).ok_or_else(|| {
            ScanwerkError::MissingDependency(format!(
                "could not find `{}` on PATH",
                tools.cli.display()
            ))
        })?;

        let gui = if needs_gui {
            let gui = find_in_path(&tools.gui).ok_or_else(|| {
                ScanwerkError::MissingDependency(format!(
                    "could not find `{}` on PATH",
                    tools.gui.display()
                ))
            })?;
            Some(gui)
        } else {
            None
        };

        let capabilities = match tools.enhanced {
            Some(enhanced) => ToolCapabilities { enhanced },
            None => ToolCapabilities::detect(&cli).await?,
        };

        info!(
            cli = %cli.display(),
            enhanced = capabilities.enhanced,
            "ScanTailor toolchain ready"
        );
        Ok(Self {
            cli,
            gui,
            launcher: tools.launcher.clone(),
            capabilities,
        })
    }

    /// Command line for output workers.
    pub fn worker_command(&self) -> WorkerCommand {
        WorkerCommand::with_launcher(&self.launcher, &self.cli)
    }
}
