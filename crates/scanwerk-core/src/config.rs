// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Workflow configuration.
//
// Every field has a default, so an empty `scanwerk.toml` (or none at all) is a
// valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanwerkError};
use crate::types::{DetectionMode, Margins};

/// File name looked up by [`WorkflowConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "scanwerk.toml";

/// Settings for one scan-processing workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Skip interactive correction in the GUI.
    pub autopilot: bool,
    /// Which ScanTailor filters run during configuration generation.
    pub stages: StageConfig,
    /// How the page area is detected.
    pub detection: DetectionMode,
    /// Force page detection regardless of `detection`.
    pub page_detection: bool,
    /// Margins applied when page detection is not used.
    pub margins: Margins,
    /// Resolution of the source images.
    pub dpi: u32,
    /// ScanTailor layout hint passed as `--layout`.
    pub layout: String,
    /// Number of sub-plans; defaults to the CPU count.
    pub shards: Option<usize>,
    /// Upper bound on concurrently running workers; defaults to `shards`.
    pub max_workers: Option<usize>,
    /// Abort output generation after this many seconds.
    pub run_timeout_secs: Option<u64>,
    /// Parent for the per-run scratch directory; defaults to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    /// External executables.
    pub tools: ToolConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            autopilot: false,
            stages: StageConfig::default(),
            detection: DetectionMode::Content,
            page_detection: false,
            margins: Margins::default(),
            dpi: 300,
            layout: "1.5".into(),
            shards: None,
            max_workers: None,
            run_timeout_secs: None,
            scratch_dir: None,
            tools: ToolConfig::default(),
        }
    }
}

/// ScanTailor filter toggles, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub rotate: bool,
    pub split_pages: bool,
    pub deskew: bool,
    pub content: bool,
    pub auto_margins: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            rotate: false,
            split_pages: true,
            deskew: true,
            content: true,
            auto_margins: true,
        }
    }
}

impl StageConfig {
    /// Flags in the order ScanTailor numbers its filters.
    pub fn flags(&self) -> [bool; 5] {
        [
            self.rotate,
            self.split_pages,
            self.deskew,
            self.content,
            self.auto_margins,
        ]
    }
}

/// Locations of the external ScanTailor executables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Batch tool used for generation and output.
    pub cli: PathBuf,
    /// Interactive tool used for manual correction.
    pub gui: PathBuf,
    /// Optional command prefix for every worker, e.g. `["nice", "-n", "10"]`.
    pub launcher: Vec<String>,
    /// Whether the CLI is an "enhanced" build; detected when unset.
    pub enhanced: Option<bool>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            cli: PathBuf::from("scantailor-cli"),
            gui: PathBuf::from("scantailor"),
            launcher: Vec::new(),
            enhanced: None,
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanwerkError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            ScanwerkError::InvalidConfig(format!("invalid TOML in {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Look for `scanwerk.toml` in `start` and its ancestors.
    pub fn discover(start: impl AsRef<Path>) -> Result<Option<Self>> {
        let mut current = Some(start.as_ref());
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Self::from_toml_file(candidate).map(Some);
            }
            current = dir.parent();
        }
        Ok(None)
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.shards == Some(0) {
            return Err(ScanwerkError::InvalidConfig("shards must be at least 1".into()));
        }
        if self.max_workers == Some(0) {
            return Err(ScanwerkError::InvalidConfig(
                "max_workers must be at least 1".into(),
            ));
        }
        if self.dpi == 0 {
            return Err(ScanwerkError::InvalidConfig("dpi must be positive".into()));
        }
        let m = self.margins;
        if [m.top, m.right, m.bottom, m.left]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ScanwerkError::InvalidConfig(
                "margins must be non-negative numbers".into(),
            ));
        }
        if self.tools.launcher.iter().any(|arg| arg.is_empty()) {
            return Err(ScanwerkError::InvalidConfig(
                "launcher arguments must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Whether page detection replaces fixed margins.
    pub fn wants_page_detection(&self) -> bool {
        self.detection == DetectionMode::Page || self.page_detection
    }
}
