// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for people digitising books, not debugging
// ScanTailor.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity decides whether re-running the same command can help.

use crate::error::ScanwerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Interrupted or flaky; running the command again may succeed.
    Transient,
    /// User must do something first (install a tool, fix a setting).
    ActionRequired,
    /// The input itself is broken; retrying will not help.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether re-running is worth a try.
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: impl Into<String>, suggestion: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable: severity == Severity::Transient,
            severity,
        }
    }
}

/// Convert a `ScanwerkError` into a `HumanError`.
pub fn humanize_error(err: &ScanwerkError) -> HumanError {
    match err {
        // -- Configuration --
        ScanwerkError::NoStagesEnabled => HumanError::new(
            "Every processing step is switched off.",
            "Enable at least one of rotate, split_pages, deskew, content or auto_margins \
             in the [stages] section of scanwerk.toml.",
            Severity::ActionRequired,
        ),

        ScanwerkError::InvalidConfig(detail) => HumanError::new(
            "The configuration file has a problem.",
            format!("Fix the setting and try again. ({detail})"),
            Severity::ActionRequired,
        ),

        ScanwerkError::MissingDependency(detail) => HumanError::new(
            "A required program is not installed.",
            format!("Install ScanTailor and make sure it is on your PATH. ({detail})"),
            Severity::ActionRequired,
        ),

        // -- Plan --
        ScanwerkError::PlanLoad { path, reason } => HumanError::new(
            "The ScanTailor project could not be read.",
            format!(
                "Check that {} exists and was saved by ScanTailor. ({reason})",
                path.display()
            ),
            Severity::Permanent,
        ),

        ScanwerkError::MisalignedPlan { .. } => HumanError::new(
            "The ScanTailor project is inconsistent.",
            "Delete the project file and let Scanwerk generate a fresh one.",
            Severity::Permanent,
        ),

        ScanwerkError::PlanWrite { path, .. } => HumanError::new(
            "A temporary project file could not be written.",
            format!(
                "Make sure there is free disk space near {}.",
                path.display()
            ),
            Severity::ActionRequired,
        ),

        ScanwerkError::InvalidShardCount(count) => HumanError::new(
            "The number of parallel jobs is invalid.",
            format!("Use at least one job (got {count})."),
            Severity::ActionRequired,
        ),

        // -- Workers --
        ScanwerkError::WorkerFailure {
            failed,
            interrupted,
        } => {
            let pages = failed
                .iter()
                .map(|f| f.range.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let mut suggestion = format!(
                "Open the project in ScanTailor to check pages {pages}, then run the \
                 output step again."
            );
            if interrupted.is_empty() {
                suggestion.insert_str(0, "The other pages are finished. ");
            } else {
                let stopped = interrupted
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                suggestion.push_str(&format!(" Pages {stopped} were not finished either."));
            }
            HumanError::new("Some pages could not be processed.", suggestion, Severity::Transient)
        }

        ScanwerkError::Cancelled { .. } => HumanError::new(
            "Processing was stopped before it finished.",
            "Run the command again to finish the remaining pages.",
            Severity::Transient,
        ),

        ScanwerkError::RunTimeout { secs, .. } => HumanError::new(
            "Processing took too long and was stopped.",
            format!("Raise run_timeout_secs above {secs} or use fewer pages per run."),
            Severity::Transient,
        ),

        // -- External tools --
        ScanwerkError::ToolInvocation { tool, reason } => HumanError::new(
            format!("{tool} reported an error."),
            format!("Check the messages above from {tool}. ({reason})"),
            Severity::Transient,
        ),

        ScanwerkError::Cleanup(detail) => HumanError::new(
            "Temporary files could not be removed.",
            format!("You can delete them by hand. ({detail})"),
            Severity::Transient,
        ),

        ScanwerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError::new(
                "A file or folder is missing.",
                format!("Check the path you gave. ({io_err})"),
                Severity::ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => HumanError::new(
                "Scanwerk is not allowed to access a file.",
                format!("Check the folder permissions. ({io_err})"),
                Severity::ActionRequired,
            ),
            _ => HumanError::new(
                "Reading or writing a file failed.",
                format!("Try again. ({io_err})"),
                Severity::Transient,
            ),
        },

        ScanwerkError::Serialization(detail) => HumanError::new(
            "The run report could not be written.",
            format!("This is a bug; please report it. ({detail})"),
            Severity::Permanent,
        ),
    }
}
