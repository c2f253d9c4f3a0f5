// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Non-interactive configuration pass: runs `scantailor-cli` over the source
// images for the enabled stage range and writes the project file that is
// later partitioned for output generation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{info, instrument};

use scanwerk_core::config::WorkflowConfig;
use scanwerk_core::error::Result;
use scanwerk_core::types::StageRange;

use crate::cancel::CancelToken;
use crate::process::run_tool;
use crate::scratch::ensure_output_dir;
use crate::stages::stage_range_for;
use crate::toolchain::{ToolCapabilities, Toolchain};

/// Inputs handed to `scantailor-cli`.
///
/// Enhanced builds take the directory itself; other builds need every image
/// listed, which is done in file-name order.
pub fn image_inputs(image_dir: &Path, capabilities: ToolCapabilities) -> Result<Vec<PathBuf>> {
    if capabilities.enhanced {
        return Ok(vec![image_dir.to_path_buf()]);
    }
    let mut images = Vec::new();
    for entry in std::fs::read_dir(image_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            images.push(entry.path());
        }
    }
    images.sort();
    Ok(images)
}

/// Argument list for the configuration pass.
pub fn generation_args(
    config: &WorkflowConfig,
    stages: StageRange,
    capabilities: ToolCapabilities,
    plan: &Path,
    inputs: &[PathBuf],
    out_dir: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        format!("--start-filter={}", stages.start_filter).into(),
        format!("--end-filter={}", stages.end_filter).into(),
        format!("--layout={}", config.layout).into(),
        format!("--dpi={}", config.dpi).into(),
    ];
    let mut output = OsString::from("-o=");
    output.push(plan);
    args.push(output);

    if capabilities.enhanced && config.wants_page_detection() {
        args.extend(
            [
                "--enable-page-detection",
                "--disable-content-detection",
                "--enable-fine-tuning",
            ]
            .map(OsString::from),
        );
    } else {
        let m = config.margins;
        args.extend([
            format!("--margins-top={}", m.top).into(),
            format!("--margins-right={}", m.right).into(),
            format!("--margins-bottom={}", m.bottom).into(),
            format!("--margins-left={}", m.left).into(),
        ]);
    }

    args.extend(inputs.iter().map(|p| p.as_os_str().to_owned()));
    args.push(out_dir.as_os_str().to_owned());
    args
}

/// Generate the project file at `plan` unless it already exists.
///
/// Returns whether the tool was run.
#[instrument(skip_all, fields(plan = %plan.display(), images = %image_dir.display()))]
pub async fn generate_configuration(
    toolchain: &Toolchain,
    config: &WorkflowConfig,
    plan: &Path,
    image_dir: &Path,
    out_dir: &Path,
    cancel: &CancelToken,
) -> Result<bool> {
    if plan.exists() {
        info!("project file exists, skipping configuration pass");
        return Ok(false);
    }

    let stages = stage_range_for(&config.stages)?;
    ensure_output_dir(out_dir)?;
    let inputs = image_inputs(image_dir, toolchain.capabilities)?;
    info!(
        start_filter = stages.start_filter,
        end_filter = stages.end_filter,
        inputs = inputs.len(),
        "generating ScanTailor configuration"
    );

    let mut command = Command::new(&toolchain.cli);
    command.args(generation_args(
        config,
        stages,
        toolchain.capabilities,
        plan,
        &inputs,
        out_dir,
    ));
    run_tool("scantailor-cli", command, cancel).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_core::types::{DetectionMode, Margins};
    use std::fs;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    const PLAIN: ToolCapabilities = ToolCapabilities { enhanced: false };
    const ENHANCED: ToolCapabilities = ToolCapabilities { enhanced: true };

    #[test]
    fn plain_build_lists_images_and_margins() {
        let config = WorkflowConfig {
            margins: Margins::from([1.0, 2.5, 3.0, 4.0]),
            ..Default::default()
        };
        let stages = StageRange { start_filter: 2, end_filter: 6 };
        let inputs = vec![PathBuf::from("/b/raw/001.jpg"), PathBuf::from("/b/raw/002.jpg")];
        let args = generation_args(
            &config,
            stages,
            PLAIN,
            Path::new("/b/b.ScanTailor"),
            &inputs,
            Path::new("/b/done"),
        );
        assert_eq!(
            strings(&args),
            vec![
                "--start-filter=2",
                "--end-filter=6",
                "--layout=1.5",
                "--dpi=300",
                "-o=/b/b.ScanTailor",
                "--margins-top=1",
                "--margins-right=2.5",
                "--margins-bottom=3",
                "--margins-left=4",
                "/b/raw/001.jpg",
                "/b/raw/002.jpg",
                "/b/done",
            ]
        );
    }

    #[test]
    fn enhanced_build_with_page_detection() {
        let config = WorkflowConfig {
            detection: DetectionMode::Page,
            dpi: 600,
            ..Default::default()
        };
        let stages = StageRange { start_filter: 1, end_filter: 2 };
        let args = generation_args(
            &config,
            stages,
            ENHANCED,
            Path::new("p.ScanTailor"),
            &[PathBuf::from("raw")],
            Path::new("done"),
        );
        let args = strings(&args);
        assert_eq!(args[3], "--dpi=600");
        assert_eq!(
            &args[5..8],
            ["--enable-page-detection", "--disable-content-detection", "--enable-fine-tuning"]
        );
        assert_eq!(&args[8..], ["raw", "done"]);
    }

    #[test]
    fn page_detection_needs_an_enhanced_build() {
        let config = WorkflowConfig {
            page_detection: true,
            ..Default::default()
        };
        let stages = StageRange { start_filter: 2, end_filter: 6 };
        let args = strings(&generation_args(
            &config,
            stages,
            PLAIN,
            Path::new("p"),
            &[],
            Path::new("done"),
        ));
        assert!(args.iter().any(|a| a.starts_with("--margins-top=")));
        assert!(!args.iter().any(|a| a == "--enable-page-detection"));
    }

    #[test]
    fn plain_inputs_are_sorted_files_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["003.jpg", "001.jpg", "002.jpg"] {
            fs::write(dir.path().join(name), b"jpeg").expect("write");
        }
        fs::create_dir(dir.path().join("thumbs")).expect("mkdir");

        let inputs = image_inputs(dir.path(), PLAIN).expect("inputs");
        let names: Vec<_> = inputs
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["001.jpg", "002.jpg", "003.jpg"]);

        assert_eq!(
            image_inputs(dir.path(), ENHANCED).expect("inputs"),
            vec![dir.path().to_path_buf()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn existing_plan_is_not_regenerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plan = dir.path().join("book.ScanTailor");
        fs::write(&plan, "<project/>").expect("write");
        let toolchain = Toolchain::new("false", None, PLAIN);

        let generated = generate_configuration(
            &toolchain,
            &WorkflowConfig::default(),
            &plan,
            &dir.path().join("raw"),
            &dir.path().join("done"),
            &CancelToken::new(),
        )
        .await
        .expect("skipped");
        assert!(!generated);
        assert!(!dir.path().join("done").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_tool_is_reported_after_creating_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("raw")).expect("mkdir");
        let toolchain = Toolchain::new("false", None, PLAIN);

        let result = generate_configuration(
            &toolchain,
            &WorkflowConfig::default(),
            &dir.path().join("book.ScanTailor"),
            &dir.path().join("raw"),
            &dir.path().join("done"),
            &CancelToken::new(),
        )
        .await;
        assert!(matches!(
            result,
            Err(scanwerk_core::ScanwerkError::ToolInvocation { .. })
        ));
        assert!(dir.path().join("done").is_dir());
    }

    #[tokio::test]
    async fn disabled_stages_fail_before_running_anything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = WorkflowConfig::default();
        config.stages.split_pages = false;
        config.stages.deskew = false;
        config.stages.content = false;
        config.stages.auto_margins = false;
        let toolchain = Toolchain::new("scanwerk-no-such-cli", None, PLAIN);

        let result = generate_configuration(
            &toolchain,
            &config,
            &dir.path().join("book.ScanTailor"),
            &dir.path().join("raw"),
            &dir.path().join("done"),
            &CancelToken::new(),
        )
        .await;
        assert!(matches!(
            result,
            Err(scanwerk_core::ScanwerkError::NoStagesEnabled)
        ));
        assert!(!dir.path().join("done").exists());
    }
}
