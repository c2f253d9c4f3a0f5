// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end processing workflow for one scan directory.
//
//   1. Generate the ScanTailor project for the enabled stages (skipped when
//      the project already exists).
//   2. Unless in autopilot, open the project in the GUI for correction.
//   3. Split the project into sub-plans, run one output worker per sub-plan
//      into the shared output directory, and remove the sub-plans again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use scanwerk_core::config::WorkflowConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{RunId, RunReport};
use scanwerk_plan::{PROJECT_EXTENSION, ProcessingPlan, partition, persist_all};

use crate::cancel::CancelToken;
use crate::generate::generate_configuration;
use crate::pool::{PoolOutcome, WorkerPool};
use crate::review::review_plan;
use crate::scratch::{ScratchSpace, ensure_output_dir};
use crate::toolchain::Toolchain;

/// Source images directory inside a scan directory.
pub const IMAGES_DIR: &str = "raw";
/// Output directory inside a scan directory.
pub const OUTPUT_DIR: &str = "done";

/// Where the project, source images, and output live for a scan directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    /// `<root>/<basename of root>.ScanTailor`
    pub plan: PathBuf,
    pub images: PathBuf,
    pub output: PathBuf,
}

impl ProjectLayout {
    pub fn for_directory(root: &Path) -> Result<Self> {
        let name = root.file_name().ok_or_else(|| {
            ScanwerkError::InvalidConfig(format!(
                "scan directory {} has no name",
                root.display()
            ))
        })?;
        let mut plan_name = name.to_os_string();
        plan_name.push(format!(".{PROJECT_EXTENSION}"));

        Ok(Self {
            root: root.to_path_buf(),
            plan: root.join(plan_name),
            images: root.join(IMAGES_DIR),
            output: root.join(OUTPUT_DIR),
        })
    }
}

/// A configured workflow bound to a resolved toolchain.
#[derive(Debug, Clone)]
pub struct Workflow {
    config: WorkflowConfig,
    toolchain: Toolchain,
}

impl Workflow {
    pub fn new(config: WorkflowConfig, toolchain: Toolchain) -> Self {
        Self { config, toolchain }
    }

    /// Validate `config` and locate the tools it needs.
    pub async fn discover(config: WorkflowConfig) -> Result<Self> {
        config.validate()?;
        let toolchain = Toolchain::discover(&config.tools, !config.autopilot).await?;
        Ok(Self::new(config, toolchain))
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Number of sub-plans to create: configured, else one per CPU.
    pub fn shard_count(&self) -> usize {
        self.config.shards.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Worker pool configured from the workflow settings.
    pub fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.toolchain.worker_command())
            .with_max_workers(self.config.max_workers.unwrap_or_else(|| self.shard_count()))
            .with_timeout(self.config.run_timeout_secs.map(Duration::from_secs))
    }

    /// Run the whole workflow over a scan directory.
    pub async fn process(&self, dir: &Path, cancel: &CancelToken) -> Result<RunReport> {
        self.run(dir, cancel).await?.into_result()
    }

    /// Like [`Workflow::process`], but hands back the report even when some
    /// shards failed or were stopped.
    ///
    /// Errors before the workers start are still returned as errors.
    #[instrument(skip_all, fields(dir = %dir.display(), autopilot = self.config.autopilot))]
    pub async fn run(&self, dir: &Path, cancel: &CancelToken) -> Result<RunReport> {
        let layout = ProjectLayout::for_directory(dir)?;

        generate_configuration(
            &self.toolchain,
            &self.config,
            &layout.plan,
            &layout.images,
            &layout.output,
            cancel,
        )
        .await?;

        if !self.config.autopilot {
            let gui = self.toolchain.gui.as_deref().ok_or_else(|| {
                ScanwerkError::MissingDependency(format!(
                    "`{}` is needed for manual adjustment",
                    self.config.tools.gui.display()
                ))
            })?;
            review_plan(gui, &layout.plan, cancel).await?;
        }

        info!("generating output images from ScanTailor configuration");
        self.run_output(&layout.plan, &layout.output, cancel).await
    }

    /// Split `plan_path` into sub-plans and process them in parallel into
    /// `out_dir`.
    pub async fn generate_output(
        &self,
        plan_path: &Path,
        out_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        self.run_output(plan_path, out_dir, cancel).await?.into_result()
    }

    /// Unreconciled form of [`Workflow::generate_output`].
    ///
    /// Sub-plans live in a scratch directory that is removed on every path
    /// out of this function.  A cleanup failure is logged and does not change
    /// the result.  If this future is dropped mid-run, the workers are killed
    /// before the scratch directory goes.
    #[instrument(skip_all, fields(plan = %plan_path.display(), out_dir = %out_dir.display()))]
    pub async fn run_output(
        &self,
        plan_path: &Path,
        out_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        let run_id = RunId::new();
        let started_at = Utc::now();

        ensure_output_dir(out_dir)?;
        let plan = ProcessingPlan::load(plan_path)?;
        let scratch = ScratchSpace::create(self.config.scratch_dir.as_deref())?;

        // The pending pool future owns every worker and is dropped ahead of
        // `scratch`.
        let pooled = self.run_shards(&plan, scratch.path(), out_dir, cancel).await;
        if let Err(e) = scratch.finalize() {
            warn!(error = %e, "scratch directory left behind");
        }
        let pooled = pooled?;

        let report = RunReport {
            run_id,
            plan_name: plan.name().to_string(),
            plan_digest: plan.digest().to_string(),
            page_count: plan.len(),
            started_at,
            finished_at: Utc::now(),
            timeout_secs: self.config.run_timeout_secs.filter(|_| pooled.timed_out),
            outcomes: pooled.outcomes,
        };
        info!(
            run_id = %report.run_id,
            pages = report.page_count,
            shards = report.outcomes.len(),
            success = report.is_success(),
            "output generation finished"
        );
        Ok(report)
    }

    async fn run_shards(
        &self,
        plan: &ProcessingPlan,
        scratch: &Path,
        out_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<PoolOutcome> {
        let subplans = partition(plan, self.shard_count())?;
        let tasks = persist_all(&subplans, scratch)?;
        Ok(self.pool().run_all(&tasks, out_dir, cancel).await)
    }
}
