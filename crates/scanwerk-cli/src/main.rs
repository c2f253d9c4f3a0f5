// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk — parallel ScanTailor processing for scanned books
//
// Entry point. Initialises logging, loads configuration, wires Ctrl-C to the
// workflow's cancel token, and dispatches the subcommand.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use scanwerk_core::WorkflowConfig;
use scanwerk_core::error::Result;
use scanwerk_core::human_errors::humanize_error;
use scanwerk_core::types::RunReport;
use scanwerk_plan::{ProcessingPlan, partition, persist_all};
use scanwerk_runner::stages::stage_range_for;
use scanwerk_runner::{CancelToken, Toolchain, Workflow};

#[derive(Parser)]
#[command(
    name = "scanwerk",
    version,
    about = "Run ScanTailor over a scanned book, one worker per CPU"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: scanwerk.toml in this or a parent directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, review, and output a scan directory (<DIR>/raw -> <DIR>/done)
    Process {
        dir: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Generate output images from an existing project file
    Output {
        plan: PathBuf,
        out_dir: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Write the sub-plans for a project without running any workers
    Split {
        plan: PathBuf,
        dest: PathBuf,
        /// Number of sub-plans (default: configured value or CPU count)
        #[arg(long)]
        shards: Option<usize>,
    },

    /// Print the filter range used for configuration generation
    Stages,
}

#[derive(Args)]
struct RunArgs {
    /// Skip manual adjustment in the ScanTailor GUI
    #[arg(long)]
    autopilot: bool,

    /// Number of sub-plans
    #[arg(long)]
    shards: Option<usize>,

    /// Maximum number of concurrently running workers
    #[arg(long)]
    max_workers: Option<usize>,

    /// Stop all workers after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut WorkflowConfig) {
        config.autopilot |= self.autopilot;
        if self.shards.is_some() {
            config.shards = self.shards;
        }
        if self.max_workers.is_some() {
            config.max_workers = self.max_workers;
        }
        if self.timeout.is_some() {
            config.run_timeout_secs = self.timeout;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "scanwerk failed");
            let human = humanize_error(&e);
            eprintln!("{}", human.message);
            eprintln!("  {}", human.suggestion);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Process { dir, run } => {
            run.apply(&mut config);
            config.validate()?;
            let workflow = Workflow::discover(config).await?;
            let cancel = cancel_on_ctrl_c();
            let report = workflow.run(&dir, &cancel).await?;
            finish(report, run.json)
        }
        Commands::Output { plan, out_dir, run } => {
            run.apply(&mut config);
            config.validate()?;
            // Output generation never opens the GUI.
            let toolchain = Toolchain::discover(&config.tools, false).await?;
            let workflow = Workflow::new(config, toolchain);
            let cancel = cancel_on_ctrl_c();
            let report = workflow.run_output(&plan, &out_dir, &cancel).await?;
            finish(report, run.json)
        }
        Commands::Split { plan, dest, shards } => {
            let shards = shards.or(config.shards).unwrap_or_else(num_cpus::get);
            let plan = ProcessingPlan::load(&plan)?;
            std::fs::create_dir_all(&dest)?;
            let tasks = persist_all(&partition(&plan, shards)?, &dest)?;
            for task in &tasks {
                println!("{}\t{}\t{}", task.shard, task.range, task.plan_path.display());
            }
            Ok(())
        }
        Commands::Stages => {
            let range = stage_range_for(&config.stages)?;
            println!(
                "--start-filter={} --end-filter={}",
                range.start_filter, range.end_filter
            );
            Ok(())
        }
    }
}

fn load_config(explicit: Option<&Path>) -> Result<WorkflowConfig> {
    if let Some(path) = explicit {
        info!(path = %path.display(), "loading configuration");
        return WorkflowConfig::from_toml_file(path);
    }
    let cwd = std::env::current_dir()?;
    Ok(WorkflowConfig::discover(&cwd)?.unwrap_or_default())
}

/// Cancel token that fires on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping workers");
            trigger.cancel();
        }
    });
    cancel
}

/// Print the report, then reconcile it into the command's result.
///
/// The report is printed even when some shards failed or were stopped.
fn finish(report: RunReport, json: bool) -> Result<()> {
    print_report(&report, json)?;
    report.into_result().map(drop)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        let elapsed = report.finished_at - report.started_at;
        println!(
            "{}: {} pages in {} shards, {:.1}s",
            report.plan_name,
            report.page_count,
            report.outcomes.len(),
            elapsed.num_milliseconds() as f64 / 1000.0
        );
        for outcome in report.outcomes.iter().filter(|o| !o.status.is_success()) {
            println!("  {} {}: {}", outcome.shard, outcome.range, outcome.status);
        }
    }
    Ok(())
}
