// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Worker pool for ScanTailor output generation.
//
// One `scantailor-cli --start-filter=6 <sub-plan> <out-dir>` process runs per
// shard.  At most `max_workers` processes are alive at once.  The pool waits
// for every worker, records each exit status, and kills whatever is still
// running when the caller cancels or the run deadline passes.
//
// Workers are polled by `run_all` itself rather than spawned as tasks, so
// every `Child` is owned by the `run_all` future.  Dropping that future kills
// the workers on the spot through `kill_on_drop`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use scanwerk_core::types::{OUTPUT_STAGE, ShardOutcome, ShardStatus, ShardTask};

use crate::cancel::CancelToken;
use crate::process::describe;

// ---------------------------------------------------------------------------
// Worker command line
// ---------------------------------------------------------------------------

/// The executable (and fixed leading arguments) each worker runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    /// Arguments placed before the stage selector.
    pub leading_args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Run `tool` through a wrapper such as `nice -n 10`.
    ///
    /// An empty launcher runs `tool` directly.
    pub fn with_launcher(launcher: &[String], tool: &Path) -> Self {
        match launcher.split_first() {
            None => Self::new(tool),
            Some((wrapper, rest)) => Self {
                program: PathBuf::from(wrapper),
                leading_args: rest
                    .iter()
                    .map(OsString::from)
                    .chain(std::iter::once(tool.as_os_str().to_owned()))
                    .collect(),
            },
        }
    }

    /// Full argument list for one shard.
    pub fn args(&self, output_stage: u32, plan: &Path, out_dir: &Path) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.push(format!("--start-filter={output_stage}").into());
        args.push(plan.as_os_str().to_owned());
        args.push(out_dir.as_os_str().to_owned());
        args
    }

    fn build(&self, output_stage: u32, task: &ShardTask, out_dir: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.args(output_stage, &task.plan_path, out_dir))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Result of driving a set of shards to completion.
#[derive(Debug, Clone)]
pub struct PoolOutcome {
    /// One entry per task, in the order the tasks were given.
    pub outcomes: Vec<ShardOutcome>,
    /// Whether the run deadline cut the run short.
    pub timed_out: bool,
}

/// Bounded pool of external worker processes.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    command: WorkerCommand,
    output_stage: u32,
    max_workers: usize,
    timeout: Option<Duration>,
}

impl WorkerPool {
    /// Pool running `command` with one worker per CPU and no deadline.
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            output_stage: OUTPUT_STAGE,
            max_workers: num_cpus::get().max(1),
            timeout: None,
        }
    }

    /// Limit concurrently running workers (at least one).
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Kill all workers still running after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }

    /// Run one worker per task and wait until every one has terminated.
    ///
    /// A failing worker does not stop its siblings.  On cancellation or
    /// timeout, running workers are killed and reaped and queued ones never
    /// start; both are reported as [`ShardStatus::Cancelled`].
    #[instrument(skip_all, fields(shards = tasks.len(), max_workers = self.max_workers, out_dir = %out_dir.display()))]
    pub async fn run_all(&self, tasks: &[ShardTask], out_dir: &Path, cancel: &CancelToken) -> PoolOutcome {
        let permits = Semaphore::new(self.max_workers);
        let stop = CancelToken::new();
        let mut workers: FuturesUnordered<_> = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| {
                let command = self.command.build(self.output_stage, task, out_dir);
                let span = info_span!("worker", shard = %task.shard, range = %task.range);
                let (permits, stop) = (&permits, &stop);
                async move { (index, run_worker(command, task, permits, stop).await) }
                    .instrument(span)
            })
            .collect();
        info!("workers queued");

        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut outcomes: Vec<Option<ShardOutcome>> = vec![None; tasks.len()];
        let mut timed_out = false;
        loop {
            tokio::select! {
                finished = workers.next() => match finished {
                    Some((index, outcome)) => outcomes[index] = Some(outcome),
                    None => break,
                },
                _ = &mut deadline, if !stop.is_cancelled() => {
                    timed_out = true;
                    warn!(timeout = ?self.timeout, "run deadline reached, stopping workers");
                    stop.cancel();
                }
                _ = cancel.cancelled(), if !stop.is_cancelled() => {
                    info!("cancellation requested, stopping workers");
                    stop.cancel();
                }
            }
        }

        let outcomes: Vec<ShardOutcome> = outcomes
            .into_iter()
            .zip(tasks)
            .map(|(outcome, task)| {
                outcome.unwrap_or_else(|| ShardOutcome {
                    shard: task.shard,
                    range: task.range,
                    status: ShardStatus::Errored("worker finished without an outcome".into()),
                    elapsed_ms: 0,
                })
            })
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.status.is_success()).count();
        info!(succeeded, total = outcomes.len(), timed_out, "all workers finished");
        PoolOutcome { outcomes, timed_out }
    }
}

/// Drive one worker from queueing to exit.
async fn run_worker(
    mut command: Command,
    task: &ShardTask,
    permits: &Semaphore,
    stop: &CancelToken,
) -> ShardOutcome {
    let started = Instant::now();
    let finish = |status: ShardStatus| ShardOutcome {
        shard: task.shard,
        range: task.range,
        status,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    let permit = tokio::select! {
        biased;
        _ = stop.cancelled() => return finish(ShardStatus::Cancelled),
        permit = permits.acquire() => permit,
    };
    let _permit = match permit {
        Ok(permit) => permit,
        Err(e) => return finish(ShardStatus::Errored(format!("worker slot unavailable: {e}"))),
    };

    debug!(command = %describe(&command), "starting worker");
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "failed to start worker");
            return finish(ShardStatus::Errored(format!("failed to start worker: {e}")));
        }
    };

    let status = tokio::select! {
        waited = child.wait() => match waited {
            Ok(exit) if exit.success() => ShardStatus::Succeeded,
            Ok(exit) => ShardStatus::Exited { code: exit.code() },
            Err(e) => ShardStatus::Errored(format!("failed to wait for worker: {e}")),
        },
        _ = stop.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill worker");
            }
            ShardStatus::Cancelled
        }
    };

    let outcome = finish(status);
    match &outcome.status {
        ShardStatus::Succeeded => debug!(elapsed_ms = outcome.elapsed_ms, "worker succeeded"),
        ShardStatus::Cancelled => debug!("worker cancelled"),
        other => warn!(status = %other, "worker failed"),
    }
    outcome
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use scanwerk_core::types::{ShardId, ShardRange};
    use std::fs;

    /// A worker that runs `script` under `sh`.
    ///
    /// Inside the script `$1` is the stage selector, `$2` the sub-plan path
    /// and `$3` the output directory.
    fn shell_worker(script: &str) -> WorkerCommand {
        WorkerCommand {
            program: PathBuf::from("sh"),
            leading_args: vec!["-c".into(), script.into(), "scantailor-cli".into()],
        }
    }

    fn tasks(dir: &Path, count: usize, per_shard: usize) -> Vec<ShardTask> {
        (0..count)
            .map(|k| ShardTask {
                shard: ShardId(k),
                range: ShardRange::new(k * per_shard, (k + 1) * per_shard),
                plan_path: dir.join(format!("book-{k}.ScanTailor")),
            })
            .collect()
    }

    #[test]
    fn launcher_wraps_the_tool() {
        let launcher = vec!["nice".to_string(), "-n".to_string(), "10".to_string()];
        let command = WorkerCommand::with_launcher(&launcher, Path::new("scantailor-cli"));
        assert_eq!(command.program, PathBuf::from("nice"));
        let args = command.args(6, Path::new("/tmp/book-0.ScanTailor"), Path::new("/out"));
        assert_eq!(
            args,
            vec![
                OsString::from("-n"),
                OsString::from("10"),
                OsString::from("scantailor-cli"),
                OsString::from("--start-filter=6"),
                OsString::from("/tmp/book-0.ScanTailor"),
                OsString::from("/out"),
            ]
        );
    }

    #[test]
    fn empty_launcher_runs_tool_directly() {
        let command = WorkerCommand::with_launcher(&[], Path::new("scantailor-cli"));
        assert_eq!(command, WorkerCommand::new("scantailor-cli"));
    }

    #[test]
    fn max_workers_is_at_least_one() {
        let pool = WorkerPool::new(WorkerCommand::new("true")).with_max_workers(0);
        assert_eq!(pool.max_workers(), 1);
    }

    #[tokio::test]
    async fn every_worker_receives_output_stage_plan_and_out_dir() {
        let out = tempfile::tempdir().expect("tempdir");
        let plans = tempfile::tempdir().expect("tempdir");
        let pool = WorkerPool::new(shell_worker(
            r#"echo "$1" > "$3/$(basename "$2").args""#,
        ));
        let tasks = tasks(plans.path(), 3, 2);

        let result = pool.run_all(&tasks, out.path(), &CancelToken::new()).await;

        assert!(!result.timed_out);
        assert!(result.outcomes.iter().all(|o| o.status.is_success()));
        for k in 0..3 {
            let args = fs::read_to_string(out.path().join(format!("book-{k}.ScanTailor.args")))
                .expect("worker output");
            assert_eq!(args.trim(), "--start-filter=6");
        }
    }

    #[tokio::test]
    async fn one_failing_worker_is_named_and_siblings_finish() {
        let out = tempfile::tempdir().expect("tempdir");
        let plans = tempfile::tempdir().expect("tempdir");
        let pool = WorkerPool::new(shell_worker(
            r#"case "$2" in *-2.ScanTailor) exit 3;; esac; touch "$3/$(basename "$2").done""#,
        ));
        let tasks = tasks(plans.path(), 4, 3);

        let result = pool.run_all(&tasks, out.path(), &CancelToken::new()).await;

        let failed: Vec<&ShardOutcome> =
            result.outcomes.iter().filter(|o| o.status.is_failure()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].shard, ShardId(2));
        assert_eq!(failed[0].range, ShardRange::new(6, 9));
        assert_eq!(failed[0].status, ShardStatus::Exited { code: Some(3) });
        for k in [0, 1, 3] {
            assert!(out.path().join(format!("book-{k}.ScanTailor.done")).exists());
        }
    }

    #[tokio::test]
    async fn missing_program_is_reported_per_shard() {
        let out = tempfile::tempdir().expect("tempdir");
        let pool = WorkerPool::new(WorkerCommand::new("scanwerk-no-such-worker"));
        let tasks = tasks(out.path(), 2, 1);

        let result = pool.run_all(&tasks, out.path(), &CancelToken::new()).await;

        assert_eq!(result.outcomes.len(), 2);
        for outcome in &result.outcomes {
            assert!(matches!(outcome.status, ShardStatus::Errored(_)), "{outcome:?}");
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let out = tempfile::tempdir().expect("tempdir");
        let pool = WorkerPool::new(shell_worker(
            r#"echo start >> "$3/log"; sleep 0.1; echo end >> "$3/log""#,
        ))
        .with_max_workers(1);
        let tasks = tasks(out.path(), 3, 1);

        let result = pool.run_all(&tasks, out.path(), &CancelToken::new()).await;
        assert!(result.outcomes.iter().all(|o| o.status.is_success()));

        let log = fs::read_to_string(out.path().join("log")).expect("log");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines, vec!["start", "end", "start", "end", "start", "end"]);
    }

    #[tokio::test]
    async fn deadline_stops_running_workers() {
        let out = tempfile::tempdir().expect("tempdir");
        let pool = WorkerPool::new(shell_worker("exec sleep 30"))
            .with_timeout(Some(Duration::from_millis(200)));
        let tasks = tasks(out.path(), 2, 5);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            pool.run_all(&tasks, out.path(), &CancelToken::new()),
        )
        .await
        .expect("pool returned after its deadline");

        assert!(result.timed_out);
        assert!(result.outcomes.iter().all(|o| o.status == ShardStatus::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_kills_live_workers_and_skips_queued_ones() {
        let out = tempfile::tempdir().expect("tempdir");
        let pool = WorkerPool::new(shell_worker(
            r#"echo $$ > "$3/$(basename "$2").pid"; exec sleep 30"#,
        ))
        .with_max_workers(2);
        let tasks = tasks(out.path(), 3, 4);
        let cancel = CancelToken::new();

        let run = {
            let cancel = cancel.clone();
            let tasks = tasks.clone();
            let out_dir = out.path().to_path_buf();
            tokio::spawn(async move { pool.run_all(&tasks, &out_dir, &cancel).await })
        };

        // Wait until the two admitted workers have reported their pids.
        let mut pids = Vec::new();
        for _ in 0..200 {
            pids = (0..3)
                .filter_map(|k| {
                    fs::read_to_string(out.path().join(format!("book-{k}.ScanTailor.pid")))
                        .ok()
                        .and_then(|text| text.trim().parse::<u32>().ok())
                })
                .collect();
            if pids.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(pids.len(), 2, "workers did not start");

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("pool returned after cancellation")
            .expect("join");

        assert!(!result.timed_out);
        assert!(result.outcomes.iter().all(|o| o.status == ShardStatus::Cancelled));
        let started = (0..3)
            .filter(|k| out.path().join(format!("book-{k}.ScanTailor.pid")).exists())
            .count();
        assert_eq!(started, 2, "queued worker must not start after cancellation");

        // Killed workers are reaped, so their /proc entries are gone.
        for pid in pids {
            assert!(
                !Path::new(&format!("/proc/{pid}")).exists(),
                "worker {pid} still running"
            );
        }
    }

    /// Whether `pid` is alive and not yet a zombie.
    fn is_running(pid: u32) -> bool {
        match fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| !matches!(state, 'Z' | 'X')),
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn dropping_the_run_kills_live_workers() {
        let out = tempfile::tempdir().expect("tempdir");
        let pool = WorkerPool::new(shell_worker(
            r#"echo $$ > "$3/$(basename "$2").pid"; exec sleep 30"#,
        ))
        .with_max_workers(2);
        let tasks = tasks(out.path(), 2, 3);
        let cancel = CancelToken::new();

        let mut run = Box::pin(pool.run_all(&tasks, out.path(), &cancel));
        let mut pids = Vec::new();
        for _ in 0..200 {
            tokio::select! {
                finished = &mut run => panic!("workers exited early: {finished:?}"),
                _ = tokio::time::sleep(Duration::from_millis(25)) => {}
            }
            pids = (0..2)
                .filter_map(|k| {
                    fs::read_to_string(out.path().join(format!("book-{k}.ScanTailor.pid")))
                        .ok()
                        .and_then(|text| text.trim().parse::<u32>().ok())
                })
                .collect();
            if pids.len() == 2 {
                break;
            }
        }
        assert_eq!(pids.len(), 2, "workers did not start");

        drop(run);

        // SIGKILL has been sent by the time `drop` returns; give the kernel
        // a moment to act on it.
        for _ in 0..100 {
            if !pids.iter().any(|&pid| is_running(pid)) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        for pid in pids {
            assert!(!is_running(pid), "worker {pid} outlived the dropped run");
        }
    }

    #[tokio::test]
    async fn empty_task_list_finishes_immediately() {
        let out = tempfile::tempdir().expect("tempdir");
        let pool = WorkerPool::new(WorkerCommand::new("true"));
        let result = pool.run_all(&[], out.path(), &CancelToken::new()).await;
        assert!(result.outcomes.is_empty());
        assert!(!result.timed_out);
    }
}
