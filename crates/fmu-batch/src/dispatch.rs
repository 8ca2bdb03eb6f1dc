//! Batch dispatch of compile jobs onto scratch slots.
//!
//! Two strategies share the same job construction and failure handling:
//!
//! - [`Strategy::Waves`]: the index range is cut into consecutive windows of
//!   at most `parallelism` jobs. Job `j` of a window runs in slot `j`. A
//!   window starts only after every job of the previous one has finished.
//! - [`Strategy::Pool`]: one worker per slot pulls the next index from a
//!   shared queue until the queue is empty.
//!
//! Every job is its own process with its own exit status. After the first
//! failure no further job is started, and the run ends with
//! [`BatchError::Dispatch`] naming exactly the jobs that failed.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use crate::config::{RunConfig, Strategy};
use crate::error::{BatchError, Result};
use crate::layout::Layout;
use crate::runner::{CompileJob, JobRunner};

/// A window of jobs run concurrently, each in a distinct slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wave {
    pub number: usize,
    pub jobs: Vec<CompileJob>,
}

/// Why a job did not produce its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub index: u32,
    pub slot: usize,
    pub artifact: String,
    pub reason: String,
}

/// What a successful dispatch did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub strategy: Strategy,
    /// Waves executed; zero in pool mode.
    pub waves: usize,
    /// Completed model indices in completion order.
    pub completed: Vec<u32>,
}

/// Build the job for `index` running in `slot`.
pub fn compile_job(layout: &Layout<'_>, index: u32, slot: usize) -> CompileJob {
    CompileJob {
        index,
        slot,
        slot_name: layout.slot_name(slot),
        script_name: layout.script_file_name(index),
        artifact: layout.artifact_name(index),
    }
}

/// Partition the configured index range into windows of at most
/// `parallelism` jobs. The last window is shorter when the range length is
/// not a multiple of the parallelism.
pub fn plan_waves(config: &RunConfig) -> Vec<Wave> {
    let layout = Layout::new(config);
    let indices: Vec<u32> = config.indices().collect();
    indices
        .chunks(config.parallelism.max(1))
        .enumerate()
        .map(|(number, window)| Wave {
            number,
            jobs: window
                .iter()
                .enumerate()
                .map(|(slot, &index)| compile_job(&layout, index, slot))
                .collect(),
        })
        .collect()
}

/// Runs the compile jobs of one configuration through a [`JobRunner`].
pub struct Dispatcher<R> {
    config: Arc<RunConfig>,
    runner: Arc<R>,
}

impl<R: JobRunner + 'static> Dispatcher<R> {
    pub fn new(config: &RunConfig, runner: R) -> Self {
        Self {
            config: Arc::new(config.clone()),
            runner: Arc::new(runner),
        }
    }

    /// Run every job with the configured strategy.
    pub async fn dispatch(&self) -> Result<DispatchSummary> {
        match self.config.strategy {
            Strategy::Waves => self.run_waves().await,
            Strategy::Pool => self.run_pool().await,
        }
    }

    async fn run_waves(&self) -> Result<DispatchSummary> {
        let waves = plan_waves(&self.config);
        let total = waves.len();
        let mut completed = Vec::with_capacity(self.config.job_count());

        for wave in waves {
            info!(
                wave = wave.number,
                of = total,
                jobs = wave.jobs.len(),
                "starting wave"
            );

            let handles: Vec<_> = wave
                .jobs
                .into_iter()
                .map(|job| {
                    let handle = spawn_job(&self.runner, &job, self.verify_root());
                    (job, handle)
                })
                .collect();

            let mut failures = Vec::new();
            for (job, handle) in handles {
                match settle(&job, handle.await) {
                    Ok(()) => completed.push(job.index),
                    Err(failure) => failures.push(failure),
                }
            }

            if !failures.is_empty() {
                return Err(BatchError::Dispatch {
                    wave: Some(wave.number),
                    failures,
                });
            }
        }

        Ok(DispatchSummary {
            strategy: Strategy::Waves,
            waves: total,
            completed,
        })
    }

    async fn run_pool(&self) -> Result<DispatchSummary> {
        let queue: Arc<Mutex<VecDeque<u32>>> =
            Arc::new(Mutex::new(self.config.indices().collect()));
        let completed = Arc::new(Mutex::new(Vec::with_capacity(self.config.job_count())));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let workers = self.config.parallelism.min(self.config.job_count().max(1));
        info!(workers, jobs = self.config.job_count(), "starting worker pool");

        let mut handles = Vec::with_capacity(workers);
        for slot in 0..workers {
            let config = Arc::clone(&self.config);
            let runner = Arc::clone(&self.runner);
            let verify_root = self.verify_root();
            let queue = Arc::clone(&queue);
            let completed = Arc::clone(&completed);
            let failures = Arc::clone(&failures);
            let stop = Arc::clone(&stop);

            handles.push(tokio::spawn(async move {
                let layout = Layout::new(&config);
                while !stop.load(Ordering::SeqCst) {
                    let Some(index) = queue.lock().await.pop_front() else {
                        break;
                    };
                    let job = compile_job(&layout, index, slot);
                    let handle = spawn_job(&runner, &job, verify_root.clone());
                    match settle(&job, handle.await) {
                        Ok(()) => completed.lock().await.push(index),
                        Err(failure) => {
                            stop.store(true, Ordering::SeqCst);
                            failures.lock().await.push(failure);
                        }
                    }
                }
            }));
        }

        // Jobs run in tasks of their own, so a worker only ends early if
        // its own loop panics.
        for handle in handles {
            if let Err(join_error) = handle.await {
                if join_error.is_panic() {
                    std::panic::resume_unwind(join_error.into_panic());
                }
            }
        }

        let failures = std::mem::take(&mut *failures.lock().await);
        if !failures.is_empty() {
            let skipped = queue.lock().await.len();
            if skipped > 0 {
                warn!(skipped, "jobs not started after failure");
            }
            return Err(BatchError::Dispatch {
                wave: None,
                failures,
            });
        }

        let completed = std::mem::take(&mut *completed.lock().await);
        Ok(DispatchSummary {
            strategy: Strategy::Pool,
            waves: 0,
            completed,
        })
    }

    fn verify_root(&self) -> Option<PathBuf> {
        self.config
            .verify_artifacts
            .then(|| self.config.work_dir.clone())
    }
}

/// Start `job` on its own task.
fn spawn_job<R: JobRunner + 'static>(
    runner: &Arc<R>,
    job: &CompileJob,
    verify_root: Option<PathBuf>,
) -> JoinHandle<std::result::Result<(), JobFailure>> {
    let runner = Arc::clone(runner);
    let job = job.clone();
    tokio::spawn(async move { run_job(runner.as_ref(), &job, verify_root).await })
}

/// Outcome of a spawned job; a task that panicked counts as a failure of
/// the job it was running.
fn settle(
    job: &CompileJob,
    joined: std::result::Result<std::result::Result<(), JobFailure>, JoinError>,
) -> std::result::Result<(), JobFailure> {
    joined.unwrap_or_else(|join_error| {
        error!(index = job.index, slot = job.slot, "job task aborted: {join_error}");
        Err(JobFailure {
            index: job.index,
            slot: job.slot,
            artifact: job.artifact.clone(),
            reason: format!("job task aborted: {join_error}"),
        })
    })
}

/// Run one job and turn every kind of failure into a [`JobFailure`].
async fn run_job<R: JobRunner + ?Sized>(
    runner: &R,
    job: &CompileJob,
    verify_root: Option<PathBuf>,
) -> std::result::Result<(), JobFailure> {
    let failure = |reason: String| {
        error!(index = job.index, slot = job.slot, artifact = %job.artifact, "{}", reason);
        JobFailure {
            index: job.index,
            slot: job.slot,
            artifact: job.artifact.clone(),
            reason,
        }
    };

    let expected = verify_root.map(|root| root.join(&job.slot_name).join(&job.artifact));

    // A file left in the slot by an earlier run must not pass verification.
    if let Some(artifact) = &expected {
        match std::fs::remove_file(artifact) {
            Ok(()) => warn!(path = %artifact.display(), "removed stale artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(failure(format!(
                    "cannot clear {}: {e}",
                    artifact.display()
                )));
            }
        }
    }

    let outcome = runner.run(job).await.map_err(|e| failure(e.to_string()))?;

    if !outcome.success {
        let status = match outcome.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        let reason = if outcome.stderr_tail.is_empty() {
            status
        } else {
            format!("{status}: {}", outcome.stderr_tail)
        };
        return Err(failure(reason));
    }

    if let Some(artifact) = expected {
        if !artifact.is_file() {
            return Err(failure(format!(
                "compiler exited successfully but {} is missing",
                artifact.display()
            )));
        }
    }

    Ok(())
}
