//! Execution of a single compile job.
//!
//! The dispatcher never spawns processes itself; it hands [`CompileJob`]s to
//! a [`JobRunner`]. [`ProcessRunner`] is the real implementation, running the
//! helper script with `bash` so that the compiler executes inside the job's
//! scratch slot.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{BatchError, Result};

/// One model translation, pinned to one scratch slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileJob {
    /// Model index.
    pub index: u32,
    /// Scratch slot the job runs in.
    pub slot: usize,
    /// Slot directory name relative to the work dir, e.g. `th0`.
    pub slot_name: String,
    /// Compile script file name relative to the work dir.
    pub script_name: String,
    /// Artifact file name the compiler is expected to produce in the slot.
    pub artifact: String,
}

/// Completion status of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub success: bool,
    /// Last lines the job wrote to stderr.
    pub stderr_tail: String,
}

impl JobOutcome {
    pub fn succeeded() -> Self {
        Self {
            code: Some(0),
            success: true,
            stderr_tail: String::new(),
        }
    }

    pub fn failed(code: i32) -> Self {
        Self {
            code: Some(code),
            success: false,
            stderr_tail: String::new(),
        }
    }
}

/// Runs compile jobs. Implementations must be safe to call concurrently for
/// jobs in distinct slots.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &CompileJob) -> Result<JobOutcome>;
}

/// Runs jobs as `bash <helper> <slot> '<compiler> ../<script>'` from the
/// work directory.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    work_dir: PathBuf,
    helper: String,
    compiler: String,
}

impl ProcessRunner {
    pub fn new(work_dir: impl Into<PathBuf>, helper: impl Into<String>, compiler: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            helper: helper.into(),
            compiler: compiler.into(),
        }
    }

    /// The command evaluated inside the slot directory.
    pub fn slot_command(&self, job: &CompileJob) -> String {
        format!("{} ../{}", self.compiler, job.script_name)
    }

    /// The full command line, as it would be typed into a shell.
    pub fn command_line(&self, job: &CompileJob) -> String {
        format!(
            "bash {} {} '{}'",
            self.helper,
            job.slot_name,
            self.slot_command(job)
        )
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, job: &CompileJob) -> Result<JobOutcome> {
        let command_line = self.command_line(job);
        info!(index = job.index, slot = job.slot, "cmd: {}", command_line);

        let output = Command::new("bash")
            .arg(&self.helper)
            .arg(&job.slot_name)
            .arg(self.slot_command(job))
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| BatchError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!(index = job.index, "{}", line);
        }

        Ok(JobOutcome {
            code: output.status.code(),
            success: output.status.success(),
            stderr_tail: tail(&String::from_utf8_lossy(&output.stderr), 5),
        })
    }
}

/// Last `lines` lines of `text`, joined with newlines.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
