//! Run configuration.
//!
//! A [`RunConfig`] is built once (defaults, then an optional JSON file, then
//! command-line overrides), validated, and passed by reference to every stage
//! of the run. Nothing mutates it afterwards.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BatchError, Result};

static MODELICA_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

/// How compile jobs are scheduled onto the scratch slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Fixed windows of `parallelism` jobs, run one window after another.
    #[default]
    Waves,
    /// `parallelism` workers pulling indices from a shared queue.
    Pool,
}

/// Configuration for one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// First model index (inclusive).
    pub start: u32,
    /// Last model index (exclusive).
    pub end: u32,
    /// Number of compile jobs running at once, and number of scratch slots.
    pub parallelism: usize,
    /// Remove intermediates after a successful run.
    pub cleanup: bool,
    /// Passed verbatim to `setCommandLineOptions` in every compile script.
    pub compiler_flags: String,
    /// Folder (relative to `work_dir`) receiving the finished FMUs.
    pub output_folder: PathBuf,
    /// Directory in which every generated file and folder is placed.
    pub work_dir: PathBuf,
    /// Compiler command, evaluated by the helper script inside a slot.
    pub compiler: String,
    pub package_name: String,
    pub base_package: String,
    /// Library file loaded by every compile script, relative to `work_dir`.
    pub base_library_file: String,
    pub model_prefix: String,
    pub modelica_version: String,
    pub stop_time: f64,
    pub strategy: Strategy,
    /// Treat a zero exit status without an FMU in the slot as a failure.
    pub verify_artifacts: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start: 0,
            end: 2,
            parallelism: 2,
            cleanup: true,
            compiler_flags:
                "+simCodeTarget=Cpp +d=hpcom +n=2 +hpcomCode=openmp +hpcomScheduler=mcp"
                    .to_string(),
            output_folder: PathBuf::from("one_robot_fmus"),
            work_dir: PathBuf::from("."),
            compiler: "omc".to_string(),
            package_name: "hpcom_tmp".to_string(),
            base_package: "hpcom".to_string(),
            base_library_file: "hpcom.mo".to_string(),
            model_prefix: "fmu_one_robot".to_string(),
            modelica_version: "3.2.1".to_string(),
            stop_time: 1.0,
            strategy: Strategy::Waves,
            verify_artifacts: true,
        }
    }
}

impl RunConfig {
    /// Create a configuration for the index range `[start, end)` with all
    /// other settings at their defaults.
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(BatchError::io("read", path))?;
        serde_json::from_str(&text).map_err(|source| BatchError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn compiler_flags(mut self, flags: impl Into<String>) -> Self {
        self.compiler_flags = flags.into();
        self
    }

    pub fn output_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.output_folder = folder.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn verify_artifacts(mut self, verify: bool) -> Self {
        self.verify_artifacts = verify;
        self
    }

    /// The model indices covered by this run.
    pub fn indices(&self) -> Range<u32> {
        self.start..self.end
    }

    /// Number of compile jobs in this run.
    pub fn job_count(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    /// Check the configuration before anything touches the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(BatchError::InvalidConfig(format!(
                "end ({}) must be greater than start ({})",
                self.end, self.start
            )));
        }
        if self.parallelism == 0 {
            return Err(BatchError::InvalidConfig(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if self.compiler_flags.contains(['"', '\n', '\r']) {
            return Err(BatchError::InvalidConfig(
                "compiler_flags may not contain quotes or line breaks".to_string(),
            ));
        }
        if self.compiler.trim().is_empty() {
            return Err(BatchError::InvalidConfig("compiler is empty".to_string()));
        }
        // The compiler command is wrapped in single quotes for the helper script.
        if self.compiler.contains('\'') {
            return Err(BatchError::InvalidConfig(
                "compiler may not contain single quotes".to_string(),
            ));
        }
        for (field, value) in [
            ("package_name", &self.package_name),
            ("base_package", &self.base_package),
            ("model_prefix", &self.model_prefix),
        ] {
            if !MODELICA_IDENT.is_match(value) {
                return Err(BatchError::InvalidConfig(format!(
                    "{field} `{value}` is not a Modelica identifier"
                )));
            }
        }
        if !self.stop_time.is_finite() || self.stop_time <= 0.0 {
            return Err(BatchError::InvalidConfig(format!(
                "stop_time must be positive, got {}",
                self.stop_time
            )));
        }
        if self.output_folder.as_os_str().is_empty() {
            return Err(BatchError::InvalidConfig("output_folder is empty".to_string()));
        }
        Ok(())
    }
}
