//! File and directory names used by a batch run.
//!
//! Everything lives under the configured work directory:
//!
//! ```text
//! <work_dir>/
//!   hpcom_tmp.mo                 model package
//!   fmu_one_robot_tmp<i>.mos     one compile script per index
//!   cd1_eval2.sh                 helper: cd into $1, eval $2
//!   th<k>/                       scratch slot per parallel job
//!   tmp/tmp<i>/                  staging directory per FMU
//!   one_robot_fmus/              consolidated FMUs
//! ```

use std::path::{Path, PathBuf};

use crate::config::RunConfig;

/// Name of the helper script that runs a command inside a slot directory.
pub const HELPER_SCRIPT: &str = "cd1_eval2.sh";

/// Extension of the packaged simulation units the compiler produces.
pub const ARTIFACT_EXTENSION: &str = "fmu";

const SLOT_PREFIX: &str = "th";
const STAGING_DIR: &str = "tmp";

/// Resolves every generated path for one configuration.
#[derive(Debug, Clone)]
pub struct Layout<'a> {
    config: &'a RunConfig,
}

impl<'a> Layout<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    pub fn work_dir(&self) -> &Path {
        &self.config.work_dir
    }

    /// Fully qualified model name, e.g. `fmu_one_robot3`.
    pub fn model_name(&self, index: u32) -> String {
        format!("{}{}", self.config.model_prefix, index)
    }

    pub fn package_file_name(&self) -> String {
        format!("{}.mo", self.config.package_name)
    }

    pub fn package_path(&self) -> PathBuf {
        self.work_dir().join(self.package_file_name())
    }

    pub fn script_file_name(&self, index: u32) -> String {
        format!("{}_tmp{}.mos", self.config.model_prefix, index)
    }

    pub fn script_path(&self, index: u32) -> PathBuf {
        self.work_dir().join(self.script_file_name(index))
    }

    pub fn helper_path(&self) -> PathBuf {
        self.work_dir().join(HELPER_SCRIPT)
    }

    /// Slot directory name relative to the work dir, e.g. `th0`.
    pub fn slot_name(&self, slot: usize) -> String {
        format!("{SLOT_PREFIX}{slot}")
    }

    pub fn slot_dir(&self, slot: usize) -> PathBuf {
        self.work_dir().join(self.slot_name(slot))
    }

    pub fn slot_dirs(&self) -> Vec<PathBuf> {
        (0..self.config.parallelism).map(|slot| self.slot_dir(slot)).collect()
    }

    /// File name the compiler gives the FMU of `index`.
    ///
    /// The compiler replaces the dots of the qualified class name with
    /// underscores, so `hpcom_tmp.fmu_one_robot3` becomes
    /// `hpcom_tmp_fmu_one_robot3.fmu`.
    pub fn artifact_name(&self, index: u32) -> String {
        format!(
            "{}_{}.{}",
            self.config.package_name,
            self.model_name(index),
            ARTIFACT_EXTENSION
        )
    }

    pub fn artifact_in_slot(&self, slot: usize, index: u32) -> PathBuf {
        self.slot_dir(slot).join(self.artifact_name(index))
    }

    pub fn staging_root(&self) -> PathBuf {
        self.work_dir().join(STAGING_DIR)
    }

    pub fn staging_dir(&self, index: u32) -> PathBuf {
        self.staging_root().join(format!("{STAGING_DIR}{index}"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.work_dir().join(&self.config.output_folder)
    }

    /// Every file the renderer writes, in write order.
    pub fn intermediate_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.package_path(), self.helper_path()];
        files.extend(self.config.indices().map(|i| self.script_path(i)));
        files
    }
}
