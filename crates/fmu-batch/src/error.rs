//! Error types for batch rendering, dispatch and consolidation.

use std::path::PathBuf;

use thiserror::Error;

use crate::dispatch::JobFailure;

/// Result type for batch operations.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors that can occur during a batch run.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The run configuration was rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be parsed.
    #[error("failed to parse config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The run report could not be serialized.
    #[error("failed to serialize report: {0}")]
    Report(#[source] serde_json::Error),

    /// A filesystem operation failed.
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A template could not be rendered.
    #[error("render error: {0}")]
    Render(#[from] std::fmt::Error),

    /// The compiler process could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// One or more compile jobs failed; nothing after the failing wave ran.
    #[error("{}", describe_failures(.wave, .failures))]
    Dispatch {
        /// Wave in which the failures were observed; `None` in pool mode.
        wave: Option<usize>,
        failures: Vec<JobFailure>,
    },

    /// Two scratch slots hold an artifact of the same name.
    #[error("artifact {name} found in more than one scratch slot")]
    DuplicateArtifact { name: String },
}

impl BatchError {
    /// Attach the path and action to an I/O error.
    pub fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| BatchError::Io { action, path, source }
    }
}

fn describe_failures(wave: &Option<usize>, failures: &[JobFailure]) -> String {
    let names: Vec<String> = failures
        .iter()
        .map(|f| format!("{} ({})", f.artifact, f.reason))
        .collect();
    let location = match wave {
        Some(wave) => format!(" in wave {wave}"),
        None => String::new(),
    };
    format!(
        "error in creating {} fmu(s){}: {}",
        failures.len(),
        location,
        names.join(", ")
    )
}
