/// Run report
///
/// A JSON summary of a finished run: the effective configuration, what the
/// dispatcher did and where the FMUs ended up.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::RunConfig;
use crate::dispatch::DispatchSummary;
use crate::error::{BatchError, Result};

/// Summary of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub config: RunConfig,
    /// Number of compile scripts rendered.
    pub jobs: usize,
    /// `None` when the run stopped after rendering.
    pub dispatch: Option<DispatchSummary>,
    /// Consolidated artifacts, sorted by file name.
    pub artifacts: Vec<PathBuf>,
    /// Whether intermediates were removed.
    pub cleaned_up: bool,
}

impl RunReport {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            config: config.clone(),
            jobs: config.job_count(),
            dispatch: None,
            artifacts: Vec::new(),
            cleaned_up: false,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(BatchError::Report)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(BatchError::io("write", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Strategy;

    #[test]
    fn test_report_json_shape() {
        let mut report = RunReport::new(&RunConfig::new(0, 4).parallelism(2));
        report.dispatch = Some(DispatchSummary {
            strategy: Strategy::Waves,
            waves: 2,
            completed: vec![0, 1, 2, 3],
        });
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["jobs"], 4);
        assert_eq!(value["dispatch"]["strategy"], "waves");
        assert_eq!(value["dispatch"]["waves"], 2);
        assert_eq!(value["config"]["parallelism"], 2);
    }
}
