//! Run driver: render, dispatch, consolidate, clean up.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::codegen::{RenderedBatch, Renderer};
use crate::collect;
use crate::config::RunConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::layout::{HELPER_SCRIPT, Layout};
use crate::report::RunReport;
use crate::runner::{JobRunner, ProcessRunner};

/// One batch run over a fixed configuration.
pub struct BatchRun {
    config: RunConfig,
    render_only: bool,
}

impl BatchRun {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            render_only: false,
        }
    }

    /// Stop after the generated files are written.
    pub fn render_only(mut self, render_only: bool) -> Self {
        self.render_only = render_only;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Render every file and write it into the work directory.
    pub fn render(&self) -> Result<RenderedBatch> {
        let batch = Renderer::new(&self.config).render_all()?;
        batch.write_to_disk()?;
        info!(
            package = %batch.package.path.display(),
            scripts = batch.scripts.len(),
            "rendered batch"
        );
        Ok(batch)
    }

    /// Run the batch, invoking the configured compiler.
    pub async fn run(&self) -> Result<RunReport> {
        let runner = ProcessRunner::new(
            self.config.work_dir.clone(),
            HELPER_SCRIPT,
            self.config.compiler.clone(),
        );
        self.run_with(runner).await
    }

    /// Run the batch with a custom job runner.
    ///
    /// A dispatch failure returns immediately: no staging, consolidation or
    /// cleanup happens, and every generated file stays in place.
    pub async fn run_with<R: JobRunner + 'static>(&self, runner: R) -> Result<RunReport> {
        self.config.validate()?;
        let layout = Layout::new(&self.config);
        let mut report = RunReport::new(&self.config);

        self.render()?;
        if self.render_only {
            return Ok(report);
        }

        collect::create_scratch_slots(&layout)?;
        let summary = Dispatcher::new(&self.config, runner).dispatch().await?;
        report.dispatch = Some(summary);

        collect::create_staging_tree(&layout, self.config.indices())?;
        report.artifacts = collect::consolidate(&layout)?;
        self.warn_missing(&layout, &report);

        if self.config.cleanup {
            collect::cleanup(&layout)?;
            report.cleaned_up = true;
        }

        info!(
            artifacts = report.artifacts.len(),
            output = %layout.output_dir().display(),
            "batch complete"
        );
        Ok(report)
    }

    fn warn_missing(&self, layout: &Layout<'_>, report: &RunReport) {
        let moved: HashSet<String> = report
            .artifacts
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        for index in self.config.indices() {
            let name = layout.artifact_name(index);
            if !moved.contains(&name) {
                warn!(index, artifact = %name, "expected artifact not found");
            }
        }
    }
}
