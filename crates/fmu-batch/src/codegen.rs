/// Template rendering
///
/// Produces the model package, one compile script per model index and the
/// helper script. Rendering is pure string substitution; nothing touches the
/// filesystem until [`RenderedBatch::write_to_disk`].

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::RunConfig;
use crate::error::{BatchError, Result};
use crate::layout::Layout;
use crate::templates;

static MODEL_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*model\s+([A-Za-z_][A-Za-z0-9_]*)\s*$").expect("model regex")
});

/// A generated text file and where it goes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub contents: String,
}

/// A compile script for a single model index.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileScript {
    pub index: u32,
    pub file: RenderedFile,
}

/// Everything the renderer produces for one run.
#[derive(Debug, Clone)]
pub struct RenderedBatch {
    pub package: RenderedFile,
    pub helper: RenderedFile,
    pub scripts: Vec<CompileScript>,
}

impl RenderedBatch {
    /// Write all files. Scripts must exist before dispatch starts, so this
    /// returns only once every file is on disk.
    pub fn write_to_disk(&self) -> Result<()> {
        let files = [&self.package, &self.helper]
            .into_iter()
            .chain(self.scripts.iter().map(|s| &s.file));
        for file in files {
            if let Some(parent) = file.path.parent() {
                fs::create_dir_all(parent).map_err(BatchError::io("create", parent))?;
            }
            fs::write(&file.path, &file.contents).map_err(BatchError::io("write", &file.path))?;
            debug!(path = %file.path.display(), bytes = file.contents.len(), "wrote");
        }
        Ok(())
    }
}

/// Template renderer for one configuration.
pub struct Renderer<'a> {
    config: &'a RunConfig,
    layout: Layout<'a>,
    /// Output buffer
    output: String,
}

impl<'a> Renderer<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            layout: Layout::new(config),
            output: String::new(),
        }
    }

    /// Render the package, the helper and every compile script.
    pub fn render_all(&mut self) -> Result<RenderedBatch> {
        let package = RenderedFile {
            path: self.layout.package_path(),
            contents: self.render_package()?,
        };
        let helper = RenderedFile {
            path: self.layout.helper_path(),
            contents: self.render_helper(),
        };
        let scripts = self
            .config
            .indices()
            .map(|index| CompileScript {
                index,
                file: RenderedFile {
                    path: self.layout.script_path(index),
                    contents: self.render_script(index),
                },
            })
            .collect();

        Ok(RenderedBatch {
            package,
            helper,
            scripts,
        })
    }

    /// Render the model package holding one model per index.
    pub fn render_package(&mut self) -> Result<String> {
        let package = self.config.package_name.as_str();
        let base = self.config.base_package.as_str();

        write!(
            self.output,
            "{}",
            templates::substitute(
                templates::package_header(),
                &[("package", package), ("base_package", base)],
            )
        )?;

        for index in self.config.indices() {
            let model = self.layout.model_name(index);
            write!(
                self.output,
                "{}",
                templates::substitute(
                    templates::robot_model(),
                    &[("model", &model), ("base_package", base)],
                )
            )?;
        }

        write!(
            self.output,
            "{}",
            templates::substitute(templates::package_footer(), &[("package", package)])
        )?;

        Ok(std::mem::take(&mut self.output))
    }

    /// Render the compile script translating model `index`.
    pub fn render_script(&self, index: u32) -> String {
        let model = self.layout.model_name(index);
        let package_file = self.layout.package_file_name();
        let stop_time = format!("{:?}", self.config.stop_time);
        templates::substitute(
            templates::compile_script(),
            &[
                ("modelica_version", &self.config.modelica_version),
                ("base_library_file", &self.config.base_library_file),
                ("package_file", &package_file),
                ("compiler_flags", &self.config.compiler_flags),
                ("package", &self.config.package_name),
                ("model", &model),
                ("stop_time", &stop_time),
            ],
        )
    }

    pub fn render_helper(&self) -> String {
        templates::helper_script().to_string()
    }
}

/// Names of the models declared in a rendered package, in order.
pub fn model_names(package_text: &str) -> Vec<String> {
    MODEL_DECL
        .captures_iter(package_text)
        .map(|caps| caps[1].to_string())
        .collect()
}
