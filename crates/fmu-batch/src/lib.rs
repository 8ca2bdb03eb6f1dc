/// FMU batch builder
///
/// Renders a Modelica package of indexed robot models and one compile script
/// per model, translates every model into an FMU with a bounded number of
/// parallel compiler processes, and collects the results.

pub mod codegen;
pub mod collect;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod layout;
pub mod report;
pub mod runner;
pub mod templates;

pub use codegen::{CompileScript, RenderedBatch, RenderedFile, Renderer, model_names};
pub use config::{RunConfig, Strategy};
pub use dispatch::{Dispatcher, DispatchSummary, JobFailure, Wave, plan_waves};
pub use driver::BatchRun;
pub use error::{BatchError, Result};
pub use layout::Layout;
pub use report::RunReport;
pub use runner::{CompileJob, JobOutcome, JobRunner, ProcessRunner};
