/// FMU batch builder CLI

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use fmu_batch::{BatchError, BatchRun, RunConfig, Strategy};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fmubatch")]
#[command(about = "Render indexed robot models and translate them into FMUs in parallel")]
#[command(version)]
struct Args {
    /// JSON run configuration; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// First model index (inclusive)
    #[arg(long)]
    start: Option<u32>,

    /// Last model index (exclusive)
    #[arg(long)]
    end: Option<u32>,

    /// Number of compiler processes running at once
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Remove intermediates after a successful run
    #[arg(long, value_name = "BOOL")]
    cleanup: Option<bool>,

    /// Options passed to setCommandLineOptions in every compile script
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    compiler_flags: Option<String>,

    /// Folder receiving the finished FMUs
    #[arg(short, long, value_name = "DIR")]
    output_folder: Option<PathBuf>,

    /// Directory for all generated files
    #[arg(short, long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Compiler command
    #[arg(long)]
    compiler: Option<String>,

    /// Scheduling of compile jobs onto scratch slots
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Do not require an FMU in the slot after a zero exit status
    #[arg(long)]
    no_verify: bool,

    /// Write the package and scripts, then stop
    #[arg(long)]
    render_only: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Write a JSON run report
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(start) = self.start {
            config.start = start;
        }
        if let Some(end) = self.end {
            config.end = end;
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(cleanup) = self.cleanup {
            config.cleanup = cleanup;
        }
        if let Some(flags) = &self.compiler_flags {
            config.compiler_flags = flags.clone();
        }
        if let Some(folder) = &self.output_folder {
            config.output_folder = folder.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(compiler) = &self.compiler {
            config.compiler = compiler.clone();
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if self.no_verify {
            config.verify_artifacts = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: &Args) -> Result<()> {
    let config = args.run_config()?;

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let batch = BatchRun::new(config).render_only(args.render_only);
    let report = batch.run().await?;

    if let Some(path) = &args.report {
        report
            .write_json(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    if args.render_only {
        println!(
            "Rendered {} compile scripts in {}",
            report.jobs,
            batch.config().work_dir.display()
        );
    } else {
        println!(
            "Created {} FMUs in {}",
            report.artifacts.len(),
            batch.config().work_dir.join(&batch.config().output_folder).display()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(&args).await {
        match e.downcast_ref::<BatchError>() {
            Some(BatchError::Dispatch { failures, .. }) => {
                eprintln!("{}", e);
                for failure in failures {
                    eprintln!("  index {} in slot th{}: {}", failure.index, failure.slot, failure.reason);
                }
            }
            _ => eprintln!("error: {:#}", e),
        }
        process::exit(1);
    }
}
