use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::backend::{NativeBackend, ProcessBackend, UnavailableBackend};
use crate::cli::Output;
use crate::config::{Settings, TextsplitConfig};
use crate::envelope::format_memory;
use crate::operations::OperationKind;
use crate::service::{Engine, ExecutionMode, ProgressUpdate};

pub mod config;
pub mod connect;
pub mod diff;
pub mod filter;
pub mod remove;
pub mod serve;
pub mod split;

#[derive(Parser)]
#[command(
    name = "textsplit",
    version = env!("CARGO_PKG_VERSION"),
    about = "Split, diff, filter and prune text through a tiered execution engine",
    long_about = "textsplit runs text transformations on a native backend process, on pooled \
                  worker threads, or in-process, and reports the same result shape on every route."
)]
pub struct Cli {
    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use custom configuration file
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Override the configured execution mode
    #[arg(long, value_enum, global = true)]
    pub mode: Option<ExecutionMode>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split lines into columns on a separator
    Split(split::SplitArgs),
    /// Compare two files line by line
    Diff(diff::DiffArgs),
    /// Keep or strip regex matches
    Filter(filter::FilterArgs),
    /// Remove lines by pattern or duplicates
    Remove(remove::RemoveArgs),
    /// Join two files line by line
    Connect(connect::ConnectArgs),
    /// Run the native service on stdin/stdout
    Serve,
    /// Configuration management
    Config(config::ConfigArgs),
}

/// Options shared by every operation subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Print execution metrics after the result
    #[arg(long)]
    pub stats: bool,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        setup_logging(self.verbose, self.quiet);
        let output = Output::new(self.verbose > 0, self.quiet);
        let custom_config = self.config.as_deref();

        match self.command {
            Some(Commands::Split(args)) => {
                let engine = build_engine(custom_config, self.mode)?;
                split::execute(args, &engine, &output).await
            }
            Some(Commands::Diff(args)) => {
                let engine = build_engine(custom_config, self.mode)?;
                diff::execute(args, &engine, &output).await
            }
            Some(Commands::Filter(args)) => {
                let engine = build_engine(custom_config, self.mode)?;
                filter::execute(args, &engine, &output).await
            }
            Some(Commands::Remove(args)) => {
                let engine = build_engine(custom_config, self.mode)?;
                remove::execute(args, &engine, &output).await
            }
            Some(Commands::Connect(args)) => {
                let engine = build_engine(custom_config, self.mode)?;
                connect::execute(args, &engine, &output).await
            }
            Some(Commands::Serve) => serve::execute().await,
            Some(Commands::Config(args)) => config::execute(args, custom_config).await,
            None => {
                use clap::CommandFactory;
                Cli::command().print_help()?;
                Ok(())
            }
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => tracing_subscriber::EnvFilter::new("warn"),
        1 => tracing_subscriber::EnvFilter::new("info"),
        2 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    });

    // stdout carries results and the serve protocol
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(custom_config: Option<&str>) -> Result<Settings> {
    TextsplitConfig::load_with_custom_config(custom_config)?.settings()
}

fn native_backend(settings: &Settings) -> Result<Arc<dyn NativeBackend>> {
    if !settings.backend.enabled {
        return Ok(Arc::new(UnavailableBackend));
    }
    let backend = ProcessBackend::from_command(&settings.backend.command)
        .context("Failed to resolve the native backend command")?
        .with_probe_timeout(Duration::from_millis(settings.backend.probe_timeout_ms));
    Ok(Arc::new(backend))
}

fn build_engine(custom_config: Option<&str>, mode: Option<ExecutionMode>) -> Result<Engine> {
    let mut settings = load_settings(custom_config)?;
    if let Some(mode) = mode {
        settings.engine.mode = mode;
    }
    let engine = Engine::new(&settings, native_backend(&settings)?);
    tracing::debug!("Engine ready in {:?} mode", engine.mode());
    Ok(engine)
}

/// Read a file, or stdin when `path` is `None` or `-`
pub(crate) fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Run `job` with a progress bar attached to the engine's worker route.
pub(crate) async fn with_progress<T, F>(engine: &Engine, output: &Output, label: &str, job: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let Some(pb) = output.progress_bar(label) else {
        return job.await;
    };
    let bar = pb.clone();
    engine.set_progress(Some(Arc::new(move |update: ProgressUpdate| {
        bar.set_position(u64::from(update.percent));
    })));
    let result = job.await;
    engine.set_progress(None);
    pb.finish_and_clear();
    result
}

pub(crate) fn print_stats(engine: &Engine, kind: OperationKind, output: &Output) {
    let Some(metrics) = engine.metrics(kind) else {
        output.warning("No metrics recorded");
        return;
    };
    output.header(&format!("{kind} metrics"));
    output.table_row("execution time", &format!("{:.2} ms", metrics.execution_time_ms));
    output.table_row("memory", &format_memory(metrics.memory_usage_bytes));
    output.table_row("input", &format!("{} bytes", metrics.input_size_bytes));
    output.table_row("output", &format!("{} bytes", metrics.output_size_bytes));
}
