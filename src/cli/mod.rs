//! Command-line interface for batchq.
//!
//! Provides commands for running a workflow over a batch of images,
//! listing the available tools, validating workflow files, and showing
//! the resolved configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{self, ResolvedConfig};
use crate::core::{PoolEvent, ToolChain, WorkerPool, Workflow};
use crate::domain::{ConflictPolicy, ExecutionEvent, MediaItemRef, StatusKind};
use crate::tools::ToolRegistry;

/// batchq - Batch image processing queue
#[derive(Parser, Debug)]
#[command(name = "batchq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow over a set of images
    Run {
        /// Workflow file, or name (looks for <workflows>/<name>.yaml)
        workflow: String,

        /// Input images (glob patterns are expanded)
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output directory (defaults to the configured working directory)
        #[arg(short, long, env = "BATCHQ_DEST")]
        dest: Option<PathBuf>,

        /// What to do when an output already exists
        #[arg(long, value_enum)]
        conflict: Option<ConflictArg>,

        /// Process one image at a time
        #[arg(long)]
        single_worker: bool,

        /// Maximum number of images processed at once
        #[arg(short, long)]
        workers: Option<usize>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List available tools
    Tools,

    /// Check a workflow against the available tools
    Validate {
        /// Workflow file or name
        workflow: String,
    },

    /// Show current configuration
    Config,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ConflictArg {
    /// Replace existing outputs
    Overwrite,
    /// Append _1, _2, ... to the file name
    Unique,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Overwrite => ConflictPolicy::Overwrite,
            ConflictArg::Unique => ConflictPolicy::GenerateUniqueName,
        }
    }
}

/// Options of a single `run` invocation
struct RunOptions {
    dest: Option<PathBuf>,
    conflict: Option<ConflictArg>,
    single_worker: bool,
    workers: Option<usize>,
    json: bool,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                workflow,
                inputs,
                dest,
                conflict,
                single_worker,
                workers,
                json,
            } => {
                let options = RunOptions {
                    dest,
                    conflict,
                    single_worker,
                    workers,
                    json,
                };
                run_workflow(&workflow, &inputs, options).await
            }
            Commands::Tools => list_tools(),
            Commands::Validate { workflow } => validate_workflow(&workflow),
            Commands::Config => show_config(),
        }
    }
}

/// Run a workflow over the given inputs
async fn run_workflow(name: &str, inputs: &[String], options: RunOptions) -> Result<()> {
    let cfg = config::load_config()?;
    let registry = Arc::new(ToolRegistry::with_builtin_tools());

    let workflow = load_workflow(&cfg, name)?;
    workflow
        .validate(&registry)
        .with_context(|| format!("Workflow '{}' is invalid", workflow.name))?;

    let files = expand_inputs(inputs)?;
    if files.is_empty() {
        anyhow::bail!("No input files matched");
    }

    let dest = match options.dest.or_else(|| cfg.working_directory.clone()) {
        Some(dest) => dest,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    std::fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create output directory: {}", dest.display()))?;

    let mut settings = cfg.run.settings(&dest);
    if let Some(conflict) = options.conflict {
        settings = settings.with_conflict_policy(conflict.into());
    }
    if options.single_worker {
        settings = settings.with_multiple_workers(false);
    }
    if let Some(workers) = options.workers {
        settings = settings.with_worker_limit(workers);
    }

    let mut chains: Vec<ToolChain> = Vec::with_capacity(files.len());
    let mut rejected = 0usize;
    for (position, path) in files.into_iter().enumerate() {
        let item = MediaItemRef::from_path(path);
        match workflow.build_chain(item.clone(), position, &registry) {
            Ok(chain) => chains.push(chain),
            Err(e) => {
                rejected += 1;
                eprintln!("[{}] rejected: {}", item.file_name(), e);
            }
        }
    }

    let (pool, mut events) = WorkerPool::new(registry, settings);
    eprintln!(
        "Processing {} image(s) with '{}' ({} worker(s)) into {}",
        chains.len(),
        workflow.name,
        pool.concurrency(),
        dest.display()
    );
    pool.submit(chains);

    let mut summary = Summary::default();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PoolEvent::Execution(event)) => {
                    summary.record(&event);
                    print_event(&event, options.json)?;
                }
                Some(PoolEvent::Drained) | None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                let dropped = pool.cancel_all();
                eprintln!("\nInterrupted: canceling ({} queued image(s) dropped)", dropped.len());
                summary.dropped += dropped.len();
            }
        }
    }

    summary.rejected = rejected;
    summary.print();

    if summary.failed > 0 || rejected > 0 {
        anyhow::bail!("{} image(s) failed", summary.failed + rejected);
    }
    Ok(())
}

/// Load a workflow from a file path or by name from the workflows directory
fn load_workflow(cfg: &ResolvedConfig, name: &str) -> Result<Workflow> {
    let direct = PathBuf::from(name);
    if direct.is_file() {
        return Workflow::from_file(&direct);
    }

    let named = cfg.workflow_path(name);
    if named.is_file() {
        return Workflow::from_file(&named);
    }

    anyhow::bail!(
        "Workflow '{}' not found. Looked for:\n  - {}\n  - {}",
        name,
        direct.display(),
        named.display()
    );
}

/// Expand glob patterns; plain paths pass through unchanged
fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if !is_pattern(input) {
            files.push(PathBuf::from(input));
            continue;
        }

        let paths = glob::glob(input).with_context(|| format!("Invalid pattern: {}", input))?;
        for entry in paths {
            let path = entry.with_context(|| format!("Failed to read match for: {}", input))?;
            if path.is_file() {
                files.push(path);
            }
        }
    }

    Ok(files)
}

fn is_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

fn print_event(event: &ExecutionEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    let name = event.item.file_name();
    match event.kind {
        StatusKind::ChainStarted => println!("[{}] started", name),
        StatusKind::StepStarted | StatusKind::StepDone => {}
        StatusKind::StepFailed => println!(
            "[{}] step {} failed: {}",
            name,
            event.tool.as_deref().unwrap_or("?"),
            event.message
        ),
        StatusKind::ChainDone => println!(
            "[{}] done -> {}",
            name,
            event
                .destination
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        ),
        StatusKind::ChainFailed => println!("[{}] failed: {}", name, event.message),
        StatusKind::ChainCanceled => println!("[{}] canceled", name),
    }

    Ok(())
}

#[derive(Debug, Default)]
struct Summary {
    done: usize,
    failed: usize,
    canceled: usize,
    dropped: usize,
    rejected: usize,
}

impl Summary {
    fn record(&mut self, event: &ExecutionEvent) {
        match event.kind {
            StatusKind::ChainDone => self.done += 1,
            StatusKind::ChainFailed => self.failed += 1,
            StatusKind::ChainCanceled => self.canceled += 1,
            _ => {}
        }
    }

    fn print(&self) {
        eprintln!();
        eprintln!(
            "Done: {}  Failed: {}  Canceled: {}  Not started: {}  Rejected: {}",
            self.done, self.failed, self.canceled, self.dropped, self.rejected
        );
    }
}

/// List registered tools, grouped by category
fn list_tools() -> Result<()> {
    let registry = ToolRegistry::with_builtin_tools();

    println!("{:<22} {:<10} {:<8} {}", "TOOL", "GROUP", "VERSION", "DESCRIPTION");
    println!("{}", "-".repeat(80));
    for info in registry.tools() {
        println!(
            "{:<22} {:<10} {:<8} {}",
            info.name,
            info.group.as_str(),
            info.version,
            info.description
        );
    }
    println!("\nTotal: {} tools", registry.len());

    Ok(())
}

/// Validate a workflow and print its steps
fn validate_workflow(name: &str) -> Result<()> {
    let cfg = config::load_config()?;
    let registry = ToolRegistry::with_builtin_tools();
    let workflow = load_workflow(&cfg, name)?;

    workflow
        .validate(&registry)
        .with_context(|| format!("Workflow '{}' is invalid", workflow.name))?;

    println!("Workflow '{}' is valid", workflow.name);
    if !workflow.description.is_empty() {
        println!("  {}", workflow.description);
    }
    for step in &workflow.steps {
        println!("  {}. {}/{} (v{})", step.index, step.group, step.name, step.version);
    }
    if let Some(ref rule) = workflow.rename {
        println!("Rename rule: {}", rule);
    }
    if let Some(suffix) = workflow.output_suffix(&registry) {
        println!("Output format: .{}", suffix);
    }

    Ok(())
}

/// Show the resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::load_config()?;
    let run = &cfg.run;

    println!("batchq configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:              {}", cfg.home.display());
    println!("  Workflows:         {}", cfg.workflows.display());
    println!(
        "  Working directory: {}",
        cfg.working_directory
            .as_deref()
            .map(Path::display)
            .map(|d| d.to_string())
            .unwrap_or_else(|| "(current directory)".to_string())
    );
    println!();
    println!("Run defaults:");
    println!("  Conflict policy:   {:?}", run.conflict_policy);
    println!("  Multiple workers:  {}", run.use_multiple_workers);
    println!(
        "  Worker limit:      {}",
        run.worker_limit
            .map(|n| n.to_string())
            .unwrap_or_else(|| "(available cores)".to_string())
    );
    println!("  JPEG quality:      {}", run.codec.jpeg_quality);
    println!("  PNG compression:   {:?}", run.codec.png_compression);
    println!("  Half-size decode:  {}", run.codec.decode.half_size);

    Ok(())
}
