// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Demonstration CLI over the orchestrator engine. Not the REST/WebSocket
//! surface spec.md §1 names as an external collaborator — a thin harness
//! for submitting golden paths or raw workflows, inspecting the
//! execution graph, and running a worker pool against the configured
//! queue backend. See SPEC_FULL.md §10 "CLI surface".

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use orchestrator_core::golden_path::GoldenPathRegistry;
use orchestrator_core::platform::PlatformRegistry;
use orchestrator_core::CORE_VERSION;
use orchestrator_provisioners::{BashProvisioner, GitOpsCommitProvisioner, HttpProvisioner, NoopProvisioner};
use orchestrator_core::graph::GraphStore;
use orchestrator_queue::worker::{spawn_pool_with_graph_store, WorkflowResolver};
use orchestrator_queue::{build_queue, sweeper, QueueConfig, TaskQueue};
use orchestrator_sdk::WorkflowTaskBuilder;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(version, about = "Platform orchestration engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory the golden-paths file and workflow files are resolved
    /// relative to.
    #[arg(long, global = true, default_value = ".")]
    base_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a golden path or a raw workflow spec for execution.
    Submit {
        /// Application name the task is submitted under.
        #[arg(long)]
        app: String,

        /// Named golden path to run. Mutually exclusive with `--spec-file`.
        #[arg(long)]
        golden_path: Option<String>,

        /// Path to a raw workflow YAML/JSON file. Mutually exclusive
        /// with `--golden-path`.
        #[arg(long)]
        spec_file: Option<PathBuf>,

        /// Path to a golden-paths YAML file, required with `--golden-path`.
        #[arg(long, default_value = "goldenpaths.yaml")]
        golden_paths_file: PathBuf,

        /// `key=value` golden-path parameters, may be repeated.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Golden-path registry operations.
    GoldenPaths {
        #[command(subcommand)]
        action: GoldenPathsCommand,
    },

    /// Platform manifest operations.
    Platform {
        #[command(subcommand)]
        action: PlatformCommand,
    },

    /// Run a worker pool against the configured queue backend until
    /// interrupted.
    QueueWorker {
        /// Optional golden-paths file for resolving golden-path tasks.
        #[arg(long)]
        golden_paths_file: Option<PathBuf>,

        /// Directory to write each completed task's exported JSON
        /// execution graph to, named `<app_name>.json`. Polled once per
        /// `--graph-export-interval` for as long as the pool runs;
        /// omit to skip graph export entirely.
        #[arg(long)]
        export_graphs_dir: Option<PathBuf>,

        /// How often the exported graphs on disk are refreshed.
        #[arg(long, default_value = "5s", value_parser = parse_duration_arg)]
        graph_export_interval: std::time::Duration,
    },
}

#[derive(Subcommand)]
enum GoldenPathsCommand {
    /// List registered golden-path names, sorted lexicographically.
    List {
        #[arg(long, default_value = "goldenpaths.yaml")]
        file: PathBuf,
    },
    /// Verify every registered workflow file exists on disk.
    Validate {
        #[arg(long, default_value = "goldenpaths.yaml")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum PlatformCommand {
    /// Load a single platform manifest and report its provisioners.
    Load {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    Ok((key.to_string(), value.to_string()))
}

fn parse_duration_arg(raw: &str) -> Result<std::time::Duration, String> {
    orchestrator_core::params::parse_duration(raw)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("orchestrator={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Submit { app, golden_path, spec_file, golden_paths_file, params } => {
            submit(&cli.base_dir, app, golden_path, spec_file, golden_paths_file, params).await
        }
        Commands::GoldenPaths { action } => golden_paths_command(&cli.base_dir, action),
        Commands::Platform { action } => platform_command(action),
        Commands::QueueWorker { golden_paths_file, export_graphs_dir, graph_export_interval } => {
            queue_worker(&cli.base_dir, golden_paths_file, export_graphs_dir, graph_export_interval).await
        }
    };

    if let Err(err) = result {
        eprintln!("{} {err:#}", "Error:".red().bold());
        std::process::exit(1);
    }
}

/// Builds the default provisioner registry: the four built-ins every
/// deployment of this engine ships with. A real deployment also loads
/// platform manifests (`platform load`) to register more.
fn default_platform_registry() -> Result<Arc<PlatformRegistry>> {
    let registry = PlatformRegistry::new();
    registry.register_provisioner(Arc::new(BashProvisioner))?;
    registry.register_provisioner(Arc::new(HttpProvisioner::default()))?;
    registry.register_provisioner(Arc::new(GitOpsCommitProvisioner::default()))?;
    registry.register_provisioner(Arc::new(NoopProvisioner))?;
    Ok(Arc::new(registry))
}

async fn submit(
    base_dir: &PathBuf,
    app: String,
    golden_path: Option<String>,
    spec_file: Option<PathBuf>,
    golden_paths_file: PathBuf,
    params: Vec<(String, String)>,
) -> Result<()> {
    if golden_path.is_some() == spec_file.is_some() {
        anyhow::bail!("exactly one of --golden-path or --spec-file must be set");
    }

    let config = QueueConfig::from_env();
    let queue: Arc<dyn TaskQueue> = build_queue(&config).await.context("building task queue")?;

    let response = if let Some(name) = golden_path {
        let registry_path = base_dir.join(&golden_paths_file);
        let registry = GoldenPathRegistry::load_from_file(&registry_path)
            .with_context(|| format!("loading golden paths from {}", registry_path.display()))?;

        let parameters: HashMap<String, String> = params.into_iter().collect();
        WorkflowTaskBuilder::golden_path(app, name)
            .with_parameters(parameters)
            .submit(&queue, Some(&registry))
            .await
            .context("submitting golden-path task")?
    } else {
        let path = spec_file.expect("checked above");
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading spec file {}", path.display()))?;
        let spec: serde_json::Value = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing spec file {}", path.display()))?;

        WorkflowTaskBuilder::raw_spec(app, spec)
            .submit(&queue, None)
            .await
            .context("submitting raw-spec task")?
    };

    println!(
        "{} task {} ({})",
        "Submitted".green().bold(),
        response.task_id,
        response.status
    );
    Ok(())
}

fn golden_paths_command(base_dir: &PathBuf, action: GoldenPathsCommand) -> Result<()> {
    match action {
        GoldenPathsCommand::List { file } => {
            let path = base_dir.join(&file);
            let registry = GoldenPathRegistry::load_from_file(&path)
                .with_context(|| format!("loading golden paths from {}", path.display()))?;
            println!("{}", "Golden paths:".cyan().bold());
            for name in registry.list() {
                let meta = registry.get_metadata(&name)?;
                println!(
                    "  {} {}",
                    name.green(),
                    meta.description.as_deref().unwrap_or("").dimmed()
                );
            }
        }
        GoldenPathsCommand::Validate { file } => {
            let path = base_dir.join(&file);
            let registry = GoldenPathRegistry::load_from_file(&path)
                .with_context(|| format!("loading golden paths from {}", path.display()))?;
            registry.validate_paths(base_dir)?;
            println!(
                "{} all {} workflow files exist",
                "✓".green().bold(),
                registry.len()
            );
        }
    }
    Ok(())
}

fn platform_command(action: PlatformCommand) -> Result<()> {
    match action {
        PlatformCommand::Load { file } => {
            let registry = PlatformRegistry::new();
            registry
                .load_from_file(&file, CORE_VERSION)
                .with_context(|| format!("loading platform manifest {}", file.display()))?;
            for name in registry.list_platforms() {
                println!("{} {}", "✓ loaded platform".green().bold(), name);
            }
        }
    }
    Ok(())
}

/// Runs a worker pool plus the stale-lock sweeper until interrupted
/// with ctrl-c. The queue backend and worker count come from
/// `QueueConfig::from_env` (`QUEUE_BACKEND`, `QUEUE_WORKERS`, ...).
///
/// When `export_graphs_dir` is set, every worker in the pool shares one
/// [`GraphStore`] (SPEC_FULL.md §4.D's `GetGraph`/`ExportGraph`
/// operations); a background task periodically dumps each app's current
/// graph to `<export_graphs_dir>/<app_name>.json`.
async fn queue_worker(
    base_dir: &PathBuf,
    golden_paths_file: Option<PathBuf>,
    export_graphs_dir: Option<PathBuf>,
    graph_export_interval: std::time::Duration,
) -> Result<()> {
    let config = QueueConfig::from_env();
    let queue = build_queue(&config).await.context("building task queue")?;
    let platform = default_platform_registry()?;

    let golden_paths = match golden_paths_file {
        Some(file) => Some(
            GoldenPathRegistry::load_from_file(base_dir.join(&file))
                .with_context(|| format!("loading golden paths from {}", file.display()))?,
        ),
        None => None,
    };
    let resolver = Arc::new(WorkflowResolver::new(golden_paths, base_dir.clone()));

    info!(
        backend = ?config.backend,
        workers = config.workers,
        "starting worker pool"
    );
    println!(
        "{} {} worker(s) against {:?} queue (ctrl-c to stop)",
        "Starting".cyan().bold(),
        config.workers,
        config.backend
    );

    let sweeper_handle = sweeper::spawn_sweeper(Arc::clone(&queue), config.sweep_interval);
    let graphs = Arc::new(GraphStore::new());
    let (worker_handles, graphs) = spawn_pool_with_graph_store(
        config.workers,
        queue,
        platform,
        resolver,
        config.poll_interval,
        config.heartbeat_interval,
        graphs,
    );

    let export_handle = export_graphs_dir.map(|dir| {
        println!("{} graphs to {}", "Exporting".cyan().bold(), dir.display());
        tokio::spawn(export_graphs_loop(graphs, dir, graph_export_interval))
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    println!("\n{}", "Shutting down...".yellow());
    sweeper_handle.abort();
    if let Some(handle) = export_handle {
        handle.abort();
    }
    for handle in worker_handles {
        handle.abort();
    }
    Ok(())
}

/// Periodically writes every app's current execution graph to
/// `<dir>/<app_name>.json`. A single app's export failure is logged and
/// does not stop the loop.
async fn export_graphs_loop(graphs: Arc<GraphStore>, dir: PathBuf, interval: std::time::Duration) {
    if let Err(err) = std::fs::create_dir_all(&dir) {
        tracing::error!(error = %err, dir = %dir.display(), "failed to create graph export directory");
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        for app_name in graphs.app_names() {
            match graphs.export_graph(&app_name, "json") {
                Ok(json) => {
                    let path = dir.join(format!("{app_name}.json"));
                    if let Err(err) = std::fs::write(&path, json) {
                        tracing::warn!(error = %err, app = %app_name, "failed to write exported graph");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, app = %app_name, "failed to export graph");
                }
            }
        }
    }
}
