// src/lib.rs

pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod external;
pub mod fs;
pub mod logging;
pub mod quality;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, CredentialsConfig, StorageConfig};
use crate::context::{Connections, ExecutionWindow, RunContext};
use crate::dag::{DagGraph, Scheduler};
use crate::engine::{CoreRuntime, RunReport, Runtime, RuntimeEvent};
use crate::errors::StardagError;
use crate::exec::{ActionRunner, Executor, RealExecutorBackend, WarehouseActionRunner};
use crate::external::{
    CommandStorage, CommandWarehouse, CredentialResolver, Credentials, EnvCredentialResolver,
    LocalStorage, StaticCredentialResolver, StorageSource,
};

/// Knobs for a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_concurrency: usize,
    /// Timeout for tasks that do not set their own.
    pub task_timeout: Option<Duration>,
    /// Turn Ctrl-C into a graceful abort.
    pub listen_for_ctrl_c: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            task_timeout: None,
            listen_for_ctrl_c: false,
        }
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - execution window and run context
/// - scheduler / runtime / executor
/// - Ctrl-C handling
///
/// Returns `None` for `--dry-run`.
pub async fn run(args: CliArgs) -> Result<Option<RunReport>> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading pipeline {:?}", config_path))?;
    let graph = DagGraph::from_config(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg, &graph);
        return Ok(None);
    }

    let window = match (args.start, args.end) {
        (Some(start), Some(end)) => ExecutionWindow::new(start, end)?,
        _ => ExecutionWindow::for_schedule(cfg.schedule, Utc::now()),
    };

    let context = RunContext::builder(window, connections_from_config(&cfg)?)
        .params(cfg.params.clone())
        .params(args.params.iter().cloned())
        .build();
    info!(run_id = context.run_id(), %window, "starting pipeline run");

    let options = PipelineOptions {
        max_concurrency: args.max_concurrency.unwrap_or(cfg.max_concurrency),
        task_timeout: cfg.task_timeout,
        listen_for_ctrl_c: true,
    };

    let report = run_pipeline(
        graph,
        Arc::new(context),
        Arc::new(WarehouseActionRunner),
        options,
    )
    .await?;

    if let Some(path) = &args.report {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("writing run report to {path}"))?;
        debug!(path, "run report written");
    }

    Ok(Some(report))
}

/// Run a validated task graph to completion and summarise the outcome.
pub async fn run_pipeline(
    graph: DagGraph,
    context: Arc<RunContext>,
    runner: Arc<dyn ActionRunner>,
    options: PipelineOptions,
) -> Result<RunReport, StardagError> {
    let scheduler = Scheduler::new(graph, options.max_concurrency)?;

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let cancel = CancellationToken::new();

    let executor = Executor::new(Arc::clone(&context), runner, rt_tx.clone(), cancel.clone())
        .with_default_timeout(options.task_timeout);
    let backend = RealExecutorBackend::new(Arc::new(executor), rt_tx.clone());

    // Ctrl-C → graceful abort.
    let ctrl_c = options.listen_for_ctrl_c.then(|| {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        })
    });

    // Construct the pure core runtime and the async IO shell around it.
    let core = CoreRuntime::new(scheduler);
    let runtime = Runtime::new(core, rt_rx, backend, cancel);
    let result = runtime.run().await;

    if let Some(handle) = ctrl_c {
        handle.abort();
    }

    let scheduler = result?;
    let report = RunReport::new(&context, &scheduler);
    info!(run_id = %report.run_id, state = %report.state, "pipeline run finished");
    Ok(report)
}

/// Build the external collaborators described by `[warehouse]`, `[storage]`
/// and `[credentials]`.
pub fn connections_from_config(cfg: &ConfigFile) -> Result<Connections, StardagError> {
    let warehouse = cfg.warehouse.as_ref().ok_or_else(|| {
        StardagError::ConfigError("a [warehouse] section is required to run".to_string())
    })?;

    let storage: Arc<dyn StorageSource> = match &cfg.storage {
        StorageConfig::Local { root } => Arc::new(LocalStorage::new(root.clone())),
        StorageConfig::Command { command } => Arc::new(CommandStorage::new(command.clone())),
    };

    let credentials: Arc<dyn CredentialResolver> = match &cfg.credentials {
        CredentialsConfig::Env => Arc::new(EnvCredentialResolver),
        CredentialsConfig::Static { entries } => Arc::new(entries.iter().fold(
            StaticCredentialResolver::new(),
            |resolver, (id, c)| {
                resolver.with(
                    id.clone(),
                    Credentials {
                        access_key: c.access_key.clone(),
                        secret_key: c.secret_key.clone(),
                        session_token: c.session_token.clone(),
                    },
                )
            },
        )),
    };

    Ok(Connections {
        warehouse: Arc::new(CommandWarehouse::new(warehouse.command.clone())),
        storage,
        credentials,
    })
}

/// Simple dry-run output: print tasks in execution order with their
/// dependencies and actions.
fn print_dry_run(cfg: &ConfigFile, graph: &DagGraph) {
    println!("stardag dry-run");
    println!("  config.max_concurrency = {}", cfg.max_concurrency);
    println!("  config.schedule = {:?}", cfg.schedule);
    if let Some(timeout) = cfg.task_timeout {
        println!("  config.task_timeout = {timeout:?}");
    }
    println!();

    println!("tasks ({}):", graph.len());
    for id in graph.topological_order() {
        let Some(task) = graph.task(&id) else {
            continue;
        };
        println!("  - {id}");
        println!("      {}: {}", task.action.kind(), task.action.summary());
        if !task.dependencies.is_empty() {
            println!("      after: {:?}", task.dependencies);
        }
        if task.retry.max_retries > 0 {
            println!(
                "      retries: {} (delay {:?}, {:?})",
                task.retry.max_retries, task.retry.retry_delay, task.retry.backoff
            );
        }
        if let Some(timeout) = task.timeout {
            println!("      timeout: {timeout:?}");
        }
        if task.critical {
            println!("      critical: true");
        }
    }

    debug!("dry-run complete (no execution)");
}
