//! Run orchestration -- assembly, placement, and lifecycle management.
//!
//! The [`Orchestrator`] wires one run together: it connects the document
//! store, starts the log ingestor, places workers on hosts, renders their
//! configs, starts the scenario watcher and waits for the run to end.
//!
//! # Startup Order
//!
//! 1. Document store (indexes on `worker`, `is_error`)
//! 2. Log ingestor (every worker output ends up here)
//! 3. Fleet (placement, stale container cleanup, config rendering)
//! 4. `gauntlet ready` system entry
//! 5. Scenario watcher
//!
//! # Shutdown Order
//!
//! 1. Scenario watcher (no new actions)
//! 2. Fleet (stop containers, collect the last run reports)
//! 3. Log ingestor (final flush)
//! 4. Document store

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use gauntlet_container::{BollardRuntime, ContainerError, Fleet, FleetBuilder, FleetConfig};
use gauntlet_core::config::{GauntletConfig, RuntimeConfig};
use gauntlet_core::design::{Design, DesignHost};
use gauntlet_core::distribute::place;
use gauntlet_core::exit::{ExitReceiver, ExitSender, ExitSignal, exit_channel};
use gauntlet_core::pipeline::{HealthStatus, Pipeline};
use gauntlet_core::types::LogEntry;
use gauntlet_core::vars::Vars;
use gauntlet_log_pipeline::{IngestConfig, IngestSender, LogIngestor, LogIngestorBuilder};
use gauntlet_scenario::{ActionRegistry, ScenarioWatcher, ScenarioWatcherBuilder, load_sequences};
use gauntlet_storage::{Storage, StoragePool};

use crate::cli::DaemonCli;
use crate::health::{ComponentHealth, aggregate_status};

/// System entry submitted once every worker is placed and prepared.
pub const READY_MESSAGE: &str = "gauntlet ready";

/// Fields of the log collection that conditions usually filter on.
const LOG_INDEX_KEYS: &[&str] = &["worker", "is_error"];

/// Loads `gauntlet.toml` (defaults when missing) and applies CLI overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or the result is invalid.
pub async fn load_config(cli: &DaemonCli) -> Result<GauntletConfig> {
    let mut config = GauntletConfig::load_or_default(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;

    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.pipeline.log_dir = dir.display().to_string();
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    Ok(config)
}

/// Switches taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Time budget for the whole run
    pub exit_after: Option<Duration>,
    /// Stop after the workers are prepared
    pub config_only: bool,
    /// Stop worker containers left running by an earlier run
    pub force: bool,
    /// Remove worker containers after a successful run
    pub clean_after: bool,
}

impl RunOptions {
    pub fn from_cli(cli: &DaemonCli) -> Self {
        Self {
            exit_after: cli.exit_after(),
            config_only: cli.config_only,
            force: cli.force,
            clean_after: cli.clean_after,
        }
    }
}

/// Workers given to one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlan {
    pub host: DesignHost,
    pub workers: Vec<String>,
}

/// Places the design's workers on its hosts.
///
/// Workers are taken in alias order; hosts that receive no worker are left out.
pub fn plan_hosts(design: &Design) -> Vec<HostPlan> {
    let workers = design.workers();
    place(&design.hosts, |h| h.weight, &workers)
        .into_iter()
        .map(|p| HostPlan {
            host: p.host.clone(),
            workers: p.workers,
        })
        .collect()
}

/// Connects to the Docker daemon of a host.
///
/// Local hosts use `runtime.docker_socket` (or the platform default when it
/// is empty); remote hosts are reached at `tcp://<host>:<remote_docker_port>`.
pub fn connect_runtime(
    host: &DesignHost,
    runtime: &RuntimeConfig,
) -> Result<BollardRuntime, ContainerError> {
    if !host.local {
        return BollardRuntime::connect_remote(&host.host, runtime.remote_docker_port);
    }
    if runtime.docker_socket.is_empty() {
        BollardRuntime::connect_local()
    } else {
        BollardRuntime::connect_with_socket(&runtime.docker_socket)
    }
}

/// Why a run stopped waiting.
#[derive(Debug)]
pub enum RunEnd {
    /// A component reported on the exit channel.
    Exit(ExitSignal),
    /// SIGINT or SIGTERM.
    Interrupted(&'static str),
    /// The `--exit-after` budget ran out.
    Expired(Duration),
}

impl RunEnd {
    /// Only a successful exit signal is a successful run.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Exit(Ok(())) => Ok(()),
            Self::Exit(Err(e)) => Err(e.into()),
            Self::Interrupted(signal) => Err(anyhow::anyhow!("signal, {} interrupted", signal)),
            Self::Expired(budget) => Err(anyhow::anyhow!(
                "expired with exit-after {}s",
                budget.as_secs_f64()
            )),
        }
    }
}

/// Waits for the first of: an exit signal, `interrupt`, or the time budget.
pub async fn wait_for_end<F>(
    exit_rx: &mut ExitReceiver,
    exit_after: Option<Duration>,
    interrupt: F,
) -> Result<RunEnd>
where
    F: Future<Output = Result<&'static str>>,
{
    let budget = async {
        match exit_after {
            Some(budget) => {
                debug!(exit_after_secs = budget.as_secs_f64(), "run has a time budget");
                tokio::time::sleep(budget).await;
                budget
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        signal = exit_rx.recv() => match signal {
            Some(signal) => Ok(RunEnd::Exit(signal)),
            None => Err(anyhow::anyhow!("exit channel closed")),
        },
        signal = interrupt => Ok(RunEnd::Interrupted(signal?)),
        budget = budget => Ok(RunEnd::Expired(budget)),
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Everything a run owns once it is assembled.
struct Components {
    storage: Storage,
    ingestor: LogIngestor,
    sender: IngestSender,
    fleet: Option<Fleet<BollardRuntime>>,
    watcher: Option<ScenarioWatcher>,
}

impl Components {
    async fn health(&self) -> HealthStatus {
        let mut components = vec![ComponentHealth::new(
            "log-ingestor",
            self.ingestor.health_check().await,
        )];
        if let Some(watcher) = &self.watcher {
            components.push(ComponentHealth::new(
                "scenario-watcher",
                watcher.health_check().await,
            ));
        }
        aggregate_status(&components)
    }
}

/// The run coordinator.
pub struct Orchestrator {
    config: GauntletConfig,
    design: Design,
    options: RunOptions,
    vars: Vars,
}

impl Orchestrator {
    pub fn new(config: GauntletConfig, design: Design, options: RunOptions) -> Self {
        Self {
            config,
            design,
            options,
            vars: Vars::new(),
        }
    }

    /// Loads the design document and builds the orchestrator.
    pub async fn load(config: GauntletConfig, design: &Path, options: RunOptions) -> Result<Self> {
        let design = Design::load(design)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load design: {}", e))?;
        Ok(Self::new(config, design, options))
    }

    /// Shared variables of this run.
    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    /// Runs the scenario to its end.
    ///
    /// Returns `Ok(())` only when the scenario completed (or, with
    /// `config_only`, when every worker was prepared). Components that were
    /// started are shut down in every case.
    pub async fn run(&self) -> Result<()> {
        let (exit_tx, mut exit_rx) = exit_channel();
        let mut components = self.assemble(&exit_tx).await?;

        let outcome = match self.launch(&mut components, &exit_tx).await {
            Ok(()) if self.options.config_only => {
                info!("workers prepared, exiting without running the scenario");
                Ok(())
            }
            Ok(()) => {
                info!("scenario running");
                wait_for_end(
                    &mut exit_rx,
                    self.options.exit_after,
                    wait_for_shutdown_signal(),
                )
                .await
                .and_then(|end| {
                    info!(end = ?end, "run ended");
                    end.into_result()
                })
            }
            Err(e) => Err(e),
        };

        let health = components.health().await;
        debug!(health = ?health, "component health at shutdown");

        let closed = self.shutdown(components, outcome.is_ok()).await;
        outcome.and(closed)
    }

    /// Connects storage and starts the ingestor.
    async fn assemble(&self, exit_tx: &ExitSender) -> Result<Components> {
        let storage = Storage::connect(&self.design.storage, self.config.watcher.connect_timeout())
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect storage: {}", e))?;
        storage
            .ensure_indexes(&self.config.pipeline.collection, LOG_INDEX_KEYS)
            .await
            .map_err(|e| anyhow::anyhow!("failed to create indexes: {}", e))?;
        info!(
            uri = %self.design.storage,
            backend = storage.backend_name(),
            "storage connected"
        );

        let ingest_config = IngestConfig::from_core(&self.config.pipeline, self.design.exit_on_error);
        let (mut ingestor, sender) = LogIngestorBuilder::new()
            .config(ingest_config)
            .storage(storage.clone())
            .exit_sender(exit_tx.clone())
            .workers(self.design.workers())
            .build()
            .await
            .map_err(|e| anyhow::anyhow!("failed to build log ingestor: {}", e))?;
        ingestor
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start log ingestor: {}", e))?;

        Ok(Components {
            storage,
            ingestor,
            sender,
            fleet: None,
            watcher: None,
        })
    }

    /// Places workers, prepares them and starts the watcher.
    async fn launch(&self, c: &mut Components, exit_tx: &ExitSender) -> Result<()> {
        let plans = plan_hosts(&self.design);
        if plans.is_empty() {
            info!("design has no workers");
        } else {
            let mut builder = FleetBuilder::new()
                .config(FleetConfig::from_runtime(&self.config.runtime))
                .sender(c.sender.clone());
            for plan in plans {
                info!(
                    host = %plan.host.host,
                    local = plan.host.local,
                    workers = ?plan.workers,
                    "workers placed"
                );
                let runtime = connect_runtime(&plan.host, &self.config.runtime)?;
                builder = builder.host(plan.host.host, runtime, plan.workers);
            }
            let fleet = builder.build()?;
            c.fleet = Some(fleet.clone());

            fleet.ping().await?;
            if self.options.force {
                fleet.stop_running().await?;
            }
            fleet.clean().await?;
            fleet
                .prepare(&self.design, &self.vars, self.design.storage.as_str())
                .await?;
        }

        c.sender
            .submit(LogEntry::system(READY_MESSAGE, false))
            .await?;
        if self.options.config_only {
            return Ok(());
        }

        let mut registry = ActionRegistry::new(exit_tx.clone())
            .host_command_timeout(self.config.runtime.host_command_timeout())
            .ingest_sender(c.sender.clone());
        if let Some(fleet) = &c.fleet {
            registry = registry.worker_control(Arc::new(fleet.clone()));
        }
        let sequences = load_sequences(&self.design, &registry)?;

        // The watcher closes its pool on stop; only a memory store, which is
        // process-local, is shared with the ingestor.
        let mut pool = StoragePool::new(self.config.watcher.connect_timeout());
        if let Storage::Memory(_) = &c.storage {
            pool.insert(&self.design.storage, c.storage.clone());
        }

        let mut watcher = ScenarioWatcherBuilder::new()
            .config(self.config.watcher.clone())
            .sequences(sequences)
            .vars(self.vars.clone())
            .exit_sender(exit_tx.clone())
            .pool(pool)
            .build()?;
        watcher.start().await?;
        c.watcher = Some(watcher);
        Ok(())
    }

    /// Stops every started component. Failures are logged; the first one is returned.
    async fn shutdown(&self, mut c: Components, succeeded: bool) -> Result<()> {
        let mut first: Option<anyhow::Error> = None;

        if let Some(watcher) = c.watcher.as_mut() {
            if let Err(e) = watcher.stop().await {
                warn!(error = %e, "failed to stop scenario watcher");
                first.get_or_insert(e.into());
            }
        }

        if let Some(fleet) = &c.fleet {
            if let Err(e) = fleet.close().await {
                warn!(error = %e, "failed to close fleet");
                first.get_or_insert(e.into());
            }
            if succeeded && self.options.clean_after {
                if let Err(e) = fleet.clean().await {
                    warn!(error = %e, "failed to clean worker containers");
                    first.get_or_insert(e.into());
                }
            }
        }

        let stats = c.ingestor.stats();
        if let Err(e) = c.ingestor.stop().await {
            warn!(error = %e, "failed to stop log ingestor");
            first.get_or_insert(e.into());
        }
        info!(
            received = stats.received(),
            persisted = stats.persisted(),
            "log ingestion finished"
        );

        if let Err(e) = c.storage.close().await {
            warn!(error = %e, "failed to close storage");
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
