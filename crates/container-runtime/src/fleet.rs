//! Worker fleet: lifecycle of every worker container across hosts.
//!
//! A [`Fleet`] knows which host each worker alias was placed on and drives
//! that host's [`ContainerRuntime`]. Container output is forwarded line by
//! line into the ingestion pipeline, and every finished container run adds
//! one JSON report entry for its worker:
//!
//! ```text
//! {"kind":"init","exit_code":0,"error":null,"msg":"init worker stopped without error"}
//! ```
//!
//! The report is flagged as an error when the exit code is non-zero, which
//! is what trips `exit-on-error`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gauntlet_core::config::RuntimeConfig;
use gauntlet_core::design::Design;
use gauntlet_core::error::GauntletError;
use gauntlet_core::fanout;
use gauntlet_core::metrics as m;
use gauntlet_core::pipeline::BoxFuture;
use gauntlet_core::types::LogEntry;
use gauntlet_core::vars::{Vars, normalize_keys};
use gauntlet_core::worker::{WorkerCommand, WorkerControl};
use gauntlet_log_pipeline::IngestSender;

use crate::error::ContainerError;
use crate::render::{config_path, render_worker_config, worker_dir, write_worker_config};
use crate::runtime::{
    BindMount, ContainerKind, ContainerRuntime, ContainerSpec, ContainerSummary, ExitStatus,
    LABEL_KIND, LABEL_ROOT, LABEL_WORKER, LogChunk, ROOT_WORKER, chunk_lines,
};

/// Runner binary path inside the container.
const RUNNER_TARGET: &str = "/runner";
/// Rendered config path inside the container.
const CONFIG_TARGET: &str = "/config.yml";
const DATA_TARGET: &str = "/data";
const SHARED_TARGET: &str = "/shared";

/// How long `close` waits for background runs to report before cancelling them.
const CLOSE_GRACE: Duration = Duration::from_secs(15);

/// Fleet-wide container settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    pub image: String,
    /// Runner binary on the host, mounted read-only at `/runner`
    pub runner_path: PathBuf,
    /// Directory holding one sub-directory per worker
    pub base_dir: PathBuf,
}

impl FleetConfig {
    pub fn from_runtime(config: &RuntimeConfig) -> Self {
        Self {
            image: config.image.clone(),
            runner_path: PathBuf::from(&config.runner_path),
            base_dir: PathBuf::from(&config.base_dir),
        }
    }
}

struct FleetHost<R> {
    name: String,
    runtime: Arc<R>,
}

struct FleetInner<R> {
    config: FleetConfig,
    hosts: Vec<FleetHost<R>>,
    /// alias -> index into `hosts`
    workers: BTreeMap<String, usize>,
    sender: IngestSender,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Worker containers placed over one or more hosts.
///
/// Cloning is cheap and yields a handle to the same fleet.
pub struct Fleet<R: ContainerRuntime> {
    inner: Arc<FleetInner<R>>,
}

impl<R: ContainerRuntime> Clone for Fleet<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// JSON body of a run report entry.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    kind: &'static str,
    exit_code: i64,
    error: Option<String>,
    msg: &'a str,
}

impl<R: ContainerRuntime> Fleet<R> {
    /// Worker aliases, sorted.
    pub fn workers(&self) -> Vec<String> {
        self.inner.workers.keys().cloned().collect()
    }

    /// Name of the host a worker was placed on.
    pub fn host_of(&self, alias: &str) -> Option<&str> {
        self.inner
            .workers
            .get(alias)
            .map(|&i| self.inner.hosts[i].name.as_str())
    }

    pub fn config(&self) -> &FleetConfig {
        &self.inner.config
    }

    /// Checks that every host's container runtime answers.
    pub async fn ping(&self) -> Result<(), ContainerError> {
        for host in &self.inner.hosts {
            host.runtime.ping().await.map_err(|e| {
                ContainerError::DockerConnection(format!("host {}: {e}", host.name))
            })?;
        }
        Ok(())
    }

    /// Renders and writes every worker's config and publishes the results.
    ///
    /// For each worker the following variables are set on `vars`:
    /// - `Runtime.Worker.<alias>.Storage.URI`
    /// - `Design.Worker.<alias>`: the rendered config with normalized keys
    /// - `Design.Shared.<key>.<alias>`: each `_`-prefixed value
    ///
    /// While a worker's fragments are expanded, `Self.Alias`, `Self.Host` and
    /// `Self.Storage.URI` refer to that worker.
    pub async fn prepare(
        &self,
        design: &Design,
        vars: &Vars,
        storage_uri: &str,
    ) -> Result<(), ContainerError> {
        let base_dir = &self.inner.config.base_dir;
        tokio::fs::create_dir_all(base_dir).await?;

        for alias in self.inner.workers.keys() {
            let host = self.host_of(alias).unwrap_or_default();
            let own = vars.clone_with([(
                "Self",
                json!({
                    "Alias": alias,
                    "Host": host,
                    "Storage": {"URI": storage_uri},
                }),
            )]);

            let fragment = design
                .worker_config
                .get(alias)
                .map(String::as_str)
                .unwrap_or_default();
            let rendered = render_worker_config(alias, &design.common_config, fragment, &own)?;
            write_worker_config(base_dir, &rendered).await?;

            vars.set(
                &format!("Runtime.Worker.{alias}.Storage.URI"),
                Value::String(storage_uri.to_owned()),
            );
            vars.set(
                &format!("Design.Worker.{alias}"),
                normalize_keys(Value::Object(rendered.config.clone())),
            );
            for (key, value) in &rendered.shared {
                vars.set(&format!("Design.Shared.{key}.{alias}"), value.clone());
            }
            debug!(worker = %alias, host = %host, "worker prepared");
        }

        info!(workers = self.inner.workers.len(), "worker configs written");
        Ok(())
    }

    /// Resolves a worker selection. An empty selection means every worker.
    pub fn select(&self, workers: &[String]) -> Result<Vec<String>, ContainerError> {
        if workers.is_empty() {
            return Ok(self.workers());
        }

        let mut selected = Vec::with_capacity(workers.len());
        for alias in workers {
            if !self.inner.workers.contains_key(alias) {
                return Err(ContainerError::UnknownWorker(alias.clone()));
            }
            if selected.contains(alias) {
                return Err(ContainerError::DuplicateWorker(alias.clone()));
            }
            selected.push(alias.clone());
        }
        Ok(selected)
    }

    /// Runs the init container of each worker to completion.
    pub async fn init(&self, workers: &[String]) -> Result<(), GauntletError> {
        let selected = self.select(workers)?;
        fanout::run_all(selected, |alias| {
            let fleet = self.clone();
            async move {
                fleet
                    .run_to_completion(&alias, ContainerKind::Init, &[])
                    .await
                    .map_err(GauntletError::from)
            }
        })
        .await
    }

    /// Starts the run container of each worker and returns once they are up.
    pub async fn start(&self, workers: &[String], args: &[String]) -> Result<(), GauntletError> {
        let selected = self.select(workers)?;
        fanout::run_all(selected, |alias| {
            let fleet = self.clone();
            let args = args.to_vec();
            async move { fleet.launch(&alias, &args).await.map_err(GauntletError::from) }
        })
        .await
    }

    /// Runs the runner with `args` in a one-shot container per worker.
    pub async fn custom(&self, workers: &[String], args: &[String]) -> Result<(), GauntletError> {
        let selected = self.select(workers)?;
        fanout::run_all(selected, |alias| {
            let fleet = self.clone();
            let args = args.to_vec();
            async move {
                fleet
                    .run_to_completion(&alias, ContainerKind::Custom, &args)
                    .await
                    .map_err(GauntletError::from)
            }
        })
        .await
    }

    /// Stops the running run containers of each worker.
    pub async fn stop(&self, workers: &[String]) -> Result<(), GauntletError> {
        let selected = self.select(workers)?;
        fanout::run_all(selected, |alias| {
            let fleet = self.clone();
            async move { fleet.stop_worker(&alias).await.map_err(GauntletError::from) }
        })
        .await
    }

    /// Stops every running worker container on every host, including ones
    /// left over from an earlier run.
    pub async fn stop_running(&self) -> Result<(), ContainerError> {
        let mut first: Option<ContainerError> = None;
        for host in &self.inner.hosts {
            if let Err(e) = self.stop_all_on(host).await {
                warn!(host = %host.name, error = %e, "failed to stop worker containers");
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stops every running worker container on every host, then waits for the
    /// pending run reports.
    pub async fn close(&self) -> Result<(), GauntletError> {
        let stopped = self.stop_running().await;

        let tasks = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if tokio::time::timeout(CLOSE_GRACE, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!(
                grace_secs = CLOSE_GRACE.as_secs(),
                "worker runs did not finish in time, cancelling"
            );
        }
        self.inner.cancel.cancel();

        info!("fleet closed");
        stopped.map_err(GauntletError::from)
    }

    /// Removes every stopped worker container on every host.
    pub async fn clean(&self) -> Result<(), GauntletError> {
        for host in &self.inner.hosts {
            let containers = host.runtime.list(&root_label()).await?;
            for container in containers.into_iter().filter(|c| !c.running) {
                host.runtime.remove(&container.id, false).await?;
                debug!(host = %host.name, container = %container.name, "container removed");
            }
        }
        Ok(())
    }

    fn runtime_for(&self, alias: &str) -> Result<Arc<R>, ContainerError> {
        self.inner
            .workers
            .get(alias)
            .map(|&i| Arc::clone(&self.inner.hosts[i].runtime))
            .ok_or_else(|| ContainerError::UnknownWorker(alias.to_owned()))
    }

    /// Containers of one worker.
    async fn containers_of(
        runtime: &R,
        alias: &str,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        runtime.list(&format!("{LABEL_WORKER}={alias}")).await
    }

    /// Removes leftover stopped containers of `kind` so a fresh one can be created.
    async fn remove_stale(
        runtime: &R,
        containers: &[ContainerSummary],
        kind: ContainerKind,
    ) -> Result<(), ContainerError> {
        for stale in containers
            .iter()
            .filter(|c| !c.running && c.kind() == Some(kind))
        {
            runtime.remove(&stale.id, false).await?;
        }
        Ok(())
    }

    /// Creates and starts a container, returning its id.
    async fn create_and_start(
        &self,
        runtime: &R,
        alias: &str,
        kind: ContainerKind,
        args: &[String],
    ) -> Result<String, ContainerError> {
        let spec = self.container_spec(alias, kind, args);
        debug!(worker = %alias, container = %spec.name, cmd = ?spec.cmd, "creating container");
        let id = runtime.create(&spec).await?;
        runtime.start(&id).await?;
        Ok(id)
    }

    async fn run_to_completion(
        &self,
        alias: &str,
        kind: ContainerKind,
        args: &[String],
    ) -> Result<(), ContainerError> {
        let runtime = self.runtime_for(alias)?;
        let existing = Self::containers_of(&runtime, alias).await?;
        if is_worker_running(&existing) {
            info!(worker = %alias, kind = kind.as_str(), "worker is running, skipped");
            return Ok(());
        }
        // custom containers have unique names and stay until `clean`
        if kind != ContainerKind::Custom {
            Self::remove_stale(&runtime, &existing, kind).await?;
        }

        let id = self.create_and_start(&runtime, alias, kind, args).await?;
        let forwarder = tokio::spawn(forward_logs(
            runtime.stream_logs(&id),
            alias.to_owned(),
            self.inner.sender.clone(),
        ));

        let status = tokio::select! {
            _ = self.inner.cancel.cancelled() => {
                forwarder.abort();
                debug!(worker = %alias, "fleet closed while waiting for container");
                return Ok(());
            }
            status = runtime.wait(&id) => status?,
        };
        if let Err(e) = forwarder.await {
            warn!(worker = %alias, error = %e, "log forwarder failed");
        }

        report(&self.inner.sender, alias, kind, &status).await;
        Ok(())
    }

    /// Starts the run container and leaves a background task waiting on it.
    async fn launch(&self, alias: &str, args: &[String]) -> Result<(), ContainerError> {
        let runtime = self.runtime_for(alias)?;
        let existing = Self::containers_of(&runtime, alias).await?;
        if is_worker_running(&existing) {
            info!(worker = %alias, "worker already running, skipped");
            return Ok(());
        }
        Self::remove_stale(&runtime, &existing, ContainerKind::Run).await?;

        let id = self
            .create_and_start(&runtime, alias, ContainerKind::Run, args)
            .await?;
        info!(worker = %alias, container = %id, "worker started");

        let logs = runtime.stream_logs(&id);
        let sender = self.inner.sender.clone();
        let cancel = self.inner.cancel.clone();
        let alias = alias.to_owned();
        let handle = tokio::spawn(async move {
            let forwarder = tokio::spawn(forward_logs(logs, alias.clone(), sender.clone()));
            let status = tokio::select! {
                _ = cancel.cancelled() => {
                    forwarder.abort();
                    return;
                }
                status = runtime.wait(&id) => status,
            };
            if let Err(e) = forwarder.await {
                warn!(worker = %alias, error = %e, "log forwarder failed");
            }

            match status {
                Ok(status) => report(&sender, &alias, ContainerKind::Run, &status).await,
                Err(e) => warn!(worker = %alias, error = %e, "failed to wait for worker"),
            }
        });

        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
        Ok(())
    }

    async fn stop_worker(&self, alias: &str) -> Result<(), ContainerError> {
        let runtime = self.runtime_for(alias)?;
        let containers = Self::containers_of(&runtime, alias).await?;
        for container in containers
            .iter()
            .filter(|c| c.running && c.kind() == Some(ContainerKind::Run))
        {
            runtime.stop(&container.id).await?;
            info!(worker = %alias, container = %container.id, "worker stopped");
        }
        Ok(())
    }

    async fn stop_all_on(&self, host: &FleetHost<R>) -> Result<(), ContainerError> {
        let containers = host.runtime.list(&root_label()).await?;
        for container in containers.iter().filter(|c| c.running) {
            host.runtime.stop(&container.id).await?;
            debug!(host = %host.name, container = %container.name, "container stopped");
        }
        Ok(())
    }

    fn container_spec(&self, alias: &str, kind: ContainerKind, args: &[String]) -> ContainerSpec {
        let config = &self.inner.config;
        let name = match kind {
            ContainerKind::Custom => format!(
                "gauntlet-custom-{alias}-{}",
                ulid::Ulid::new().to_string().to_lowercase()
            ),
            _ => format!("gauntlet-{}-{alias}", kind.as_str()),
        };

        ContainerSpec {
            name,
            image: config.image.clone(),
            cmd: container_command(kind, args),
            labels: HashMap::from([
                (LABEL_ROOT.to_owned(), ROOT_WORKER.to_owned()),
                (LABEL_WORKER.to_owned(), alias.to_owned()),
                (LABEL_KIND.to_owned(), kind.as_str().to_owned()),
            ]),
            mounts: worker_mounts(config, alias),
            working_dir: DATA_TARGET.to_owned(),
        }
    }
}

impl<R: ContainerRuntime> WorkerControl for Fleet<R> {
    fn workers(&self) -> Vec<String> {
        Fleet::workers(self)
    }

    fn execute(
        &self,
        command: WorkerCommand,
        workers: Vec<String>,
        args: Vec<String>,
    ) -> BoxFuture<'_, Result<(), GauntletError>> {
        Box::pin(async move {
            match command {
                WorkerCommand::Init => self.init(&workers).await,
                WorkerCommand::Start => self.start(&workers, &args).await,
                WorkerCommand::Custom => self.custom(&workers, &args).await,
                WorkerCommand::Stop => self.stop(&workers).await,
            }
        })
    }
}

fn root_label() -> String {
    format!("{LABEL_ROOT}={ROOT_WORKER}")
}

fn is_worker_running(containers: &[ContainerSummary]) -> bool {
    containers
        .iter()
        .any(|c| c.running && c.kind() == Some(ContainerKind::Run))
}

/// Command line of a worker container.
fn container_command(kind: ContainerKind, args: &[String]) -> Vec<String> {
    let mut cmd = vec![RUNNER_TARGET.to_owned()];
    match kind {
        ContainerKind::Init | ContainerKind::Run => {
            cmd.extend(
                ["node", kind.as_str(), "--log-format", "json", CONFIG_TARGET]
                    .map(str::to_owned),
            );
            if kind == ContainerKind::Run {
                cmd.extend_from_slice(args);
            }
        }
        ContainerKind::Custom => cmd.extend_from_slice(args),
    }
    cmd
}

fn worker_mounts(config: &FleetConfig, alias: &str) -> Vec<BindMount> {
    let bind = |source: &Path, target: &str, read_only: bool| BindMount {
        source: source.display().to_string(),
        target: target.to_owned(),
        read_only,
    };
    vec![
        bind(&config_path(&config.base_dir, alias), CONFIG_TARGET, true),
        bind(&config.runner_path, RUNNER_TARGET, true),
        bind(&worker_dir(&config.base_dir, alias).join("data"), DATA_TARGET, false),
        bind(&config.base_dir, SHARED_TARGET, false),
    ]
}

/// Submits the run report of a finished container.
async fn report(sender: &IngestSender, alias: &str, kind: ContainerKind, status: &ExitStatus) {
    metrics::counter!(m::WORKER_RUNS_TOTAL, "kind" => kind.as_str()).increment(1);

    let failed = status.code != 0;
    let error = match (&status.error, failed) {
        (Some(e), _) => Some(format!("exited: {e}")),
        (None, true) => Some(format!(
            "abnormally exited with status code, {}",
            status.code
        )),
        (None, false) => None,
    };
    let msg = if error.is_some() {
        format!("{} worker stopped with error", kind.as_str())
    } else {
        format!("{} worker stopped without error", kind.as_str())
    };

    if failed {
        metrics::counter!(m::WORKER_FAILURES_TOTAL, "kind" => kind.as_str()).increment(1);
        warn!(worker = %alias, kind = kind.as_str(), exit_code = status.code, "worker container failed");
    } else {
        info!(worker = %alias, kind = kind.as_str(), "worker container finished");
    }

    let body = RunReport {
        kind: kind.as_str(),
        exit_code: status.code,
        error,
        msg: &msg,
    };
    match LogEntry::worker_json(alias, &body, failed) {
        Ok(entry) => {
            if let Err(e) = sender.submit(entry).await {
                warn!(worker = %alias, error = %e, "run report dropped");
            }
        }
        Err(e) => warn!(worker = %alias, error = %e, "failed to build run report"),
    }
}

/// Reassembles lines that may be split across log chunks.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Appends a chunk and returns the lines it completed.
    fn push(&mut self, bytes: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(bytes);
        let Some(last) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        chunk_lines(&complete).map(Bytes::copy_from_slice).collect()
    }

    /// Whatever is left after the stream ended.
    fn finish(&mut self) -> Option<Bytes> {
        let rest = std::mem::take(&mut self.pending);
        chunk_lines(&rest).next().map(Bytes::copy_from_slice)
    }
}

/// Forwards container output into the ingestion pipeline until the stream ends.
async fn forward_logs(
    mut stream: BoxStream<'static, Result<LogChunk, ContainerError>>,
    alias: String,
    sender: IngestSender,
) {
    let mut stdout = LineBuffer::default();
    let mut stderr = LineBuffer::default();

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(worker = %alias, error = %e, "container log stream interrupted");
                break;
            }
        };
        let buffer = if chunk.is_error {
            &mut stderr
        } else {
            &mut stdout
        };
        for line in buffer.push(&chunk.bytes) {
            if !submit_line(&sender, &alias, line, chunk.is_error).await {
                return;
            }
        }
    }

    for (buffer, is_error) in [(&mut stdout, false), (&mut stderr, true)] {
        if let Some(line) = buffer.finish() {
            if !submit_line(&sender, &alias, line, is_error).await {
                return;
            }
        }
    }
}

async fn submit_line(sender: &IngestSender, alias: &str, line: Bytes, is_error: bool) -> bool {
    let entry = match LogEntry::worker(alias, line, is_error) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(worker = %alias, error = %e, "invalid container log entry");
            return false;
        }
    };
    match sender.submit(entry).await {
        Ok(()) => true,
        Err(e) => {
            debug!(worker = %alias, error = %e, "ingestor closed, dropping container output");
            false
        }
    }
}

/// Builder for [`Fleet`].
///
/// # Examples
///
/// ```ignore
/// let fleet = FleetBuilder::new()
///     .config(FleetConfig::from_runtime(&config.runtime))
///     .sender(sender)
///     .host("localhost", BollardRuntime::connect_local()?, ["n0", "n1"])
///     .build()?;
/// ```
pub struct FleetBuilder<R: ContainerRuntime> {
    config: Option<FleetConfig>,
    sender: Option<IngestSender>,
    hosts: Vec<(String, Arc<R>, Vec<String>)>,
}

impl<R: ContainerRuntime> FleetBuilder<R> {
    pub fn new() -> Self {
        Self {
            config: None,
            sender: None,
            hosts: Vec::new(),
        }
    }

    pub fn config(mut self, config: FleetConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Where container output and run reports are submitted.
    pub fn sender(mut self, sender: IngestSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Adds a host running the given workers.
    pub fn host<I, S>(mut self, name: impl Into<String>, runtime: R, workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts.push((
            name.into(),
            Arc::new(runtime),
            workers.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Builds the fleet.
    ///
    /// # Errors
    ///
    /// Fails when the config or sender is missing, when no host was added, or
    /// when an alias is placed on more than one host.
    pub fn build(self) -> Result<Fleet<R>, ContainerError> {
        let config = self
            .config
            .ok_or_else(|| ContainerError::Setup("fleet config is required".to_owned()))?;
        let sender = self
            .sender
            .ok_or_else(|| ContainerError::Setup("ingest sender is required".to_owned()))?;
        if self.hosts.is_empty() {
            return Err(ContainerError::Setup("at least one host is required".to_owned()));
        }

        let mut hosts = Vec::with_capacity(self.hosts.len());
        let mut workers = BTreeMap::new();
        for (index, (name, runtime, aliases)) in self.hosts.into_iter().enumerate() {
            for alias in aliases {
                if alias.is_empty() {
                    return Err(ContainerError::Setup(format!(
                        "empty worker alias on host {name}"
                    )));
                }
                if workers.insert(alias.clone(), index).is_some() {
                    return Err(ContainerError::DuplicateWorker(alias));
                }
            }
            hosts.push(FleetHost { name, runtime });
        }

        Ok(Fleet {
            inner: Arc::new(FleetInner {
                config,
                hosts,
                workers,
                sender,
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl<R: ContainerRuntime> Default for FleetBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gauntlet_core::exit::exit_channel;
    use gauntlet_core::pipeline::Pipeline;
    use gauntlet_log_pipeline::{IngestConfigBuilder, LogIngestor, LogIngestorBuilder};
    use gauntlet_storage::{MemoryStore, Storage};

    use super::*;
    use crate::mock::MockRuntime;

    struct Harness {
        _dir: tempfile::TempDir,
        base: PathBuf,
        memory: MemoryStore,
        ingestor: LogIngestor,
        sender: IngestSender,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::new();
        let config = IngestConfigBuilder::new()
            .log_dir(dir.path().join("logs"))
            .flush_interval(Duration::from_millis(10))
            .build()
            .unwrap();
        let (exit_tx, _exit_rx) = exit_channel();
        let (mut ingestor, sender) = LogIngestorBuilder::new()
            .config(config)
            .storage(Storage::Memory(memory.clone()))
            .exit_sender(exit_tx)
            .workers(["n0", "n1"])
            .build()
            .await
            .unwrap();
        ingestor.start().await.unwrap();

        Harness {
            base: dir.path().join("workers"),
            _dir: dir,
            memory,
            ingestor,
            sender,
        }
    }

    fn fleet(h: &Harness, runtime: MockRuntime) -> Fleet<MockRuntime> {
        FleetBuilder::new()
            .config(FleetConfig {
                image: "debian:testing-slim".to_owned(),
                runner_path: PathBuf::from("/opt/runner"),
                base_dir: h.base.clone(),
            })
            .sender(h.sender.clone())
            .host("localhost", runtime, ["n0", "n1"])
            .build()
            .unwrap()
    }

    /// Stops the ingestor so every submitted entry is flushed, then returns them.
    async fn documents(mut h: Harness) -> Vec<Value> {
        h.ingestor.stop().await.unwrap();
        h.memory
            .documents("log")
            .into_iter()
            .map(Value::Object)
            .collect()
    }

    fn reports(docs: &[Value]) -> Vec<&Value> {
        docs.iter().filter(|d| d["x"]["exit_code"].is_i64()).collect()
    }

    #[test]
    fn container_commands() {
        assert_eq!(
            container_command(ContainerKind::Init, &["ignored".to_owned()]),
            ["/runner", "node", "init", "--log-format", "json", "/config.yml"]
        );
        assert_eq!(
            container_command(ContainerKind::Run, &["--debug".to_owned()]),
            ["/runner", "node", "run", "--log-format", "json", "/config.yml", "--debug"]
        );
        assert_eq!(
            container_command(ContainerKind::Custom, &["version".to_owned()]),
            ["/runner", "version"]
        );
    }

    #[test]
    fn line_buffer_joins_split_lines() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"hel").is_empty());
        assert_eq!(buffer.push(b"lo\nwor"), vec![Bytes::from_static(b"hello")]);
        assert!(buffer.push(b"ld").is_empty());
        assert_eq!(buffer.finish(), Some(Bytes::from_static(b"world")));
        assert_eq!(buffer.finish(), None);
    }

    #[tokio::test]
    async fn build_rejects_alias_on_two_hosts() {
        let h = harness().await;
        let result = FleetBuilder::new()
            .config(FleetConfig {
                image: "img".to_owned(),
                runner_path: PathBuf::from("/runner"),
                base_dir: h.base.clone(),
            })
            .sender(h.sender.clone())
            .host("a", MockRuntime::new(), ["n0"])
            .host("b", MockRuntime::new(), ["n0"])
            .build();
        assert!(matches!(result, Err(ContainerError::DuplicateWorker(a)) if a == "n0"));
    }

    #[tokio::test]
    async fn select_validates_aliases() {
        let h = harness().await;
        let fleet = fleet(&h, MockRuntime::new());

        assert_eq!(fleet.select(&[]).unwrap(), ["n0", "n1"]);
        assert_eq!(fleet.select(&["n1".to_owned()]).unwrap(), ["n1"]);
        assert!(matches!(
            fleet.select(&["n9".to_owned()]),
            Err(ContainerError::UnknownWorker(_))
        ));
        assert!(matches!(
            fleet.select(&["n0".to_owned(), "n0".to_owned()]),
            Err(ContainerError::DuplicateWorker(_))
        ));
    }

    #[tokio::test]
    async fn prepare_writes_configs_and_publishes_vars() {
        let h = harness().await;
        let fleet = fleet(&h, MockRuntime::new());
        let design = Design::parse(
            r#"
storage: mongodb://127.0.0.1:27017/test
worker-config:
  common: |
    network: devnet
    self: "{{ .Self.Alias }}"
  n0: |
    _address: "{{ .Self.Alias }}:4320"
    node-id: 0
  n1: |
    _address: "{{ .Self.Alias }}:4321"
sequences:
  - condition: '{"m": "gauntlet ready"}'
"#,
        )
        .unwrap();
        let vars = Vars::new();

        fleet
            .prepare(&design, &vars, "mongodb://db:27017/workers")
            .await
            .unwrap();

        let written = std::fs::read_to_string(config_path(&h.base, "n0")).unwrap();
        assert!(written.contains("network: devnet"));
        assert!(written.contains("self: n0"));
        assert!(!written.contains("_address"));

        assert_eq!(
            vars.get("Design.Shared.address"),
            Some(json!({"n0": "n0:4320", "n1": "n1:4321"}))
        );
        assert_eq!(vars.get("Design.Worker.n0.NodeID"), Some(json!(0)));
        assert_eq!(
            vars.get("Runtime.Worker.n1.Storage.URI"),
            Some(json!("mongodb://db:27017/workers"))
        );
        assert!(!vars.exists("Self"));
    }

    #[tokio::test]
    async fn init_reports_exit_codes_and_forwards_output() {
        let h = harness().await;
        let runtime = MockRuntime::new()
            .with_exit_code("n1", 2)
            .with_logs("n0", &[("booting", false), ("{\"height\": 1}", false)])
            .with_logs("n1", &[("bad genesis", true)]);
        let fleet = fleet(&h, runtime.clone());

        fleet.init(&[]).await.unwrap();
        let docs = documents(h).await;

        let n0: Vec<&Value> = docs.iter().filter(|d| d["worker"] == "n0").collect();
        assert_eq!(n0[0]["x"], json!("booting"));
        assert_eq!(n0[1]["x"], json!({"height": 1}));

        let reports = reports(&docs);
        assert_eq!(reports.len(), 2);
        let failed = reports.iter().find(|d| d["worker"] == "n1").unwrap();
        assert_eq!(failed["is_error"], json!(true));
        assert_eq!(failed["x"]["exit_code"], json!(2));
        assert_eq!(failed["x"]["kind"], json!("init"));

        assert!(docs.iter().any(|d| {
            d["worker"] == "n1" && d["x"] == "bad genesis" && d["is_error"] == true
        }));
    }

    #[tokio::test]
    async fn start_runs_in_background_until_stopped() {
        let h = harness().await;
        let runtime = MockRuntime::new();
        let fleet = fleet(&h, runtime.clone());

        fleet.start(&["n0".to_owned()], &[]).await.unwrap();
        let running: Vec<_> = runtime
            .containers()
            .into_iter()
            .filter(|(_, running)| *running)
            .collect();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].0.worker(), Some("n0"));
        assert_eq!(running[0].0.kind(), Some(ContainerKind::Run));

        // already running: nothing new is created
        fleet.start(&["n0".to_owned()], &[]).await.unwrap();
        let creates = runtime
            .calls()
            .iter()
            .filter(|c| c.starts_with("create:"))
            .count();
        assert_eq!(creates, 1);

        fleet.stop(&[]).await.unwrap();
        assert!(runtime.containers().iter().all(|(_, running)| !running));

        fleet.close().await.unwrap();
        let docs = documents(h).await;
        let reports = reports(&docs);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["x"]["kind"], json!("run"));
    }

    #[tokio::test]
    async fn custom_passes_args_and_keeps_unique_names() {
        let h = harness().await;
        let runtime = MockRuntime::new();
        let fleet = fleet(&h, runtime.clone());
        let args = vec!["key".to_owned(), "new".to_owned()];

        fleet.custom(&["n1".to_owned()], &args).await.unwrap();
        fleet.custom(&["n1".to_owned()], &args).await.unwrap();

        let containers = runtime.containers();
        assert_eq!(containers.len(), 2);
        assert_ne!(containers[0].0.name, containers[1].0.name);
        assert_eq!(containers[0].0.cmd, ["/runner", "key", "new"]);
        drop(documents(h).await);
    }

    #[tokio::test]
    async fn close_then_clean_removes_everything() {
        let h = harness().await;
        let runtime = MockRuntime::new();
        let fleet = fleet(&h, runtime.clone());

        fleet.init(&[]).await.unwrap();
        fleet.start(&[], &[]).await.unwrap();
        assert_eq!(runtime.containers().len(), 4);

        fleet.close().await.unwrap();
        fleet.clean().await.unwrap();
        assert!(runtime.containers().is_empty());
        drop(documents(h).await);
    }

    #[tokio::test]
    async fn stop_running_keeps_the_fleet_usable() {
        let h = harness().await;
        let runtime = MockRuntime::new();
        let fleet = fleet(&h, runtime.clone());

        fleet.start(&[], &[]).await.unwrap();
        fleet.stop_running().await.unwrap();
        assert!(runtime.containers().iter().all(|(_, running)| !running));

        fleet.start(&[], &[]).await.unwrap();
        let running = runtime.containers().iter().filter(|(_, r)| *r).count();
        assert_eq!(running, 2);

        fleet.close().await.unwrap();
        drop(documents(h).await);
    }

    #[tokio::test]
    async fn create_failure_is_an_action_error() {
        let h = harness().await;
        let fleet = fleet(&h, MockRuntime::new().with_failing_create());

        let err = fleet.init(&["n0".to_owned()]).await.unwrap_err();
        assert!(err.to_string().contains("mock create failure"));
        drop(documents(h).await);
    }

    #[tokio::test]
    async fn worker_control_dispatches_commands() {
        let h = harness().await;
        let runtime = MockRuntime::new();
        let fleet = fleet(&h, runtime.clone());
        let control: Arc<dyn WorkerControl> = Arc::new(fleet.clone());

        assert_eq!(control.workers(), ["n0", "n1"]);
        control
            .execute(WorkerCommand::Start, vec!["n1".to_owned()], Vec::new())
            .await
            .unwrap();
        assert!(
            runtime
                .containers()
                .iter()
                .any(|(spec, running)| *running && spec.worker() == Some("n1"))
        );

        let err = control
            .execute(WorkerCommand::Stop, vec!["nx".to_owned()], Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GauntletError::Action(_)));

        fleet.close().await.unwrap();
        drop(documents(h).await);
    }
}
