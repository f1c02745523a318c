//! In-memory container runtime for tests.
//!
//! One-shot containers (`init`, `custom`) exit as soon as they are started with
//! the exit code configured for their worker. `run` containers keep running
//! until `stop` is called.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;

use crate::error::ContainerError;
use crate::runtime::{
    ContainerKind, ContainerRuntime, ContainerSpec, ContainerSummary, ExitStatus, LogChunk,
};

struct MockContainer {
    spec: ContainerSpec,
    running: bool,
    exit: watch::Sender<Option<i64>>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    containers: BTreeMap<String, MockContainer>,
    exit_codes: HashMap<String, i64>,
    logs: HashMap<String, Vec<LogChunk>>,
    calls: Vec<String>,
    fail_create: bool,
}

/// Mock runtime with configurable exit codes and log output per worker.
#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exit code of one-shot containers for `alias`.
    pub fn with_exit_code(self, alias: &str, code: i64) -> Self {
        self.lock().exit_codes.insert(alias.to_owned(), code);
        self
    }

    /// Output every container of `alias` produces.
    pub fn with_logs(self, alias: &str, lines: &[(&str, bool)]) -> Self {
        let chunks = lines
            .iter()
            .map(|(line, is_error)| LogChunk {
                is_error: *is_error,
                bytes: Bytes::from(format!("{line}\n")),
            })
            .collect();
        self.lock().logs.insert(alias.to_owned(), chunks);
        self
    }

    pub fn with_failing_create(self) -> Self {
        self.lock().fail_create = true;
        self
    }

    /// Calls in order, as `op:target`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// `(spec, running)` of every container still present.
    pub fn containers(&self) -> Vec<(ContainerSpec, bool)> {
        self.lock()
            .containers
            .values()
            .map(|c| (c.spec.clone(), c.running))
            .collect()
    }

    fn exit_code_for(state: &MockState, spec: &ContainerSpec) -> i64 {
        spec.worker()
            .and_then(|alias| state.exit_codes.get(alias).copied())
            .unwrap_or(0)
    }
}

fn label_matches(labels: &HashMap<String, String>, filter: &str) -> bool {
    match filter.split_once('=') {
        Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
        None => labels.contains_key(filter),
    }
}

impl ContainerRuntime for MockRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        let mut state = self.lock();
        state.calls.push(format!("create:{}", spec.name));
        if state.fail_create {
            return Err(ContainerError::DockerApi("mock create failure".to_owned()));
        }

        state.next_id += 1;
        let id = format!("{:012x}", state.next_id);
        let (exit, _) = watch::channel(None);
        state.containers.insert(
            id.clone(),
            MockContainer {
                spec: spec.clone(),
                running: false,
                exit,
            },
        );
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), ContainerError> {
        let mut state = self.lock();
        state.calls.push(format!("start:{id}"));
        let Some(container) = state.containers.get(id) else {
            return Err(ContainerError::ContainerNotFound(id.to_owned()));
        };
        let one_shot = container.spec.kind() != Some(ContainerKind::Run);
        let code = Self::exit_code_for(&state, &container.spec);

        if let Some(container) = state.containers.get_mut(id) {
            if one_shot {
                container.running = false;
                container.exit.send_replace(Some(code));
            } else {
                container.running = true;
                container.exit.send_replace(None);
            }
        }
        Ok(())
    }

    async fn wait(&self, id: &str) -> Result<ExitStatus, ContainerError> {
        let mut rx = {
            let state = self.lock();
            let container = state
                .containers
                .get(id)
                .ok_or_else(|| ContainerError::ContainerNotFound(id.to_owned()))?;
            container.exit.subscribe()
        };

        let exit = *rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ContainerError::ContainerNotFound(id.to_owned()))?;
        Ok(ExitStatus {
            code: exit.unwrap_or_default(),
            error: None,
        })
    }

    fn stream_logs(&self, id: &str) -> BoxStream<'static, Result<LogChunk, ContainerError>> {
        let state = self.lock();
        let chunks = state
            .containers
            .get(id)
            .and_then(|c| c.spec.worker())
            .and_then(|alias| state.logs.get(alias))
            .cloned()
            .unwrap_or_default();
        futures::stream::iter(chunks.into_iter().map(Ok)).boxed()
    }

    async fn stop(&self, id: &str) -> Result<(), ContainerError> {
        let mut state = self.lock();
        state.calls.push(format!("stop:{id}"));
        let code = match state.containers.get(id) {
            Some(c) => Self::exit_code_for(&state, &c.spec),
            None => return Err(ContainerError::ContainerNotFound(id.to_owned())),
        };
        if let Some(container) = state.containers.get_mut(id) {
            container.running = false;
            let pending = container.exit.borrow().is_none();
            if pending {
                container.exit.send_replace(Some(code));
            }
        }
        Ok(())
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), ContainerError> {
        let mut state = self.lock();
        state.calls.push(format!("remove:{id}"));
        let running = match state.containers.get(id) {
            Some(c) => c.running,
            None => return Err(ContainerError::ContainerNotFound(id.to_owned())),
        };
        if running && !force {
            return Err(ContainerError::DockerApi(format!(
                "container {id} is running"
            )));
        }
        state.containers.remove(id);
        Ok(())
    }

    async fn list(&self, label: &str) -> Result<Vec<ContainerSummary>, ContainerError> {
        let state = self.lock();
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| label_matches(&c.spec.labels, label))
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                name: c.spec.name.clone(),
                labels: c.spec.labels.clone(),
                running: c.running,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), ContainerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{LABEL_KIND, LABEL_WORKER};

    fn spec(alias: &str, kind: ContainerKind) -> ContainerSpec {
        ContainerSpec {
            name: format!("gauntlet-{}-{alias}", kind.as_str()),
            image: "debian:testing-slim".to_owned(),
            cmd: vec!["/runner".to_owned()],
            labels: HashMap::from([
                (LABEL_WORKER.to_owned(), alias.to_owned()),
                (LABEL_KIND.to_owned(), kind.as_str().to_owned()),
            ]),
            mounts: Vec::new(),
            working_dir: "/".to_owned(),
        }
    }

    #[tokio::test]
    async fn one_shot_exits_with_configured_code() {
        let runtime = MockRuntime::new().with_exit_code("n0", 3);
        let id = runtime.create(&spec("n0", ContainerKind::Init)).await.unwrap();
        runtime.start(&id).await.unwrap();
        assert_eq!(runtime.wait(&id).await.unwrap().code, 3);
    }

    #[tokio::test]
    async fn run_container_waits_for_stop() {
        let runtime = MockRuntime::new();
        let id = runtime.create(&spec("n0", ContainerKind::Run)).await.unwrap();
        runtime.start(&id).await.unwrap();

        let waiter = {
            let runtime = runtime.clone();
            let id = id.clone();
            tokio::spawn(async move { runtime.wait(&id).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        runtime.stop(&id).await.unwrap();
        assert!(waiter.await.unwrap().unwrap().is_success());
    }

    #[tokio::test]
    async fn list_filters_by_label() {
        let runtime = MockRuntime::new();
        runtime.create(&spec("n0", ContainerKind::Run)).await.unwrap();
        runtime.create(&spec("n1", ContainerKind::Init)).await.unwrap();

        assert_eq!(runtime.list(LABEL_WORKER).await.unwrap().len(), 2);
        assert_eq!(runtime.list("gauntlet.kind=run").await.unwrap().len(), 1);
        assert!(runtime.list("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_refuses_running_without_force() {
        let runtime = MockRuntime::new();
        let id = runtime.create(&spec("n0", ContainerKind::Run)).await.unwrap();
        runtime.start(&id).await.unwrap();
        assert!(runtime.remove(&id, false).await.is_err());
        runtime.remove(&id, true).await.unwrap();
        assert!(runtime.containers().is_empty());
    }
}
