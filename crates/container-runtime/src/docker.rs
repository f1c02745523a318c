//! Docker implementation of [`ContainerRuntime`] on top of `bollard`.
//!
//! # Examples
//!
//! ```ignore
//! use gauntlet_container::BollardRuntime;
//!
//! // Local daemon through the default socket
//! let local = BollardRuntime::connect_local()?;
//!
//! // Remote host exposing the Docker API over TCP
//! let remote = BollardRuntime::connect_remote("10.0.0.7", 2375)?;
//! # Ok::<(), gauntlet_container::ContainerError>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::error::ContainerError;
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerSummary, ExitStatus, LogChunk};

/// Seconds a container gets between SIGTERM and SIGKILL on stop.
const STOP_GRACE_SECS: i64 = 10;

/// Connection timeout passed to bollard, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 120;

fn api_error(op: &str, id: &str, e: BollardError) -> ContainerError {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => ContainerError::ContainerNotFound(id.to_owned()),
        other => ContainerError::DockerApi(format!("{op} {id} failed: {other}")),
    }
}

/// Production runtime talking to a Docker daemon.
///
/// Internally holds an `Arc<bollard::Docker>` so it can be shared across tasks.
#[derive(Clone)]
pub struct BollardRuntime {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntime {
    /// Connects using the platform's default local socket.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::DockerConnection` if the client cannot be built.
    pub fn connect_local() -> Result<Self, ContainerError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ContainerError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects using a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, ContainerError> {
        let docker = bollard::Docker::connect_with_socket(
            socket_path,
            CONNECT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            ContainerError::DockerConnection(format!(
                "failed to connect to docker at {socket_path}: {e}"
            ))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to a remote daemon at `tcp://host:port`.
    pub fn connect_remote(host: &str, port: u16) -> Result<Self, ContainerError> {
        let addr = format!("tcp://{host}:{port}");
        let docker = bollard::Docker::connect_with_http(
            &addr,
            CONNECT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            ContainerError::DockerConnection(format!("failed to connect to docker at {addr}: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }
}

impl ContainerRuntime for BollardRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        let mounts = spec
            .mounts
            .iter()
            .map(|m| Mount {
                source: Some(m.source.clone()),
                target: Some(m.target.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            labels: Some(spec.labels.clone()),
            working_dir: Some(spec.working_dir.clone()),
            tty: Some(false),
            host_config: Some(HostConfig {
                mounts: Some(mounts),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| api_error("create", &spec.name, e))?;
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), ContainerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| api_error("start", id, e))
    }

    async fn wait(&self, id: &str) -> Result<ExitStatus, ContainerError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(ExitStatus {
                code: response.status_code,
                error: response
                    .error
                    .and_then(|e| e.message)
                    .filter(|m| !m.is_empty()),
            }),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { error, code })) => Ok(ExitStatus {
                code,
                error: (!error.is_empty()).then_some(error),
            }),
            Some(Err(e)) => Err(api_error("wait", id, e)),
            None => Err(ContainerError::DockerApi(format!(
                "wait {id} ended without a status"
            ))),
        }
    }

    fn stream_logs(&self, id: &str) -> BoxStream<'static, Result<LogChunk, ContainerError>> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            tail: "all".to_owned(),
            ..Default::default()
        };
        let label = id.to_owned();

        self.docker
            .logs(id, Some(options))
            .filter_map(move |item| {
                let chunk = match item {
                    Ok(LogOutput::StdErr { message }) => Some(Ok(LogChunk {
                        is_error: true,
                        bytes: message,
                    })),
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        Some(Ok(LogChunk {
                            is_error: false,
                            bytes: message,
                        }))
                    }
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(ContainerError::DockerApi(format!(
                        "logs {label} failed: {e}"
                    )))),
                };
                futures::future::ready(chunk)
            })
            .boxed()
    }

    async fn stop(&self, id: &str) -> Result<(), ContainerError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
            .map_err(|e| api_error("stop", id, e))
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), ContainerError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| api_error("remove", id, e))
    }

    async fn list(&self, label: &str) -> Result<Vec<ContainerSummary>, ContainerError> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([("label".to_owned(), vec![label.to_owned()])]),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| ContainerError::DockerApi(format!("list containers failed: {e}")))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default();
                ContainerSummary {
                    id: c.id.unwrap_or_default(),
                    name,
                    labels: c.labels.unwrap_or_default(),
                    running: c.state.as_deref() == Some("running"),
                }
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), ContainerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}
