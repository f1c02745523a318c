//! Container runtime abstraction.
//!
//! The fleet only needs a handful of container operations. They are collected
//! in [`ContainerRuntime`] so production code uses [`BollardRuntime`] while
//! tests use `MockRuntime`.
//!
//! ```text
//!        Fleet
//!          |
//!  ContainerRuntime (trait)
//!      |          |
//!   Bollard      Mock
//!      |
//!  Docker daemon (local socket or tcp://host:port)
//! ```
//!
//! [`BollardRuntime`]: crate::docker::BollardRuntime

use std::collections::HashMap;
use std::future::Future;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::ContainerError;

/// Label present on every container started by gauntlet.
pub const LABEL_ROOT: &str = "gauntlet";

/// Label holding the worker alias.
pub const LABEL_WORKER: &str = "gauntlet.worker";

/// Label holding the container kind (`init`, `run`, `custom`).
pub const LABEL_KIND: &str = "gauntlet.kind";

/// Value of [`LABEL_ROOT`] for worker containers.
pub const ROOT_WORKER: &str = "worker";

/// What a worker container is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// One-shot initialisation run
    Init,
    /// Long-running worker process
    Run,
    /// One-shot run with user arguments
    Custom,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Run => "run",
            Self::Custom => "custom",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "init" => Some(Self::Init),
            "run" => Some(Self::Run),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Host path bound into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Everything needed to create a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub labels: HashMap<String, String>,
    pub mounts: Vec<BindMount>,
    pub working_dir: String,
}

impl ContainerSpec {
    /// Alias from the worker label, if any.
    pub fn worker(&self) -> Option<&str> {
        self.labels.get(LABEL_WORKER).map(String::as_str)
    }

    pub fn kind(&self) -> Option<ContainerKind> {
        self.labels
            .get(LABEL_KIND)
            .and_then(|k| ContainerKind::from_label(k))
    }
}

/// Container as reported by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
}

impl ContainerSummary {
    pub fn worker(&self) -> Option<&str> {
        self.labels.get(LABEL_WORKER).map(String::as_str)
    }

    pub fn kind(&self) -> Option<ContainerKind> {
        self.labels
            .get(LABEL_KIND)
            .and_then(|k| ContainerKind::from_label(k))
    }
}

/// Outcome of waiting for a container to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i64,
    /// Error reported by the runtime itself, not the process
    pub error: Option<String>,
}

impl ExitStatus {
    pub fn success() -> Self {
        Self {
            code: 0,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0 && self.error.is_none()
    }
}

/// One chunk of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    /// Came from stderr
    pub is_error: bool,
    pub bytes: Bytes,
}

/// Container operations used by the fleet.
///
/// Implementations must be cheap to share (`Send + Sync + 'static`); the
/// fleet keeps them behind an `Arc` and calls them from spawned tasks.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Creates a container and returns its id.
    fn create(
        &self,
        spec: &ContainerSpec,
    ) -> impl Future<Output = Result<String, ContainerError>> + Send;

    fn start(&self, id: &str) -> impl Future<Output = Result<(), ContainerError>> + Send;

    /// Waits until the container is no longer running.
    fn wait(&self, id: &str) -> impl Future<Output = Result<ExitStatus, ContainerError>> + Send;

    /// Follows stdout and stderr from the beginning until the container stops.
    fn stream_logs(&self, id: &str) -> BoxStream<'static, Result<LogChunk, ContainerError>>;

    fn stop(&self, id: &str) -> impl Future<Output = Result<(), ContainerError>> + Send;

    /// Removes a container. `force` also removes running ones.
    fn remove(&self, id: &str, force: bool)
    -> impl Future<Output = Result<(), ContainerError>> + Send;

    /// Lists containers, running or not, carrying the given label
    /// (`key` or `key=value`).
    fn list(
        &self,
        label: &str,
    ) -> impl Future<Output = Result<Vec<ContainerSummary>, ContainerError>> + Send;

    /// Checks that the daemon is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), ContainerError>> + Send;
}

/// Splits a log chunk into non-empty lines.
pub fn chunk_lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes
        .split(|b| *b == b'\n')
        .map(gauntlet_log_pipeline::collector::trim_line_ending)
        .filter(|line| !line.is_empty())
}
