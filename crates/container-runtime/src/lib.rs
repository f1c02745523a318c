#![doc = include_str!("../README.md")]

pub mod docker;
pub mod error;
pub mod fleet;
#[cfg(test)]
mod mock;
pub mod render;
pub mod runtime;

pub use docker::BollardRuntime;
pub use error::ContainerError;
pub use fleet::{Fleet, FleetBuilder, FleetConfig};
pub use render::{RenderedConfig, render_worker_config, write_worker_config};
pub use runtime::{
    BindMount, ContainerKind, ContainerRuntime, ContainerSpec, ContainerSummary, ExitStatus,
    LogChunk,
};
