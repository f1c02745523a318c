//! Container runtime error types.
//!
//! [`ContainerError`] converts into [`GauntletError`] so fleet operations can
//! be propagated from scenario actions with `?`.

use gauntlet_core::error::{ActionError, ConfigError, GauntletError, TemplateError};

/// Container runtime domain error.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker API call failed
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Could not reach the Docker daemon
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// Container does not exist
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Alias is not managed by this fleet
    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    /// Same alias listed twice in one command
    #[error("duplicated worker: {0}")]
    DuplicateWorker(String),

    /// Fleet was built with missing or conflicting parts
    #[error("fleet setup error: {0}")]
    Setup(String),

    /// Worker config could not be rendered
    #[error("worker config error for '{alias}': {reason}")]
    Render {
        /// Worker alias
        alias: String,
        /// Failure reason
        reason: String,
    },

    /// Template expansion failed while rendering
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Filesystem error (config files, data dirs)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ContainerError> for GauntletError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::Template(e) => GauntletError::Template(e),
            ContainerError::Io(e) => GauntletError::Io(e),
            ContainerError::Render { alias, reason } => {
                GauntletError::Config(ConfigError::invalid(format!("worker-config.{alias}"), reason))
            }
            ContainerError::Setup(reason) => {
                GauntletError::Config(ConfigError::invalid("runtime", reason))
            }
            ContainerError::UnknownWorker(alias) | ContainerError::DuplicateWorker(alias) => {
                GauntletError::Action(ActionError::InvalidArgs {
                    action: "workers".to_owned(),
                    reason: format!("invalid worker '{alias}'"),
                })
            }
            other => GauntletError::Action(ActionError::Execution {
                action: "container".to_owned(),
                reason: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_errors_become_action_errors() {
        let err: GauntletError = ContainerError::DockerApi("boom".to_owned()).into();
        assert!(matches!(
            err,
            GauntletError::Action(ActionError::Execution { .. })
        ));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn render_errors_point_at_the_worker_config() {
        let err: GauntletError = ContainerError::Render {
            alias: "n0".to_owned(),
            reason: "not a mapping".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("worker-config.n0"));
    }

    #[test]
    fn unknown_worker_is_invalid_args() {
        let err: GauntletError = ContainerError::UnknownWorker("n9".to_owned()).into();
        assert!(matches!(
            err,
            GauntletError::Action(ActionError::InvalidArgs { .. })
        ));
    }
}
