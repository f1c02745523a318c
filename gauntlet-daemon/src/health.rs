//! Aggregated health reporting.
//!
//! The overall status is the worst status among the run's components.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use gauntlet_core::pipeline::HealthStatus;

/// Health status of one component ("log-ingestor", "scenario-watcher").
#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: HealthStatus,
}

impl ComponentHealth {
    pub fn new(name: &'static str, status: HealthStatus) -> Self {
        Self { name, status }
    }
}

/// Returns the worst status found, with every non-healthy reason joined.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut unhealthy = false;
    let mut reasons = Vec::new();

    for component in components {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                reasons.push(format!("{}: {}", component.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy = true;
                reasons.push(format!("{}: {}", component.name, reason));
            }
        }
    }

    match (unhealthy, reasons.is_empty()) {
        (_, true) => HealthStatus::Healthy,
        (true, false) => HealthStatus::Unhealthy(reasons.join("; ")),
        (false, false) => HealthStatus::Degraded(reasons.join("; ")),
    }
}
