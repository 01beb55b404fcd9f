//! Health reporting derived from slot states and shutdown state.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::models::{SlotState, StatusRegistry};
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub accepting_requests: bool,
    pub slots_loaded: usize,
    pub slots_ready: usize,
    pub slots_loading: usize,
    pub slots_failed: usize,
    pub in_flight: u32,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone, Default)]
pub struct HealthConfig {
    /// Report degraded until at least one slot holds a model.
    pub require_model_loaded: bool,
}

/// Aggregates health information from runtime components.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Generate full health report.
    pub fn report(
        &self,
        shutdown_state: ShutdownState,
        status: &StatusRegistry,
        slots_loaded: usize,
        in_flight: u32,
    ) -> HealthReport {
        let accepting = shutdown_state == ShutdownState::Running;
        let slots_failed = status.count(SlotState::Error);

        let state = if !accepting {
            HealthState::Unhealthy
        } else if slots_failed > 0 || (self.config.require_model_loaded && slots_loaded == 0) {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthReport {
            status: state,
            accepting_requests: accepting,
            slots_loaded,
            slots_ready: status.count(SlotState::Ready),
            slots_loading: status.count(SlotState::Loading),
            slots_failed,
            in_flight,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotKind;

    #[test]
    fn fresh_runtime_is_healthy() {
        let checker = HealthChecker::default();
        let report = checker.report(ShutdownState::Running, &StatusRegistry::new(), 0, 0);
        assert_eq!(report.status, HealthState::Healthy);
        assert!(report.accepting_requests);
    }

    #[test]
    fn failed_slot_degrades() {
        let status = StatusRegistry::new();
        status.set(SlotKind::Vision, SlotState::Error, "Error: boom", Some("v"));
        let report = HealthChecker::default().report(ShutdownState::Running, &status, 0, 0);
        assert_eq!(report.status, HealthState::Degraded);
        assert_eq!(report.slots_failed, 1);
    }

    #[test]
    fn draining_is_unhealthy() {
        let report =
            HealthChecker::default().report(ShutdownState::Draining, &StatusRegistry::new(), 0, 2);
        assert_eq!(report.status, HealthState::Unhealthy);
        assert!(!report.accepting_requests);
        assert_eq!(report.in_flight, 2);
    }

    #[test]
    fn model_requirement_is_optional() {
        let checker = HealthChecker::new(HealthConfig {
            require_model_loaded: true,
        });
        let report = checker.report(ShutdownState::Running, &StatusRegistry::new(), 0, 0);
        assert_eq!(report.status, HealthState::Degraded);
    }
}
