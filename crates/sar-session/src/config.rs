//! Session loop configuration.

use sar_core::DroneIdentity;
use std::time::Duration;

/// Configuration for the streaming session loop.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed cadence of the tick loop.
    pub tick_interval: Duration,
    /// Bound on each external adapter call (frame capture, inference,
    /// telemetry, store writes). An unresponsive adapter must not stall the
    /// loop indefinitely.
    pub adapter_timeout: Duration,
    /// Bound on each individual mission-script controller call.
    pub mission_step_timeout: Duration,
    /// Store real coordinates in status rows. When false the location is
    /// absent, never a placeholder pair.
    pub report_position: bool,
    /// Idle period after which the agent bridge sends a timeout notice.
    pub agent_idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            adapter_timeout: Duration::from_secs(2),
            mission_step_timeout: Duration::from_secs(7),
            report_position: true,
            agent_idle_timeout: Duration::from_secs(120),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let tick_interval = std::env::var("TICK_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);

        let report_position = std::env::var("REPORT_POSITION")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(defaults.report_position);

        Self {
            tick_interval,
            report_position,
            ..defaults
        }
    }
}

/// Static roster of controller identities known to this deployment.
///
/// Without real multi-drone support this list degenerates to a configured or
/// empty set; it is served as-is, never fabricated from live state.
#[derive(Debug, Clone, Default)]
pub struct FleetConfig {
    pub known_drones: Vec<DroneIdentity>,
}

impl FleetConfig {
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_drones: names.into_iter().map(DroneIdentity::new).collect(),
        }
    }

    pub fn from_env() -> Self {
        match std::env::var("KNOWN_DRONES") {
            Ok(raw) if !raw.trim().is_empty() => {
                Self::with_names(raw.split(',').map(|s| s.trim().to_string()))
            }
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cadence_is_100ms() {
        let config = SessionConfig::default();
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.agent_idle_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_fleet_defaults_to_empty() {
        assert!(FleetConfig::default().known_drones.is_empty());
    }

    #[test]
    fn test_fleet_with_names() {
        let fleet = FleetConfig::with_names(["Drone 1", "Drone 2"]);
        assert_eq!(fleet.known_drones.len(), 2);
        assert_eq!(fleet.known_drones[0].name, "Drone 1");
        assert!(!fleet.known_drones[0].is_connected);
    }
}
