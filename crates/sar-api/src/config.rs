//! Server configuration.

use sar_agent::AgentConfig;
use sar_db::DbConfig;
use sar_detector::DetectorConfig;
use sar_session::{FleetConfig, SessionConfig};

/// Top-level configuration, assembled from the environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// HTTP read API port.
    pub api_port: u16,
    /// Streaming session WebSocket port.
    pub stream_port: u16,
    /// Agent bridge WebSocket port.
    pub agent_port: u16,
    /// Enable CORS for all origins (development).
    pub cors_permissive: bool,
    /// Use simulated adapters instead of real hardware and model weights.
    pub simulation_mode: bool,
    /// Path to the detection model weights (used with the `opencv` feature).
    pub model_path: Option<String>,
    pub db: DbConfig,
    pub session: SessionConfig,
    pub fleet: FleetConfig,
    pub detector: DetectorConfig,
    pub agent: AgentConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_port: 3000,
            stream_port: 8000,
            agent_port: 8001,
            cors_permissive: true,
            simulation_mode: true,
            model_path: None,
            db: DbConfig::default(),
            session: SessionConfig::default(),
            fleet: FleetConfig::default(),
            detector: DetectorConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let port = |name: &str, fallback: u16| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(fallback)
        };

        let cors_permissive = std::env::var("CORS_PERMISSIVE")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(true);

        let simulation_mode = std::env::var("SIMULATION_MODE")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(true);

        Self {
            api_port: port("API_PORT", 3000),
            stream_port: port("STREAM_PORT", 8000),
            agent_port: port("AGENT_PORT", 8001),
            cors_permissive,
            simulation_mode,
            model_path: std::env::var("MODEL_PATH").ok(),
            db: DbConfig::from_env(),
            session: SessionConfig::from_env(),
            fleet: FleetConfig::from_env(),
            detector: DetectorConfig::from_env(),
            agent: AgentConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports_are_distinct() {
        let config = ApiConfig::default();
        assert_ne!(config.api_port, config.stream_port);
        assert_ne!(config.stream_port, config.agent_port);
        assert!(config.simulation_mode);
    }
}
