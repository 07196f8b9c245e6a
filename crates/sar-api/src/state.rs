//! Application state shared by the HTTP handlers.

use chrono::{DateTime, Utc};
use sar_db::{RescueStore, ScyllaStore};
use sar_session::{DeploymentRegistry, SessionRegistry};
use sar_telemetry::MetricsCollector;
use std::sync::Arc;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    /// The persistence adapter serving reads (Scylla or in-memory).
    pub store: Arc<dyn RescueStore>,
    /// Present only when the real database connected; used for health checks.
    pub scylla: Option<Arc<ScyllaStore>>,
    pub metrics: Arc<MetricsCollector>,
    pub deployments: Arc<DeploymentRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn has_db(&self) -> bool {
        self.scylla.is_some()
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
