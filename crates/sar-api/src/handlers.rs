//! HTTP request handlers.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sar_core::{Hazard, HazardKind, HazardSeverity, LatLng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Hard cap on the recent-persons read.
const MAX_RECENT_PERSONS: usize = 10;

// ============================================================================
// REQUEST/RESPONSE TYPES
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub api: String,
    pub database: String,
    pub streaming_sessions: usize,
    pub deployment_active: bool,
    pub uptime_seconds: i64,
}

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub lat: f64,
    pub lng: f64,
    pub severity: String,
    #[serde(default)]
    pub details: String,
    pub created_by: String,
}

// ============================================================================
// HEALTH & STATUS
// ============================================================================

/// Health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// System status overview.
pub async fn system_status(State(state): State<AppState>) -> impl IntoResponse {
    let database = if state.has_db() {
        "connected"
    } else {
        "in-memory"
    };

    Json(StatusResponse {
        api: "running".into(),
        database: database.into(),
        streaming_sessions: state.sessions.count(),
        deployment_active: state.deployments.is_active(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Readiness check.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let ready = match &state.scylla {
        Some(db) => db.health_check().await,
        None => true,
    };

    if ready {
        (StatusCode::OK, Json(serde_json::json!({"ready": true})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"ready": false})),
        )
    }
}

/// Prometheus metrics endpoint.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.export(),
    )
}

// ============================================================================
// READ ENDPOINTS
// ============================================================================

/// Most recent person detections, capped at 10.
pub async fn recent_persons(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let persons = state.store.recent_persons(clamp_limit(query.limit)).await?;
    Ok(Json(persons))
}

fn clamp_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(MAX_RECENT_PERSONS).min(MAX_RECENT_PERSONS)
}

/// Most recent drone-status snapshot (one record).
pub async fn latest_drone_status(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.store.latest_drone_status().await?;
    Ok(Json(status))
}

/// All reported hazards.
pub async fn list_hazards(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let hazards = state.store.list_hazards(None).await?;
    Ok(Json(hazards))
}

/// Manual hazard report from an operator.
pub async fn report_hazard(
    State(state): State<AppState>,
    Json(report): Json<HazardReport>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: HazardKind = report
        .kind
        .parse()
        .map_err(|e: sar_core::CoreError| ApiError::bad_request(e.to_string()))?;
    let severity: HazardSeverity = report
        .severity
        .parse()
        .map_err(|e: sar_core::CoreError| ApiError::bad_request(e.to_string()))?;

    let location = LatLng::new(report.lat, report.lng);
    if !location.is_valid() {
        return Err(ApiError::bad_request("coordinates out of range"));
    }

    let hazard = Hazard::new(kind, location, severity, report.details, report.created_by);
    state.store.insert_hazard(&hazard).await?;

    info!("Hazard {} reported by {}", hazard.id, hazard.created_by);
    Ok((StatusCode::CREATED, Json(hazard)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use sar_db::{MemoryStore, PersonRecord, RescueStore};
    use sar_core::PixelBox;
    use sar_session::DeploymentRegistry;
    use sar_telemetry::MetricsCollector;
    use std::sync::Arc;

    fn test_state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState {
            config: ApiConfig::default(),
            store: store.clone(),
            scylla: None,
            metrics: Arc::new(MetricsCollector::new().unwrap()),
            deployments: Arc::new(DeploymentRegistry::new()),
            sessions: Arc::new(sar_session::SessionRegistry::new()),
            started_at: Utc::now(),
        };
        (state, store)
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(3)), 3);
        assert_eq!(clamp_limit(Some(50)), 10);
    }

    #[tokio::test]
    async fn test_recent_persons_cap() {
        let (state, store) = test_state();
        for i in 0..20 {
            store
                .insert_person(&PersonRecord::new(
                    0.8,
                    PixelBox::new(0, 0, 10, 10),
                    format!("frame-{}", i),
                ))
                .await
                .unwrap();
        }

        // Even an oversized request is served at most 10 records.
        let result = recent_persons(State(state), Query(RecentQuery { limit: Some(50) })).await;
        assert!(result.is_ok());
        let persons = store.recent_persons(clamp_limit(Some(50))).await.unwrap();
        assert_eq!(persons.len(), 10);
    }

    #[tokio::test]
    async fn test_report_hazard_validates_kind() {
        let (state, _store) = test_state();

        let bad = report_hazard(
            State(state.clone()),
            Json(HazardReport {
                kind: "earthquake".into(),
                lat: 37.0,
                lng: -122.0,
                severity: "High".into(),
                details: String::new(),
                created_by: "operator".into(),
            }),
        )
        .await;
        assert!(bad.is_err());

        let good = report_hazard(
            State(state),
            Json(HazardReport {
                kind: "fire".into(),
                lat: 37.0,
                lng: -122.0,
                severity: "Critical".into(),
                details: "spreading".into(),
                created_by: "operator".into(),
            }),
        )
        .await;
        assert!(good.is_ok());
    }

    #[tokio::test]
    async fn test_report_hazard_validates_coordinates() {
        let (state, _store) = test_state();

        let result = report_hazard(
            State(state),
            Json(HazardReport {
                kind: "flood".into(),
                lat: 137.0,
                lng: -122.0,
                severity: "Low".into(),
                details: String::new(),
                created_by: "operator".into(),
            }),
        )
        .await;
        assert!(result.is_err());
    }
}
