//! API route definitions.

use crate::handlers;
use crate::state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.cors_permissive {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(["http://localhost:3001".parse().unwrap()])
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        // Health & Status
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/status", get(handlers::system_status))
        // Metrics (Prometheus format)
        .route("/metrics", get(handlers::metrics))
        // Read endpoints
        .route("/api/v1/persons/recent", get(handlers::recent_persons))
        .route(
            "/api/v1/drone-status/latest",
            get(handlers::latest_drone_status),
        )
        .route("/api/v1/hazards", get(handlers::list_hazards))
        .route("/api/v1/hazards", post(handlers::report_hazard))
        // Apply middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}
