//! # SAR API Server
//!
//! Main entry point for the search-and-rescue drone server. Wires the
//! adapters together, starts the two WebSocket servers (streaming sessions
//! and the agent bridge), and serves the HTTP read API.

mod config;
mod error;
mod handlers;
mod routes;
mod state;

use crate::config::ApiConfig;
use crate::routes::create_router;
use crate::state::AppState;

use chrono::Utc;
use sar_agent::{AgentBridge, OpenAiRuntime};
use sar_core::{Detection, PixelBox};
use sar_db::{MemoryStore, RescueStore, ScyllaStore};
use sar_detector::{DetectorConfig, FrameEncoder, ObjectDetector, ScriptedDetector};
use sar_flight::{ControllerFactory, MissionScript, SimController, TelloController};
use sar_session::{DeploymentRegistry, SessionContext, SessionRegistry};
use sar_telemetry::MetricsCollector;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("Starting SAR Drone Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ApiConfig::from_env();
    info!("Configuration loaded");
    info!("   API port: {}", config.api_port);
    info!("   Stream port: {}", config.stream_port);
    info!("   Agent port: {}", config.agent_port);
    info!("   Simulation mode: {}", config.simulation_mode);

    // Persistence: real cluster when reachable, in-memory degraded mode
    // otherwise.
    let (store, scylla): (Arc<dyn RescueStore>, Option<Arc<ScyllaStore>>) =
        match ScyllaStore::new(config.db.clone()).await {
            Ok(db) => {
                info!("Database connected (keyspace {:?})", db.keyspace());
                let db = Arc::new(db);
                (db.clone(), Some(db))
            }
            Err(e) => {
                warn!("Database connection failed: {}", e);
                info!("Running with in-memory store (degraded mode)");
                (Arc::new(MemoryStore::new()), None)
            }
        };

    let metrics = Arc::new(MetricsCollector::new()?);
    let deployments = Arc::new(DeploymentRegistry::new());
    let sessions = Arc::new(SessionRegistry::new());

    let detector = build_detector(&config);
    let controllers = build_controller_factory(&config);

    let bridge = Arc::new(AgentBridge::new(
        Arc::new(OpenAiRuntime::new(config.agent.clone())),
        store.clone(),
        config.agent.clone(),
    ));

    let session_ctx = SessionContext {
        config: config.session.clone(),
        fleet: config.fleet.clone(),
        detector,
        encoder: Arc::new(FrameEncoder::default()),
        store: store.clone(),
        controllers,
        deployments: deployments.clone(),
        sessions: sessions.clone(),
        mission: Arc::new(MissionScript::orbit_search()),
        metrics: metrics.clone(),
        bridge,
    };

    // Streaming session server.
    let stream_addr = SocketAddr::from(([0, 0, 0, 0], config.stream_port));
    let stream_listener = tokio::net::TcpListener::bind(stream_addr).await?;
    let stream_ctx = session_ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = sar_session::start_stream_server(stream_ctx, stream_listener).await {
            error!("Stream server error: {}", e);
        }
    });

    // Agent bridge server.
    let agent_addr = SocketAddr::from(([0, 0, 0, 0], config.agent_port));
    let agent_listener = tokio::net::TcpListener::bind(agent_addr).await?;
    let agent_ctx = session_ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = sar_session::start_agent_server(agent_ctx, agent_listener).await {
            error!("Agent server error: {}", e);
        }
    });

    // HTTP read API.
    let app_state = AppState {
        config: config.clone(),
        store,
        scylla,
        metrics,
        deployments,
        sessions,
        started_at: Utc::now(),
    };
    let app = create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!("API server listening on http://{}", addr);
    info!("Streaming sessions on ws://0.0.0.0:{}", config.stream_port);
    info!("Agent bridge on ws://0.0.0.0:{}", config.agent_port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sar_session=debug,sar_agent=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Detector selection: YOLO weights when built with OpenCV and given a model
/// path, a scripted detector otherwise.
fn build_detector(config: &ApiConfig) -> Arc<dyn ObjectDetector> {
    #[cfg(feature = "opencv")]
    {
        if !config.simulation_mode {
            if let Some(path) = &config.model_path {
                match sar_detector::YoloDetector::new(
                    config.detector.clone(),
                    path,
                    coco_class_names(),
                ) {
                    Ok(detector) => return Arc::new(detector),
                    Err(e) => warn!("YOLO detector unavailable: {}", e),
                }
            } else {
                warn!("MODEL_PATH not set; falling back to scripted detector");
            }
        }
    }

    Arc::new(simulation_detector(config.detector.clone()))
}

/// Scripted detections for simulation mode: a person wanders through the
/// frame with an empty tick in between.
fn simulation_detector(config: DetectorConfig) -> ScriptedDetector {
    ScriptedDetector::new(
        config,
        vec![
            vec![Detection::new(
                "person",
                0.92,
                PixelBox::new(380, 240, 520, 600),
            )],
            vec![Detection::new(
                "person",
                0.88,
                PixelBox::new(400, 250, 540, 610),
            )],
            Vec::new(),
        ],
    )
}

/// COCO class list for the YOLO exports used in the field.
#[cfg(feature = "opencv")]
fn coco_class_names() -> Vec<String> {
    [
        "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
        "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
        "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
        "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
        "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
        "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
        "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
        "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
        "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
        "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
        "toothbrush",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Controller factory: simulated hardware in simulation mode, the Tello UDP
/// adapter otherwise.
fn build_controller_factory(config: &ApiConfig) -> ControllerFactory {
    if config.simulation_mode {
        Arc::new(|| Box::new(SimController::new("Drone 1")))
    } else {
        Arc::new(|| Box::new(TelloController::on_default_network("Drone 1")))
    }
}

/// Graceful shutdown handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}
