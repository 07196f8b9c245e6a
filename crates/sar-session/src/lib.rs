//! # SAR Session
//!
//! WebSocket session servers for the search-and-rescue drone system:
//!
//! - The **streaming session**: multiplexes inbound drone commands against
//!   outbound telemetry/detection frames on a fixed tick cadence, driving
//!   the flight-controller, detector and persistence adapters.
//! - The **agent bridge**: forwards free-text queries to the LLM runtime
//!   and streams back incremental chunks plus tool-invocation side effects.
//!
//! Each connection gets exactly one session task; sessions share nothing
//! mutable except the persistence sink and the deployment registry. A
//! session that acquired a flight controller releases it (land, stream-off,
//! disconnect) on every exit path.

pub mod agent;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod registry;
pub mod session;

pub use agent::handle_agent_connection;
pub use config::{FleetConfig, SessionConfig};
pub use context::SessionContext;
pub use deploy::DeploymentRegistry;
pub use error::{SessionError, SessionResult};
pub use registry::SessionRegistry;
pub use session::Session;

use futures_util::{SinkExt, StreamExt};
use sar_core::{ClientCommand, ControlReply};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

/// Accept streaming-session connections forever.
pub async fn start_stream_server(ctx: SessionContext, listener: TcpListener) -> SessionResult<()> {
    let addr = listener.local_addr()?;
    info!("Streaming session server listening on ws://{}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_stream_connection(ctx, stream, peer).await {
                        error!("Session error from {}: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept session connection: {}", e);
            }
        }
    }
}

/// Accept agent-bridge connections forever.
pub async fn start_agent_server(ctx: SessionContext, listener: TcpListener) -> SessionResult<()> {
    let addr = listener.local_addr()?;
    info!("Agent bridge server listening on ws://{}", addr);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_agent_connection(ctx, stream, peer).await {
                        error!("Agent session error from {}: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept agent connection: {}", e);
            }
        }
    }
}

/// Drive one streaming session: non-blocking command checks multiplexed with
/// the fixed-cadence tick, then guaranteed teardown when the transport ends.
async fn handle_stream_connection(
    ctx: SessionContext,
    stream: TcpStream,
    addr: SocketAddr,
) -> SessionResult<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let mut session = Session::new(ctx.clone());
    info!("Client {} connected as session {}", addr, session.id());
    ctx.sessions.register(session.id(), addr.to_string());
    ctx.metrics.session_opened();

    let mut ticker = tokio::time::interval(ctx.config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match ClientCommand::parse(&text) {
                            Some(command) => session.handle_command(command).await,
                            None => {
                                ctx.metrics.record_invalid_command();
                                warn!("Session {}: invalid command {:?}", session.id(), text);
                                Some(ControlReply::Error {
                                    message: "unrecognized or malformed command".into(),
                                })
                            }
                        };

                        if let Some(reply) = reply {
                            match serde_json::to_string(&reply) {
                                Ok(json) => {
                                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Failed to serialize reply: {}", e),
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Session {}: transport error: {}", session.id(), e);
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if let Some(message) = session.tick().await {
                    match serde_json::to_string(&message) {
                        Ok(json) => {
                            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to serialize tick: {}", e),
                    }
                }
            }
        }
    }

    // The one exit point: transport loss of any kind lands here and tears
    // down the controller if this session owned one.
    session.teardown().await;
    ctx.sessions.deregister(session.id());
    ctx.metrics.session_closed();
    info!("Session {} closed", session.id());

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::TestHarness;
    use futures_util::{SinkExt, StreamExt};
    use sar_agent::{AgentBridge, AgentConfig, ScriptedRuntime, ScriptedTurn};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    async fn spawn_stream_server(harness: &TestHarness) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(start_stream_server(harness.ctx.clone(), listener));
        format!("ws://{}", addr)
    }

    async fn spawn_agent_server(ctx: SessionContext) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(start_agent_server(ctx, listener));
        format!("ws://{}", addr)
    }

    type WsClient =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn next_json(ws: &mut WsClient) -> serde_json::Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("message within deadline")
                .expect("stream open")
                .expect("no transport error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).expect("valid json");
            }
        }
    }

    #[tokio::test]
    async fn test_get_drones_round_trip() {
        let harness = TestHarness::new();
        let url = spawn_stream_server(&harness).await;

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        ws.send(Message::Text(r#"{"event":"GET_DRONES"}"#.into()))
            .await
            .unwrap();

        let reply = next_json(&mut ws).await;
        assert_eq!(reply["event"], "DRONES");
        assert_eq!(reply["drones"][0]["name"], "Drone 1");
    }

    #[tokio::test]
    async fn test_invalid_command_gets_error_and_connection_survives() {
        let harness = TestHarness::new();
        let url = spawn_stream_server(&harness).await;

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        ws.send(Message::Text(r#"{"event":"SELF_DESTRUCT"}"#.into()))
            .await
            .unwrap();

        let reply = next_json(&mut ws).await;
        assert_eq!(reply["event"], "error");

        // Still serviceable afterwards.
        ws.send(Message::Text(r#"{"event":"GET_DRONES"}"#.into()))
            .await
            .unwrap();
        let reply = next_json(&mut ws).await;
        assert_eq!(reply["event"], "DRONES");
    }

    #[tokio::test]
    async fn test_deploy_streams_ticks_and_disconnect_tears_down_once() {
        let harness = TestHarness::new();
        let url = spawn_stream_server(&harness).await;

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        ws.send(Message::Text(r#"{"event":"DEPLOY"}"#.into()))
            .await
            .unwrap();

        // Wait for a telemetry tick to confirm the deployment is live.
        let tick = next_json(&mut ws).await;
        assert!(tick["droneStatus"]["batteryLevel"].is_u64());
        assert_eq!(tick["persons"][0]["bbox"].as_array().unwrap().len(), 4);

        drop(ws);

        // Teardown is asynchronous; poll the controller log.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let logs = harness.controller_logs();
            if logs.first().is_some_and(|log| log.lands() == 1) {
                assert_eq!(logs[0].stream_offs(), 1);
                assert_eq!(logs[0].disconnects(), 1);
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "teardown did not run"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!harness.ctx.deployments.is_active());
    }

    #[tokio::test]
    async fn test_agent_query_chunks_then_complete() {
        let harness = TestHarness::new();
        let mut ctx = harness.ctx.clone();
        ctx.bridge = Arc::new(AgentBridge::new(
            Arc::new(ScriptedRuntime::new(vec![ScriptedTurn::text(&[
                "two hazards ",
                "of type fire",
            ])])),
            harness.store.clone(),
            AgentConfig::default(),
        ));
        let url = spawn_agent_server(ctx).await;

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        ws.send(Message::Text(
            r#"{"event":"query","message":"list hazards of type fire"}"#.into(),
        ))
        .await
        .unwrap();

        let first = next_json(&mut ws).await;
        assert_eq!(first["event"], "chat_chunk");

        let mut completes = 0;
        let mut message = next_json(&mut ws).await;
        loop {
            if message["event"] == "AGENT_RESPONSE_COMPLETE" {
                completes += 1;
                break;
            }
            message = next_json(&mut ws).await;
        }
        assert_eq!(completes, 1);
    }

    #[tokio::test]
    async fn test_agent_idle_timeout_sent_once_and_connection_stays_open() {
        let harness = TestHarness::new();
        let mut ctx = harness.ctx.clone();
        ctx.config.agent_idle_timeout = Duration::from_millis(50);
        let url = spawn_agent_server(ctx).await;

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        let notice = next_json(&mut ws).await;
        assert_eq!(notice["event"], "timeout");

        // No second notice during a further idle stretch.
        let second = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
        assert!(second.is_err(), "unexpected second message: {:?}", second);

        // The connection is still open and serviceable.
        ws.send(Message::Text(r#"{"event":"query","message":"ping"}"#.into()))
            .await
            .unwrap();
        let reply = next_json(&mut ws).await;
        assert_eq!(reply["event"], "AGENT_RESPONSE_COMPLETE");
    }

    #[tokio::test]
    async fn test_move_command_on_agent_socket_rejected() {
        let harness = TestHarness::new();
        let url = spawn_agent_server(harness.ctx.clone()).await;

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        ws.send(Message::Text(
            r#"{"event":"MOVE","x":1,"y":2,"z":3,"yaw":4}"#.into(),
        ))
        .await
        .unwrap();

        let reply = next_json(&mut ws).await;
        assert_eq!(reply["event"], "error");
    }
}
