//! Agent-bridge socket sessions.
//!
//! A second, independent session type: free-text queries go to the LLM
//! runtime, response text streams back chunk by chunk, and tool side effects
//! arrive on the same connection out of band. After the configured idle
//! period the server sends a single timeout notice and keeps the connection
//! open.

use futures_util::{SinkExt, StreamExt};
use sar_core::{AgentMessage, ClientCommand};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::error::SessionResult;

/// Handle one agent-bridge connection for its whole lifetime.
pub async fn handle_agent_connection(
    ctx: SessionContext,
    stream: TcpStream,
    addr: SocketAddr,
) -> SessionResult<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    info!("Agent client connected from {}", addr);
    ctx.metrics.agent_session_opened();

    // Out-of-band channel: the bridge pushes chat chunks and tool side
    // effects here while the writer task owns the socket sink.
    let (tx, mut rx) = mpsc::channel::<AgentMessage>(64);
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize agent message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let idle = ctx.config.agent_idle_timeout;
    let mut idle_deadline = Instant::now() + idle;
    let mut timeout_sent = false;

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        idle_deadline = Instant::now() + idle;
                        timeout_sent = false;

                        match ClientCommand::parse(&text) {
                            Some(ClientCommand::Query { message }) => {
                                ctx.metrics.record_agent_query();
                                ctx.bridge.handle_query(&message, &tx).await;
                                idle_deadline = Instant::now() + idle;
                            }
                            Some(other) => {
                                debug!("Non-query command on agent socket: {:?}", other);
                                ctx.metrics.record_invalid_command();
                                let _ = tx
                                    .send(AgentMessage::Error {
                                        message: "only query events are accepted here".into(),
                                    })
                                    .await;
                            }
                            None => {
                                ctx.metrics.record_invalid_command();
                                let _ = tx
                                    .send(AgentMessage::Error {
                                        message: "unrecognized or malformed command".into(),
                                    })
                                    .await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Agent socket error from {}: {}", addr, e);
                        break;
                    }
                }
            }
            // One notice per idle period; the connection stays open.
            _ = tokio::time::sleep_until(idle_deadline), if !timeout_sent => {
                debug!("Agent client {} idle for {:?}", addr, idle);
                ctx.metrics.record_agent_timeout();
                timeout_sent = true;
                if tx.send(AgentMessage::Timeout).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(tx);
    let _ = writer.await;

    ctx.metrics.agent_session_closed();
    info!("Agent client {} disconnected", addr);
    Ok(())
}
