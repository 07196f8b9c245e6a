//! # SAR Agent
//!
//! LLM agent bridge for the search-and-rescue drone server. Forwards
//! free-text operator queries to a tool-calling model runtime and streams
//! the response back chunk by chunk. Tool invocations push additional
//! messages to the same client connection out of band from the text stream.
//!
//! The runtime itself is a black box behind [`AgentRuntime`]; the default
//! implementation speaks the OpenAI-compatible chat protocol.

pub mod error;
pub mod runtime;
pub mod scripted;
pub mod tools;

pub use error::{AgentError, AgentResult};
pub use runtime::{ChatMessage, OpenAiRuntime, Role};
pub use scripted::{ScriptedRuntime, ScriptedTurn};
pub use tools::{ToolInvocation, ToolSpec, tool_specs};

use async_trait::async_trait;
use sar_core::{AgentMessage, HazardKind};
use sar_db::RescueStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use tools::{
    DisplayHazardsArgs, ExecuteQueryArgs, PlanRouteArgs, TOOL_DISPLAY_HAZARDS, TOOL_EXECUTE_QUERY,
    TOOL_PLAN_ROUTE,
};

/// Fixed system role describing the mission and the available tools.
const SYSTEM_PROMPT: &str = "\
You are the operations assistant for a search-and-rescue drone deployment. \
You answer operator questions about detected persons, drone status and \
reported hazards. Hazard kinds are: pole, fire, tree, flood. You have three \
tools: display_hazards filters the operator's map overlays, plan_route \
requests a rescue route to a detected person while avoiding hazard kinds, \
and execute_query runs a read-only SELECT against the rescue store. Keep \
answers short and operational.";

/// Rows beyond this are dropped from tool results fed back to the model.
const MAX_QUERY_ROWS: usize = 50;

/// Agent bridge configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the OpenAI-compatible model server.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    /// Upper bound on tool-call rounds per query.
    pub max_tool_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(60),
            max_tool_rounds: 4,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("AGENT_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("AGENT_MODEL").unwrap_or(defaults.model),
            api_key: std::env::var("AGENT_API_KEY").ok(),
            ..defaults
        }
    }
}

/// Accumulated result of one model turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
}

/// Tool-calling LLM runtime, treated as a black box.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Run one model turn, sending text chunks through `chunks` as they are
    /// produced, and return the accumulated outcome.
    async fn run_turn(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        chunks: mpsc::Sender<String>,
    ) -> AgentResult<TurnOutcome>;
}

// ============================================================================
// BRIDGE
// ============================================================================

/// Connects operator queries to the runtime and executes tool side effects.
pub struct AgentBridge {
    runtime: Arc<dyn AgentRuntime>,
    store: Arc<dyn RescueStore>,
    config: AgentConfig,
}

impl AgentBridge {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        store: Arc<dyn RescueStore>,
        config: AgentConfig,
    ) -> Self {
        Self {
            runtime,
            store,
            config,
        }
    }

    /// Handle one operator query end to end: stream chunks, run tool rounds,
    /// and finish with exactly one `AGENT_RESPONSE_COMPLETE`. Runtime errors
    /// are reported to the client; they never tear the connection down.
    pub async fn handle_query(&self, query: &str, sink: &mpsc::Sender<AgentMessage>) {
        info!("Agent query: {:?}", query);

        if let Err(e) = self.run_query(query, sink).await {
            warn!("Agent query failed: {}", e);
            let _ = sink
                .send(AgentMessage::Error {
                    message: format!("agent error: {}", e),
                })
                .await;
        }

        let _ = sink.send(AgentMessage::ResponseComplete).await;
    }

    async fn run_query(
        &self,
        query: &str,
        sink: &mpsc::Sender<AgentMessage>,
    ) -> AgentResult<()> {
        let specs = tool_specs();
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(query)];

        for _round in 0..self.config.max_tool_rounds {
            let (tx, mut rx) = mpsc::channel(64);

            let turn = self.runtime.run_turn(&messages, &specs, tx);
            let forward = async {
                while let Some(content) = rx.recv().await {
                    if sink
                        .send(AgentMessage::ChatChunk { content })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            };

            let (outcome, ()) = tokio::join!(turn, forward);
            let outcome = outcome?;

            if outcome.tool_calls.is_empty() {
                return Ok(());
            }

            messages.push(ChatMessage::assistant_tool_calls(&outcome.tool_calls));
            for call in &outcome.tool_calls {
                let result = self.execute_tool(call, sink).await;
                let content = match result {
                    Ok(content) => content,
                    Err(e) => format!("tool failed: {}", e),
                };
                messages.push(ChatMessage::tool_result(call.id.clone(), content));
            }
        }

        warn!("Tool round limit reached for query {:?}", query);
        Ok(())
    }

    /// Execute one tool call, pushing its client-visible side effect through
    /// `sink`, and return the result text fed back to the model.
    async fn execute_tool(
        &self,
        call: &ToolInvocation,
        sink: &mpsc::Sender<AgentMessage>,
    ) -> AgentResult<String> {
        match call.name.as_str() {
            TOOL_DISPLAY_HAZARDS => {
                let args: DisplayHazardsArgs = serde_json::from_str(&call.arguments)?;

                let kinds = parse_kind_filter(&args.hazards);
                let matching = self
                    .store
                    .list_hazards(kinds.as_deref())
                    .await
                    .map_err(|e| AgentError::tool(e.to_string()))?;

                sink.send(AgentMessage::DisplayHazards {
                    hazards: args.hazards.clone(),
                    drones: args.drones,
                    humans: args.humans,
                })
                .await
                .map_err(|_| AgentError::ChannelClosed)?;

                Ok(format!(
                    "map filtered to {:?}; {} matching hazards on record",
                    args.hazards,
                    matching.len()
                ))
            }
            TOOL_PLAN_ROUTE => {
                let args: PlanRouteArgs = serde_json::from_str(&call.arguments)?;

                sink.send(AgentMessage::PlanRoute {
                    id: args.id.clone(),
                    hazards: args.avoid.clone(),
                })
                .await
                .map_err(|_| AgentError::ChannelClosed)?;

                Ok(format!(
                    "route planning requested to person {} avoiding {:?}",
                    args.id, args.avoid
                ))
            }
            TOOL_EXECUTE_QUERY => {
                let args: ExecuteQueryArgs = serde_json::from_str(&call.arguments)?;

                let rows = self
                    .store
                    .execute_read_only(&args.query)
                    .await
                    .map_err(|e| AgentError::tool(e.to_string()))?;

                let shown = rows.len().min(MAX_QUERY_ROWS);
                let body = serde_json::to_string(&rows[..shown])?;
                if rows.len() > shown {
                    Ok(format!("{} (truncated to {} rows)", body, shown))
                } else {
                    Ok(body)
                }
            }
            other => Err(AgentError::tool(format!("unknown tool {:?}", other))),
        }
    }
}

/// `["all"]` (or an empty list) means no filtering; unknown kind names are
/// dropped.
fn parse_kind_filter(names: &[String]) -> Option<Vec<HazardKind>> {
    if names.is_empty() || names.iter().any(|n| n == "all") {
        return None;
    }
    Some(
        names
            .iter()
            .filter_map(|n| n.parse::<HazardKind>().ok())
            .collect(),
    )
}

// ============================================================================
// TESTS
// ============================================================================
