//! Chat-completions client for the LLM runtime.
//!
//! Talks to any OpenAI-compatible model server (a local Ollama instance by
//! default) with `stream: true`, forwarding text deltas as they arrive and
//! accumulating tool-call deltas until the turn finishes.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::tools::{ToolInvocation, ToolSpec};
use crate::{AgentConfig, AgentError, AgentResult, AgentRuntime, TurnOutcome};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the conversation sent to the model server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Assistant message carrying the tool calls the model requested.
    pub fn assistant_tool_calls(calls: &[ToolInvocation]) -> Self {
        let tool_calls = calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments }
                })
            })
            .collect();

        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }

    /// Result of one executed tool call.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

// ============================================================================
// STREAMING WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Tool call under assembly from streamed deltas.
#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

// ============================================================================
// RUNTIME
// ============================================================================

/// [`AgentRuntime`] backed by an OpenAI-compatible chat endpoint.
pub struct OpenAiRuntime {
    client: reqwest::Client,
    config: AgentConfig,
}

impl OpenAiRuntime {
    pub fn new(config: AgentConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client");

        Self { client, config }
    }
}

#[async_trait]
impl AgentRuntime for OpenAiRuntime {
    async fn run_turn(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        chunks: mpsc::Sender<String>,
    ) -> AgentResult<TurnOutcome> {
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "tools": tools.iter().map(|t| t.to_request_entry()).collect::<Vec<_>>(),
            "stream": true,
        });

        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let mut stream = response.bytes_stream();

        let mut buffer = String::new();
        let mut text = String::new();
        let mut partial_calls: BTreeMap<usize, PartialToolCall> = BTreeMap::new();

        'stream: while let Some(piece) = stream.next().await {
            let bytes = piece?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                let line = line.trim();

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    break 'stream;
                }

                let parsed: StreamChunk = match serde_json::from_str(data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Skipping undecodable stream chunk: {}", e);
                        continue;
                    }
                };

                for choice in parsed.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            text.push_str(&content);
                            chunks
                                .send(content)
                                .await
                                .map_err(|_| AgentError::ChannelClosed)?;
                        }
                    }

                    for delta in choice.delta.tool_calls.unwrap_or_default() {
                        let partial = partial_calls.entry(delta.index).or_default();
                        if let Some(id) = delta.id {
                            partial.id = id;
                        }
                        if let Some(function) = delta.function {
                            if let Some(name) = function.name {
                                partial.name = name;
                            }
                            if let Some(arguments) = function.arguments {
                                partial.arguments.push_str(&arguments);
                            }
                        }
                    }

                    if let Some(reason) = choice.finish_reason {
                        debug!("Turn finished: {}", reason);
                    }
                }
            }
        }

        let tool_calls = partial_calls
            .into_values()
            .filter(|p| !p.name.is_empty())
            .map(|p| ToolInvocation {
                id: p.id,
                name: p.name,
                arguments: if p.arguments.is_empty() {
                    "{}".to_string()
                } else {
                    p.arguments
                },
            })
            .collect();

        Ok(TurnOutcome { text, tool_calls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_serialization() {
        let msg = ChatMessage::user("where are the fires?");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn test_assistant_tool_calls_shape() {
        let call = ToolInvocation {
            id: "call_1".into(),
            name: "display_hazards".into(),
            arguments: r#"{"hazards":["fire"]}"#.into(),
        };
        let msg = ChatMessage::assistant_tool_calls(&[call]);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["role"], "assistant");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "display_hazards");
    }

    #[test]
    fn test_stream_chunk_decoding() {
        let data = r#"{"choices":[{"delta":{"content":"two "},"finish_reason":null}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("two "));
    }

    #[test]
    fn test_tool_call_delta_decoding() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9",
            "function":{"name":"plan_route","arguments":"{\"id\":"}}]},
            "finish_reason":null}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        let deltas = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(deltas[0].index, 0);
        assert_eq!(
            deltas[0].function.as_ref().unwrap().name.as_deref(),
            Some("plan_route")
        );
    }
}
