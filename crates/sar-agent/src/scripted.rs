//! Scripted runtime for tests and offline demos.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;

use crate::runtime::ChatMessage;
use crate::tools::{ToolInvocation, ToolSpec};
use crate::{AgentError, AgentResult, AgentRuntime, TurnOutcome};

/// One pre-scripted model turn.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    /// Text chunks emitted in order.
    pub chunks: Vec<String>,
    /// Tool calls requested at the end of the turn.
    pub tool_calls: Vec<ToolInvocation>,
}

impl ScriptedTurn {
    pub fn text(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|s| s.to_string()).collect(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool(name: &str, arguments: &str) -> Self {
        Self {
            chunks: Vec::new(),
            tool_calls: vec![ToolInvocation {
                id: format!("call_{}", name),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
        }
    }
}

/// Runtime that replays scripted turns instead of calling a model server.
pub struct ScriptedRuntime {
    turns: Mutex<VecDeque<ScriptedTurn>>,
}

impl ScriptedRuntime {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
        }
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn run_turn(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
        chunks: mpsc::Sender<String>,
    ) -> AgentResult<TurnOutcome> {
        let turn = self.turns.lock().pop_front().unwrap_or_default();

        let mut text = String::new();
        for chunk in turn.chunks {
            text.push_str(&chunk);
            chunks
                .send(chunk)
                .await
                .map_err(|_| AgentError::ChannelClosed)?;
        }

        Ok(TurnOutcome {
            text,
            tool_calls: turn.tool_calls,
        })
    }
}
