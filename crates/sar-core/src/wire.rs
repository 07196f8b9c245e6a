//! Wire message types for the socket protocol.
//!
//! All messages are JSON objects. Client-to-server messages carry an `event`
//! discriminator; the telemetry tick is the one untagged server message (its
//! shape alone identifies it).

use serde::{Deserialize, Serialize};

use crate::{Detection, DroneIdentity, DroneStatusSnapshot};

// ============================================================================
// CLIENT -> SERVER
// ============================================================================

/// Command received from a socket client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ClientCommand {
    /// Acquire a flight controller and run the deployment mission script.
    #[serde(rename = "DEPLOY")]
    Deploy,
    /// Forward a four-axis velocity command to the flight controller.
    #[serde(rename = "MOVE")]
    Move { x: i32, y: i32, z: i32, yaw: i32 },
    /// Return the static roster of known drones.
    #[serde(rename = "GET_DRONES")]
    GetDrones,
    /// Free-text query for the agent bridge.
    #[serde(rename = "query")]
    Query { message: String },
}

impl ClientCommand {
    /// Parse a raw text frame. `None` distinguishes malformed input from a
    /// structurally valid but unknown command (serde rejects both the same
    /// way, so callers treat them uniformly as invalid).
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

// ============================================================================
// SERVER -> CLIENT (streaming session)
// ============================================================================

/// Per-detection payload inside a telemetry tick: confidence plus the pixel
/// box as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonReport {
    pub confidence: f64,
    pub bbox: [i32; 4],
}

impl From<&Detection> for PersonReport {
    fn from(d: &Detection) -> Self {
        Self {
            confidence: d.confidence,
            bbox: d.bbox.to_array(),
        }
    }
}

/// Combined status + detection message pushed once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickMessage {
    pub persons: Vec<PersonReport>,
    /// Base64-encoded annotated frame.
    pub frame: String,
    #[serde(rename = "droneStatus")]
    pub drone_status: DroneStatusSnapshot,
}

/// Event-tagged replies on the streaming session socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ControlReply {
    /// Reply to `GET_DRONES`.
    #[serde(rename = "DRONES")]
    Drones { drones: Vec<DroneIdentity> },
    /// Unrecognized event name or malformed payload. The connection stays
    /// open.
    #[serde(rename = "error")]
    Error { message: String },
}

// ============================================================================
// SERVER -> CLIENT (agent bridge)
// ============================================================================

/// Messages pushed to an agent-bridge client. Tool invocations arrive out of
/// band from the chat chunk stream on the same connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum AgentMessage {
    /// Incremental chunk of the agent's text response.
    #[serde(rename = "chat_chunk")]
    ChatChunk { content: String },
    /// Filter map overlays to the named hazard kinds.
    #[serde(rename = "display_hazards")]
    DisplayHazards {
        hazards: Vec<String>,
        drones: bool,
        humans: bool,
    },
    /// Request a route to the target person, avoiding the named hazard kinds.
    #[serde(rename = "plan_route")]
    PlanRoute { id: String, hazards: Vec<String> },
    /// End of one agent response.
    #[serde(rename = "AGENT_RESPONSE_COMPLETE")]
    ResponseComplete,
    /// Sent after the idle period elapses; the connection stays open.
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "error")]
    Error { message: String },
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelBox;

    #[test]
    fn test_parse_deploy() {
        let cmd = ClientCommand::parse(r#"{"event":"DEPLOY"}"#);
        assert_eq!(cmd, Some(ClientCommand::Deploy));
    }

    #[test]
    fn test_parse_move() {
        let cmd = ClientCommand::parse(r#"{"event":"MOVE","x":10,"y":-20,"z":0,"yaw":35}"#);
        assert_eq!(
            cmd,
            Some(ClientCommand::Move {
                x: 10,
                y: -20,
                z: 0,
                yaw: 35
            })
        );
    }

    #[test]
    fn test_parse_query() {
        let cmd = ClientCommand::parse(r#"{"event":"query","message":"list hazards"}"#);
        assert_eq!(
            cmd,
            Some(ClientCommand::Query {
                message: "list hazards".into()
            })
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert_eq!(ClientCommand::parse(r#"{"event":"SELF_DESTRUCT"}"#), None);
        assert_eq!(ClientCommand::parse(r#"{"event":"MOVE","x":"fast"}"#), None);
        assert_eq!(ClientCommand::parse("not json"), None);
    }

    #[test]
    fn test_tick_message_shape() {
        let detection = Detection::new("person", 0.87, PixelBox::new(5, 10, 55, 120));
        let msg = TickMessage {
            persons: vec![PersonReport::from(&detection)],
            frame: "aGVsbG8=".into(),
            drone_status: DroneStatusSnapshot::new("Drone 1", true, 72),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["persons"][0]["bbox"], serde_json::json!([5, 10, 55, 120]));
        assert_eq!(json["droneStatus"]["batteryLevel"], 72);
        assert!(json["frame"].is_string());
    }

    #[test]
    fn test_agent_message_tags() {
        let done = serde_json::to_value(AgentMessage::ResponseComplete).unwrap();
        assert_eq!(done["event"], "AGENT_RESPONSE_COMPLETE");

        let chunk = serde_json::to_value(AgentMessage::ChatChunk {
            content: "two hazards".into(),
        })
        .unwrap();
        assert_eq!(chunk["event"], "chat_chunk");

        let timeout = serde_json::to_value(AgentMessage::Timeout).unwrap();
        assert_eq!(timeout["event"], "timeout");
    }

    #[test]
    fn test_control_reply_tags() {
        let reply = ControlReply::Drones {
            drones: vec![DroneIdentity::new("Drone 1")],
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["event"], "DRONES");
        assert_eq!(json["drones"][0]["name"], "Drone 1");
    }
}
