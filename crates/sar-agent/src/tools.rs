//! Tool definitions exposed to the LLM runtime.
//!
//! Three tools are available: filtering map overlays, requesting a route
//! plan, and running a read-only query against the store. Their side effects
//! are pushed to the client out of band from the chat stream.

use serde::{Deserialize, Serialize};
use serde_json::json;

pub const TOOL_DISPLAY_HAZARDS: &str = "display_hazards";
pub const TOOL_PLAN_ROUTE: &str = "plan_route";
pub const TOOL_EXECUTE_QUERY: &str = "execute_query";

/// Description of one callable tool, in the shape the chat endpoint expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// Render as an OpenAI-style `tools` entry.
    pub fn to_request_entry(&self) -> serde_json::Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// One tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string as produced by the model.
    pub arguments: String,
}

/// Arguments for `display_hazards`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayHazardsArgs {
    /// Hazard kinds to show, or `["all"]`.
    pub hazards: Vec<String>,
    #[serde(default = "default_true")]
    pub drones: bool,
    #[serde(default = "default_true")]
    pub humans: bool,
}

/// Arguments for `plan_route`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRouteArgs {
    /// Target person id.
    pub id: String,
    /// Hazard kinds the route must avoid.
    #[serde(default)]
    pub avoid: Vec<String>,
}

/// Arguments for `execute_query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteQueryArgs {
    pub query: String,
}

fn default_true() -> bool {
    true
}

/// The fixed tool set offered on every agent turn.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: TOOL_DISPLAY_HAZARDS.into(),
            description: "Filter the operator map overlays. Pass the hazard kinds to keep \
                          visible (pole, fire, tree, flood), or [\"all\"] for every kind, \
                          plus whether drone and human markers stay visible."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "hazards": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Hazard kinds to display, or [\"all\"]"
                    },
                    "drones": { "type": "boolean" },
                    "humans": { "type": "boolean" }
                },
                "required": ["hazards"]
            }),
        },
        ToolSpec {
            name: TOOL_PLAN_ROUTE.into(),
            description: "Request a rescue route to a detected person, avoiding the given \
                          hazard kinds."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "string",
                        "description": "Id of the target person"
                    },
                    "avoid": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Hazard kinds the route must avoid"
                    }
                },
                "required": ["id"]
            }),
        },
        ToolSpec {
            name: TOOL_EXECUTE_QUERY.into(),
            description: "Run a read-only SELECT against the rescue store. Tables: \
                          persons(detected_at, id, confidence, x1, y1, x2, y2, image_ref), \
                          drone_status(recorded_at, name, connected, battery, lat, lng), \
                          hazards(id, kind, lat, lng, severity, details, created_by, \
                          created_at)."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "A single SELECT statement"
                    }
                },
                "required": ["query"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_tools_defined() {
        let specs = tool_specs();
        assert_eq!(specs.len(), 3);
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&TOOL_DISPLAY_HAZARDS));
        assert!(names.contains(&TOOL_PLAN_ROUTE));
        assert!(names.contains(&TOOL_EXECUTE_QUERY));
    }

    #[test]
    fn test_request_entry_shape() {
        let entry = tool_specs()[0].to_request_entry();
        assert_eq!(entry["type"], "function");
        assert_eq!(entry["function"]["name"], TOOL_DISPLAY_HAZARDS);
        assert!(entry["function"]["parameters"]["properties"]["hazards"].is_object());
    }

    #[test]
    fn test_display_args_defaults() {
        let args: DisplayHazardsArgs = serde_json::from_str(r#"{"hazards":["fire"]}"#).unwrap();
        assert!(args.drones);
        assert!(args.humans);
        assert_eq!(args.hazards, vec!["fire"]);
    }

    #[test]
    fn test_plan_route_args() {
        let args: PlanRouteArgs =
            serde_json::from_str(r#"{"id":"person3","avoid":["fire","flood"]}"#).unwrap();
        assert_eq!(args.id, "person3");
        assert_eq!(args.avoid.len(), 2);
    }
}
