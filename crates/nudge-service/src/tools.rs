//! Tool descriptors for the agent-tool channel. An MCP (or similar)
//! exposure layer can lift these directly into its own tool listing.

use serde::Serialize;
use serde_json::{Value, json};

use nudge::rpc::Method;

#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: &'static str,
    pub input_schema: Value,
}

fn describe(method: Method) -> (&'static str, Value) {
    match method {
        Method::SetHint => (
            "Set or update a hint in the store",
            json!({
                "type": "object",
                "required": ["component", "key", "value"],
                "properties": {
                    "component": {"type": "string", "minLength": 1},
                    "key": {"type": "string", "minLength": 1},
                    "value": {},
                    "meta": {"type": "object"},
                    "if_match_version": {"type": "integer", "minimum": 0},
                    "allow_secret": {"type": "boolean", "default": false},
                },
            }),
        ),
        Method::GetHint => (
            "Get the best matching hint for a component and key",
            json!({
                "type": "object",
                "required": ["component", "key"],
                "properties": {
                    "component": {"type": "string"},
                    "key": {"type": "string"},
                    "context": {"type": "object"},
                },
            }),
        ),
        Method::Query => (
            "Search for hints by component, keys, tags, or regex",
            json!({
                "type": "object",
                "properties": {
                    "component": {"type": "string"},
                    "keys": {"type": "array", "items": {"type": "string"}},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "regex": {"type": "string"},
                    "context": {"type": "object"},
                    "limit": {"type": "integer", "minimum": 1, "default": 10},
                },
            }),
        ),
        Method::DeleteHint => (
            "Delete a hint from the store",
            json!({
                "type": "object",
                "required": ["component", "key"],
                "properties": {
                    "component": {"type": "string"},
                    "key": {"type": "string"},
                },
            }),
        ),
        Method::ListComponents => (
            "List all components with hint counts",
            json!({"type": "object", "properties": {}}),
        ),
        Method::Bump => (
            "Increase frecency counter after successful hint use",
            json!({
                "type": "object",
                "required": ["component", "key"],
                "properties": {
                    "component": {"type": "string"},
                    "key": {"type": "string"},
                    "delta": {"type": "integer", "minimum": 1, "default": 1},
                },
            }),
        ),
        Method::Export => (
            "Export the entire store or subset",
            json!({
                "type": "object",
                "properties": {
                    "format": {"type": "string", "enum": ["json"], "default": "json"},
                },
            }),
        ),
        Method::Import => (
            "Import hints from a payload",
            json!({
                "type": "object",
                "required": ["payload"],
                "properties": {
                    "payload": {"type": "object"},
                    "mode": {"type": "string", "enum": ["merge", "replace"], "default": "merge"},
                },
            }),
        ),
    }
}

pub fn definitions() -> Vec<ToolDef> {
    Method::ALL
        .into_iter()
        .map(|method| {
            let (description, input_schema) = describe(method);
            ToolDef {
                name: method.tool_name(),
                description,
                input_schema,
            }
        })
        .collect()
}
