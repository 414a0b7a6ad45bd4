//! The agent-tool channel: newline-delimited JSON tool calls over
//! stdin/stdout.
//!
//! Each request line is `{"id"?, "tool", "arguments"?}`; each response line
//! is `{"id", "result"}` or `{"id", "error"}`. Tool names are the
//! dot-separated form (`nudge.set_hint`); `tools/list` returns the
//! descriptors. Both the PRIMARY and the PROXY serve this channel through
//! the shared service trait, which is the seam an MCP exposure layer plugs
//! into.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use nudge::error::ErrorCode;
use nudge::rpc::{self, HintService};

use crate::tools;

#[derive(Debug, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

/// Handle one request line, always producing a response object.
pub async fn handle_line(service: &dyn HintService, line: &str) -> Value {
    let call: ToolCall = match serde_json::from_str(line) {
        Ok(call) => call,
        Err(err) => {
            return json!({
                "id": null,
                "error": {
                    "code": ErrorCode::Invalid.as_i64(),
                    "message": format!("Invalid tool call: {err}"),
                    "data": {},
                }
            });
        }
    };

    if call.tool == "tools/list" {
        return json!({
            "id": call.id,
            "result": {"tools": tools::definitions()},
        });
    }

    match rpc::dispatch(service, &call.tool, call.arguments).await {
        Ok(result) => json!({"id": call.id, "result": result}),
        Err(error) => json!({"id": call.id, "error": error}),
    }
}

/// Serve the channel until stdin closes.
pub async fn run(service: Arc<dyn HintService>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(service.as_ref(), &line).await;
        let mut body = serde_json::to_vec(&response)?;
        body.push(b'\n');
        stdout.write_all(&body).await?;
        stdout.flush().await?;
    }
    info!("tool channel closed");
    Ok(())
}
