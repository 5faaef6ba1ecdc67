// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-delimited JSON-RPC over stdio — the agent-facing surface.
//!
//! Requests arrive one per line on stdin; responses leave one per line
//! on stdout. Logs go to stderr so they never corrupt the protocol
//! stream. End-of-input on stdin means the agent is gone: the caller
//! performs a graceful detach and exits 0.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::dispatch::{Dispatcher, ToolRequest};

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Serve the agent protocol until stdin closes.
pub async fn serve(dispatcher: Arc<Dispatcher>, default_timeout: Duration) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&dispatcher, default_timeout, &line).await;
        let mut payload = response.to_string();
        payload.push('\n');
        stdout.write_all(payload.as_bytes()).await?;
        stdout.flush().await?;
    }

    debug!("stdin closed, agent is gone");
    Ok(())
}

/// Process one request line into one response value.
pub async fn handle_line(
    dispatcher: &Dispatcher,
    default_timeout: Duration,
    line: &str,
) -> Value {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return error_envelope(None, PARSE_ERROR, &format!("parse error: {e}")),
    };
    let id = request.id.clone();

    match request.method.as_str() {
        "tools/list" => {
            let tools: Vec<Value> = dispatcher
                .tool_list()
                .into_iter()
                .map(|(name, description)| {
                    json!({ "name": name, "description": description })
                })
                .collect();
            result_envelope(id, json!({ "tools": tools }))
        }
        "tools/call" => {
            let Some(name) = request.params.get("name").and_then(Value::as_str) else {
                return error_envelope(id, INVALID_PARAMS, "params.name is required");
            };
            let arguments =
                request.params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let timeout = request
                .params
                .get("timeoutMs")
                .and_then(Value::as_u64)
                .map(Duration::from_millis)
                .unwrap_or(default_timeout);

            let response = dispatcher
                .handle(ToolRequest { name: name.to_owned(), arguments, timeout })
                .await;
            result_envelope(id, response.to_wire())
        }
        other => error_envelope(id, METHOD_NOT_FOUND, &format!("unknown method '{other}'")),
    }
}

fn result_envelope(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id.unwrap_or(Value::Null), "result": result })
}

fn error_envelope(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
