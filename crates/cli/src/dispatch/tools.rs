// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tool registry: one descriptor per tool, dispatched by name.
//!
//! Scheduling, timeout, the blocking-UI gate, snapshot-on-error, and
//! ledger decoration all live in the dispatcher — handlers only do
//! their own work and return a response.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use serde_json::{json, Value};

use crate::analyzer::{self, QueryKind, QueryScope};
use crate::config::Config;
use crate::input::{self, keys};
use crate::ledger::ProcessLedger;
use crate::lifecycle::{EditorConnection, Lifecycle};
use crate::reload::ReloadController;
use crate::snapshot::{diff, SnapshotEngine};

use super::response::ToolResponse;

/// Budget for the post-action diff poll inside input tools.
const ACTION_DIFF_TIMEOUT: Duration = Duration::from_secs(2);

/// Default budget for `wait_for`.
const WAIT_FOR_DEFAULT: Duration = Duration::from_secs(5);
const WAIT_FOR_POLL: Duration = Duration::from_millis(300);

pub type ToolFuture = Pin<Box<dyn Future<Output = anyhow::Result<ToolResponse>> + Send>>;
pub type Handler = fn(Arc<ToolContext>, Value) -> ToolFuture;

/// Everything a handler may touch, threaded explicitly.
pub struct ToolContext {
    pub config: Config,
    pub lifecycle: Arc<Lifecycle>,
    pub engine: Arc<SnapshotEngine>,
    pub ledger: Arc<ProcessLedger>,
    pub reload: Arc<ReloadController>,
}

impl ToolContext {
    /// The live connection; the dispatcher has already ensured it.
    pub fn connection(&self) -> anyhow::Result<Arc<EditorConnection>> {
        self.lifecycle
            .current()
            .filter(|conn| conn.transport.is_open())
            .context("no live editor connection")
    }
}

/// One registered tool.
pub struct Tool {
    pub name: &'static str,
    pub description: &'static str,
    /// Skips `ensure_connected` (no editor needed).
    pub standalone: bool,
    /// Input tools run even while a blocking modal is up.
    pub input: bool,
    /// Whether the process-ledger summary is appended.
    pub ledger: bool,
    pub handler: Handler,
}

/// Build the registered tool list.
pub fn registry() -> Vec<Tool> {
    vec![
        Tool {
            name: "snapshot",
            description: "Take an accessibility snapshot of the editor window",
            standalone: false,
            input: false,
            ledger: true,
            handler: snapshot_tool,
        },
        Tool {
            name: "mouse_click",
            description: "Click the element behind a snapshot uid",
            standalone: false,
            input: true,
            ledger: true,
            handler: mouse_click_tool,
        },
        Tool {
            name: "mouse_hover",
            description: "Move the pointer over an element",
            standalone: false,
            input: true,
            ledger: true,
            handler: mouse_hover_tool,
        },
        Tool {
            name: "mouse_drag",
            description: "Drag from one element to another",
            standalone: false,
            input: true,
            ledger: true,
            handler: mouse_drag_tool,
        },
        Tool {
            name: "fill",
            description: "Replace an element's text content",
            standalone: false,
            input: true,
            ledger: true,
            handler: fill_tool,
        },
        Tool {
            name: "keyboard_type",
            description: "Type text into the focused element",
            standalone: false,
            input: true,
            ledger: true,
            handler: keyboard_type_tool,
        },
        Tool {
            name: "keyboard_hotkey",
            description: "Press a key combo like Control+Shift+P",
            standalone: false,
            input: true,
            ledger: true,
            handler: keyboard_hotkey_tool,
        },
        Tool {
            name: "scroll",
            description: "Scroll an element into view and optionally wheel-scroll it",
            standalone: false,
            input: true,
            ledger: true,
            handler: scroll_tool,
        },
        Tool {
            name: "evaluate",
            description: "Evaluate a JavaScript expression in the workbench page",
            standalone: false,
            input: false,
            ledger: true,
            handler: evaluate_tool,
        },
        Tool {
            name: "screenshot",
            description: "Capture a screenshot of the editor window",
            standalone: false,
            input: false,
            ledger: true,
            handler: screenshot_tool,
        },
        Tool {
            name: "console_logs",
            description: "Drain buffered console output from the page",
            standalone: false,
            input: false,
            ledger: true,
            handler: console_logs_tool,
        },
        Tool {
            name: "wait_for",
            description: "Wait until the given text appears in the accessibility tree",
            standalone: false,
            input: false,
            ledger: true,
            handler: wait_for_tool,
        },
        Tool {
            name: "list_processes",
            description: "Show the tracked terminals and processes",
            standalone: true,
            input: false,
            ledger: false,
            handler: list_processes_tool,
        },
        Tool {
            name: "codebase_map",
            description: "Map the workspace's code structure",
            standalone: false,
            input: false,
            ledger: true,
            handler: codebase_map_tool,
        },
        Tool {
            name: "symbol_trace",
            description: "Trace a symbol through the workspace",
            standalone: false,
            input: false,
            ledger: true,
            handler: symbol_trace_tool,
        },
        Tool {
            name: "editor_task",
            description: "Run a named task inside the editor",
            standalone: false,
            input: false,
            ledger: true,
            handler: editor_task_tool,
        },
        Tool {
            name: "close_editor",
            description: "Close the controlled editor window and forget the session",
            standalone: true,
            input: false,
            ledger: true,
            handler: close_editor_tool,
        },
    ]
}

// -- argument helpers ---------------------------------------------------------

fn required_str(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .with_context(|| format!("missing required argument '{key}'"))
}

fn opt_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn opt_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

fn str_list(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

// -- handlers -----------------------------------------------------------------

fn snapshot_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let verbose = args.get("verbose").and_then(Value::as_bool).unwrap_or(false);
        let conn = ctx.connection()?;
        let fetched = ctx.engine.fetch_tree(&conn, verbose).await?;
        let mut response = ToolResponse::new();
        response.push_text(format!("## Page snapshot\n{}", fetched.text));
        Ok(response)
    })
}

fn mouse_click_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let uid = required_str(&args, "uid")?;
        let conn = ctx.connection()?;
        let summary = diff::execute_with_diff(
            &ctx.engine,
            &conn,
            input::click_element(&conn, &ctx.engine, &uid),
            ACTION_DIFF_TIMEOUT,
        )
        .await?;
        Ok(ToolResponse::text(format!("Clicked {uid}.\n{summary}")))
    })
}

fn mouse_hover_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let uid = required_str(&args, "uid")?;
        let conn = ctx.connection()?;
        input::hover_element(&conn, &ctx.engine, &uid).await?;
        Ok(ToolResponse::text(format!("Hovering over {uid}.")))
    })
}

fn mouse_drag_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let from = required_str(&args, "from_uid")?;
        let to = required_str(&args, "to_uid")?;
        let conn = ctx.connection()?;
        let summary = diff::execute_with_diff(
            &ctx.engine,
            &conn,
            input::drag_element(&conn, &ctx.engine, &from, &to),
            ACTION_DIFF_TIMEOUT,
        )
        .await?;
        Ok(ToolResponse::text(format!("Dragged {from} to {to}.\n{summary}")))
    })
}

fn fill_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let uid = required_str(&args, "uid")?;
        let text = required_str(&args, "text")?;
        let conn = ctx.connection()?;
        let summary = diff::execute_with_diff(
            &ctx.engine,
            &conn,
            input::fill_element(&conn, &ctx.engine, &uid, &text),
            ACTION_DIFF_TIMEOUT,
        )
        .await?;
        Ok(ToolResponse::text(format!("Filled {uid}.\n{summary}")))
    })
}

fn keyboard_type_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let text = required_str(&args, "text")?;
        let conn = ctx.connection()?;
        conn.transport.send("Input.insertText", json!({ "text": text }), None).await?;
        Ok(ToolResponse::text(format!("Typed {} characters.", text.chars().count())))
    })
}

fn keyboard_hotkey_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let spec = required_str(&args, "keys")?;
        let combo = keys::parse_combo(&spec)?;
        let conn = ctx.connection()?;
        let summary = diff::execute_with_diff(
            &ctx.engine,
            &conn,
            keys::dispatch_combo(&conn.transport, None, &combo),
            ACTION_DIFF_TIMEOUT,
        )
        .await?;
        Ok(ToolResponse::text(format!("Pressed {spec}.\n{summary}")))
    })
}

fn scroll_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let uid = required_str(&args, "uid")?;
        let direction = match opt_str(&args, "direction") {
            Some(d) => Some(d.parse::<input::ScrollDirection>()?),
            None => None,
        };
        let amount = opt_u64(&args, "amount").unwrap_or(3) as u32;
        let conn = ctx.connection()?;
        input::scroll_element(&conn, &ctx.engine, &uid, direction, amount).await?;
        Ok(ToolResponse::text(format!("Scrolled {uid}.")))
    })
}

fn evaluate_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let expression = required_str(&args, "expression")?;
        let conn = ctx.connection()?;
        let result = conn
            .transport
            .send(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true, "awaitPromise": true }),
                None,
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("evaluation threw");
            anyhow::bail!("expression threw: {text}");
        }

        let value = result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(ToolResponse::text(serde_json::to_string_pretty(&value)?))
    })
}

fn screenshot_tool(ctx: Arc<ToolContext>, _args: Value) -> ToolFuture {
    Box::pin(async move {
        let conn = ctx.connection()?;
        let result = conn
            .transport
            .send("Page.captureScreenshot", json!({ "format": "png" }), None)
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .context("screenshot response had no data")?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .context("screenshot data was not valid base64")?;
        let mut response = ToolResponse::new();
        match png_dimensions(&bytes) {
            Some((width, height)) => response.push_text(format!(
                "Screenshot: {width}x{height} PNG ({} KB)",
                bytes.len() / 1024
            )),
            None => response.push_text(format!("Screenshot: PNG ({} KB)", bytes.len() / 1024)),
        }
        response.push_image(data, "image/png");
        Ok(response)
    })
}

fn console_logs_tool(ctx: Arc<ToolContext>, _args: Value) -> ToolFuture {
    Box::pin(async move {
        let conn = ctx.connection()?;
        let lines = conn.console.drain();
        if lines.is_empty() {
            return Ok(ToolResponse::text("No console output since the last drain."));
        }
        Ok(ToolResponse::text(lines.join("\n")))
    })
}

fn wait_for_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let needle = required_str(&args, "text")?;
        let budget = opt_u64(&args, "timeout_ms")
            .map(Duration::from_millis)
            .unwrap_or(WAIT_FOR_DEFAULT);
        let conn = ctx.connection()?;

        let deadline = tokio::time::Instant::now() + budget;
        loop {
            let fetched = ctx.engine.fetch_tree(&conn, false).await?;
            if fetched.text.contains(&needle) {
                return Ok(ToolResponse::text(format!("Found {needle:?} on the page.")));
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("{needle:?} did not appear within {}ms", budget.as_millis());
            }
            tokio::time::sleep(WAIT_FOR_POLL).await;
        }
    })
}

fn list_processes_tool(ctx: Arc<ToolContext>, _args: Value) -> ToolFuture {
    Box::pin(async move {
        let summary = ctx
            .ledger
            .format_summary()
            .unwrap_or_else(|| "No tracked processes.".to_owned());
        Ok(ToolResponse::text(summary))
    })
}

fn codebase_map_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let scope = QueryScope {
            include: str_list(&args, "include"),
            exclude: str_list(&args, "exclude"),
            depth: opt_u64(&args, "depth").map(|d| d as u32),
            symbol: None,
        };
        let text = analyzer::query(ctx.lifecycle.host(), QueryKind::Overview, &scope).await?;
        Ok(ToolResponse::text(text))
    })
}

fn symbol_trace_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let symbol = required_str(&args, "symbol")?;
        let scope = QueryScope {
            include: str_list(&args, "include"),
            exclude: str_list(&args, "exclude"),
            depth: opt_u64(&args, "depth").map(|d| d as u32),
            symbol: Some(symbol),
        };
        let text = analyzer::query(ctx.lifecycle.host(), QueryKind::SymbolTrace, &scope).await?;
        Ok(ToolResponse::text(text))
    })
}

fn editor_task_tool(ctx: Arc<ToolContext>, args: Value) -> ToolFuture {
    Box::pin(async move {
        let name = required_str(&args, "name")?;
        let terminal = format!("task:{name}");
        ctx.ledger.record_spawn(&terminal, None, &name, None);
        let result = ctx.lifecycle.host().run_task(&name).await;
        match result {
            Ok(value) => {
                ctx.ledger.mark_completed(&terminal, Some(0));
                Ok(ToolResponse::text(format!(
                    "Task {name} finished: {}",
                    serde_json::to_string(&value)?
                )))
            }
            Err(e) => {
                ctx.ledger.mark_completed(&terminal, Some(1));
                Err(e)
            }
        }
    })
}

fn close_editor_tool(ctx: Arc<ToolContext>, _args: Value) -> ToolFuture {
    Box::pin(async move {
        if ctx.lifecycle.current().is_none() {
            return Ok(ToolResponse::text("No editor session to close."));
        }
        ctx.lifecycle.teardown().await;
        Ok(ToolResponse::text("Editor closed and session record removed."))
    })
}

/// Width and height from a PNG header, if `bytes` is one.
pub fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
    if bytes.len() < 24 || bytes[..8] != SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Some((width, height))
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
