// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the companion extension running inside the controlled
//! editor.
//!
//! The extension listens on a per-workspace named pipe whose path is
//! derived deterministically from the workspace path, so the bridge can
//! compute it without any discovery step. Transport is one JSON request
//! per connection, newline-terminated, answered by one JSON response.
//! The pipe becoming connectable is also the authoritative signal that
//! the spawned window is ready to be driven.
//!
//! Every operation here is best-effort from the lifecycle's point of
//! view: failures are recoverable by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

/// Per-request timeout on the pipe.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cadence of readiness probes.
const READY_PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Blocking-UI state reported by the extension.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingUiInfo {
    /// A modal dialog is up; most tools must not run.
    #[serde(default)]
    pub blocked: bool,
    /// Human-readable description of the modal.
    #[serde(default)]
    pub blocking_message: Option<String>,
    /// Non-blocking notifications, shown as a banner.
    #[serde(default)]
    pub notifications: Vec<String>,
}

/// One-shot JSON RPC client for the in-editor companion extension.
#[derive(Debug, Clone)]
pub struct HostBridge {
    pipe_path: PathBuf,
    timeout: Duration,
}

impl HostBridge {
    /// Client for the pipe belonging to `workspace`.
    pub fn for_workspace(workspace: &Path) -> Self {
        Self { pipe_path: pipe_path_for(workspace), timeout: REQUEST_TIMEOUT }
    }

    /// Client for an explicit pipe path (restored from a persisted session).
    pub fn at_path(pipe_path: PathBuf) -> Self {
        Self { pipe_path, timeout: REQUEST_TIMEOUT }
    }

    pub fn pipe_path(&self) -> &Path {
        &self.pipe_path
    }

    #[cfg(test)]
    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Evaluate a JavaScript snippet in the editor's extension host and
    /// return its JSON result.
    pub async fn eval(&self, code: &str) -> anyhow::Result<Value> {
        self.request(json!({ "op": "eval", "code": code })).await
    }

    /// Ask the extension host for the editor's own executable path.
    pub async fn exec_path(&self) -> anyhow::Result<PathBuf> {
        let value = self.eval("process.execPath").await?;
        let path = value.as_str().context("process.execPath was not a string")?;
        Ok(PathBuf::from(path))
    }

    /// Attach a debugger session to an inspector port, first terminating
    /// any prior session matching the name prefix or the port.
    pub async fn attach_debugger(&self, port: u16, name: &str) -> anyhow::Result<()> {
        self.request(json!({ "op": "attachDebugger", "port": port, "name": name })).await?;
        Ok(())
    }

    /// Register a child PID so the host editor kills the window when it
    /// itself exits.
    pub async fn register_pid(&self, pid: u32) -> anyhow::Result<()> {
        self.request(json!({ "op": "registerPid", "pid": pid })).await?;
        Ok(())
    }

    pub async fn unregister_pid(&self, pid: u32) -> anyhow::Result<()> {
        self.request(json!({ "op": "unregisterPid", "pid": pid })).await?;
        Ok(())
    }

    /// Run a named task inside the editor.
    pub async fn run_task(&self, name: &str) -> anyhow::Result<Value> {
        self.request(json!({ "op": "runTask", "name": name })).await
    }

    /// Query whether a modal dialog or notification is up.
    pub async fn blocking_ui(&self) -> anyhow::Result<BlockingUiInfo> {
        let value = self.request(json!({ "op": "blockingUi" })).await?;
        Ok(serde_json::from_value(value).context("parsing blockingUi response")?)
    }

    /// Ask the extension to stop the controlled window (extension hot
    /// reload path).
    pub async fn stop_window(&self) -> anyhow::Result<()> {
        self.request(json!({ "op": "stopWindow" })).await?;
        Ok(())
    }

    /// Ask the extension to restart the bridge process after we exit.
    pub async fn restart_bridge(&self) -> anyhow::Result<()> {
        self.request(json!({ "op": "restartBridge" })).await?;
        Ok(())
    }

    /// Structured query against the extension's code-structure index.
    pub async fn code_query(&self, params: Value) -> anyhow::Result<Value> {
        self.request(json!({ "op": "codeQuery", "params": params })).await
    }

    /// Whether the pipe accepts a connection right now.
    pub async fn is_connectable(&self) -> bool {
        match tokio::time::timeout(Duration::from_secs(1), open_pipe(&self.pipe_path)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("host bridge not connectable: {e}");
                false
            }
            Err(_) => false,
        }
    }

    /// Probe until the pipe is connectable or the budget elapses. This
    /// is the single authoritative readiness signal for a spawned window.
    pub async fn wait_ready(&self, budget: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            if self.is_connectable().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(READY_PROBE_INTERVAL).await;
        }
    }

    /// One request, one connection. Responses are `{"ok": true,
    /// "result": ...}` or `{"ok": false, "error": "..."}`.
    async fn request(&self, body: Value) -> anyhow::Result<Value> {
        let response = tokio::time::timeout(self.timeout, self.request_inner(&body))
            .await
            .map_err(|_| anyhow::anyhow!("host bridge request timed out: {}", op_name(&body)))??;

        if response.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(response.get("result").cloned().unwrap_or(Value::Null));
        }
        let error = response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("malformed host bridge response");
        anyhow::bail!("host bridge rejected {}: {error}", op_name(&body))
    }

    async fn request_inner(&self, body: &Value) -> anyhow::Result<Value> {
        let stream = open_pipe(&self.pipe_path)
            .await
            .with_context(|| format!("connecting to {}", self.pipe_path.display()))?;
        let (read_half, mut write_half) = tokio::io::split(stream);

        let mut payload = body.to_string();
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await.context("writing host request")?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.context("reading host response")?;
        if line.trim().is_empty() {
            anyhow::bail!("host bridge closed the pipe without a response");
        }
        Ok(serde_json::from_str(line.trim()).context("parsing host response")?)
    }
}

fn op_name(body: &Value) -> &str {
    body.get("op").and_then(Value::as_str).unwrap_or("request")
}

#[cfg(unix)]
async fn open_pipe(path: &Path) -> std::io::Result<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(path).await
}

#[cfg(windows)]
async fn open_pipe(
    path: &Path,
) -> std::io::Result<tokio::net::windows::named_pipe::NamedPipeClient> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(path)
}

/// Deterministic pipe path for a workspace: a short digest of the
/// canonical workspace path, so both sides can compute it independently.
pub fn pipe_path_for(workspace: &Path) -> PathBuf {
    let canonical = workspace.canonicalize().unwrap_or_else(|_| workspace.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let tag = hex_prefix(digest.as_slice(), 12);

    #[cfg(windows)]
    {
        PathBuf::from(format!(r"\\.\pipe\drover-host-{tag}"))
    }
    #[cfg(not(windows))]
    {
        std::env::temp_dir().join(format!("drover-host-{tag}.sock"))
    }
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in bytes {
        for digit in [byte >> 4, byte & 0xf] {
            if out.len() == chars {
                return out;
            }
            out.push(char::from_digit(digit as u32, 16).unwrap_or('0'));
        }
    }
    out
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
