// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `drover` binary with a temporary workspace and
//! exercises it over its stdio JSON-RPC protocol.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Per-response read budget.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolve the path to the compiled `drover` binary.
pub fn drover_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("drover")
}

/// A running `drover` process speaking line JSON-RPC; killed on drop.
pub struct DroverProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Keeps the workspace alive for the bridge's lifetime.
    _workspace: tempfile::TempDir,
    next_id: u64,
}

impl DroverProcess {
    /// Start the bridge against a fresh temporary workspace.
    pub fn start() -> anyhow::Result<Self> {
        let workspace = tempfile::tempdir()?;
        let mut child = Command::new(drover_binary())
            .arg(workspace.path())
            .env("DROVER_LOG_LEVEL", "error")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("spawning drover (run `cargo build` first)")?;

        let stdin = child.stdin.take().context("no stdin pipe")?;
        let stdout = BufReader::new(child.stdout.take().context("no stdout pipe")?);
        Ok(Self { child, stdin, stdout, _workspace: workspace, next_id: 0 })
    }

    /// Send one request line and read one response line.
    pub async fn request(&mut self, method: &str, params: Value) -> anyhow::Result<Value> {
        self.next_id += 1;
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id,
            "method": method,
            "params": params,
        });
        self.send_raw(&request.to_string()).await
    }

    /// Send a raw line (possibly malformed) and read one response line.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<Value> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;

        let mut response = String::new();
        let read = tokio::time::timeout(RESPONSE_TIMEOUT, self.stdout.read_line(&mut response))
            .await
            .context("timed out waiting for a response")??;
        anyhow::ensure!(read > 0, "bridge closed stdout");
        Ok(serde_json::from_str(response.trim())?)
    }

    /// Call a tool and return the `{content, isError}` result object.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        let response = self
            .request("tools/call", serde_json::json!({ "name": name, "arguments": arguments }))
            .await?;
        response.get("result").cloned().context("tool call had no result")
    }

    /// Close stdin (agent hangup) and wait for the exit code.
    pub async fn hang_up(mut self) -> anyhow::Result<Option<i32>> {
        drop(self.stdin);
        let status =
            tokio::time::timeout(RESPONSE_TIMEOUT, self.child.wait()).await.context("no exit")??;
        Ok(status.code())
    }
}
