// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serialized tool-call pipeline.
//!
//! One tool runs at a time. Per request: self-rebuild check, restart
//! short-circuit, ensure-connected, extension hot-reload check, mutex,
//! blocking-UI gate, the handler raced against its timeout, then
//! decoration (banners, ledger footer). Errors are enriched with a fresh
//! accessibility snapshot, suppressed when it would repeat the previous
//! error's snapshot on the same connection generation.

pub mod response;
pub mod tools;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{render_chain, BridgeError};
use crate::reload::{newest_mtime, ReloadDecision};

pub use response::ToolResponse;
pub use tools::{Tool, ToolContext};

/// Output directories probed for the companion extension's build.
const EXTENSION_BUILD_DIRS: [&str; 3] = ["out", "dist", "build"];

/// One agent tool call.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: Value,
    pub timeout: Duration,
}

pub struct Dispatcher {
    ctx: Arc<ToolContext>,
    tools: Vec<Tool>,
    /// Only one tool runs at a time.
    gate: tokio::sync::Mutex<()>,
    /// `(generation, text)` of the last snapshot sent on an error path.
    last_error_snapshot: Mutex<Option<(u64, String)>>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self::with_tools(ctx, tools::registry())
    }

    fn with_tools(ctx: Arc<ToolContext>, tools: Vec<Tool>) -> Self {
        Self { ctx, tools, gate: tokio::sync::Mutex::new(()), last_error_snapshot: Mutex::new(None) }
    }

    /// `(name, description)` pairs for the agent's tool listing.
    pub fn tool_list(&self) -> Vec<(&'static str, &'static str)> {
        self.tools.iter().map(|t| (t.name, t.description)).collect()
    }

    /// Run one tool call through the full pipeline.
    pub async fn handle(&self, request: ToolRequest) -> ToolResponse {
        // 1. Self-rebuild check, before anything can run on stale code.
        match self.ctx.reload.check() {
            ReloadDecision::Rebuild => match self.ctx.reload.rebuild().await {
                Ok(()) => {
                    self.ctx.reload.schedule_restart(self.ctx.lifecycle.host());
                    return ToolResponse::text(
                        "Bridge source changed: rebuilt successfully. Restarting — retry shortly.",
                    );
                }
                Err(e) => return ToolResponse::error(render_chain(&e)),
            },
            ReloadDecision::RestartOnly => {
                self.ctx.reload.schedule_restart(self.ctx.lifecycle.host());
                return ToolResponse::text("Bridge build updated. Restarting — retry shortly.");
            }
            ReloadDecision::Current => {}
        }

        // 2. A restart already scheduled wins over everything.
        if self.ctx.reload.restart_pending() {
            return ToolResponse::text("Bridge is restarting — retry shortly.");
        }

        // 3. Resolve the tool.
        let Some(tool) = self.tools.iter().find(|t| t.name == request.name) else {
            return ToolResponse::error(format!("unknown tool '{}'", request.name));
        };

        // 4. Bring up the editor, unless the tool runs standalone.
        if !tool.standalone {
            if let Err(e) = self.ctx.lifecycle.ensure_connected().await {
                return self.finalize(tool, self.error_response(e).await);
            }
            self.check_extension_reload().await;
        }

        // 5. Serialize: one tool at a time, released unconditionally on
        //    scope exit.
        let _guard = self.gate.lock().await;

        // 6. Blocking-UI gate. Input tools pass so the agent can dismiss
        //    the modal; everyone else gets the modal's message instead.
        let mut notification_banner = None;
        if !tool.standalone {
            match self.ctx.lifecycle.host().blocking_ui().await {
                Ok(info) => {
                    if info.blocked && !tool.input {
                        let message = info
                            .blocking_message
                            .unwrap_or_else(|| "a modal dialog is open".to_owned());
                        let err = BridgeError::BlockingUi { message };
                        return self.finalize(tool, self.error_response(err.into()).await);
                    }
                    if !info.notifications.is_empty() {
                        notification_banner =
                            Some(format!("Notifications:\n- {}", info.notifications.join("\n- ")));
                    }
                }
                Err(e) => debug!("blocking-UI probe failed, proceeding: {e:#}"),
            }
        }

        // 7. The handler races its timeout. On timeout the in-flight
        //    protocol requests are orphaned, not cancelled.
        let handler = (tool.handler)(Arc::clone(&self.ctx), request.arguments);
        let mut response = match tokio::time::timeout(request.timeout, handler).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => self.error_response(e).await,
            Err(_) => {
                let err = BridgeError::ToolTimeout {
                    tool: request.name.clone(),
                    seconds: request.timeout.as_secs(),
                };
                self.error_response(err.into()).await
            }
        };

        if let Some(banner) = notification_banner {
            response.prepend_text(banner);
        }
        self.finalize(tool, response)
    }

    /// Shared response decoration: restart-on-update banner first, then
    /// the process-ledger footer unless the tool opted out.
    fn finalize(&self, tool: &Tool, mut response: ToolResponse) -> ToolResponse {
        if let Some(banner) = self.ctx.reload.take_banner() {
            response.prepend_text(banner);
        }
        if tool.ledger {
            if let Some(summary) = self.ctx.ledger.format_summary() {
                response.push_text(summary);
            }
        }
        response
    }

    /// Error response: message with cause chain, then a fresh snapshot
    /// unless it would duplicate the previous error's.
    async fn error_response(&self, err: anyhow::Error) -> ToolResponse {
        warn!("tool failed: {err:#}");
        let mut response = ToolResponse::error(render_chain(&err));

        let Some(conn) =
            self.ctx.lifecycle.current().filter(|conn| conn.transport.is_open())
        else {
            return response;
        };
        let fetched = match self.ctx.engine.fetch_tree(&conn, false).await {
            Ok(fetched) => fetched,
            Err(e) => {
                debug!("could not take on-error snapshot: {e:#}");
                return response;
            }
        };

        let include = {
            let mut stored = self.last_error_snapshot.lock();
            let include = should_include_snapshot(stored.as_ref(), conn.generation, &fetched.text);
            *stored = Some((conn.generation, fetched.text.clone()));
            include
        };
        if include {
            response.push_text(format!("## Latest page snapshot\n{}", fetched.text));
        }
        response
    }

    /// Companion-extension hot reload: when the extension's source or
    /// build is newer than the current window, replace the window.
    async fn check_extension_reload(&self) {
        let Some(ext_root) = self.ctx.config.extension_path.clone() else { return };
        let Some(conn) = self.ctx.lifecycle.current() else { return };

        let source = newest_mtime(&ext_root.join("src"));
        let build = EXTENSION_BUILD_DIRS
            .iter()
            .filter_map(|dir| newest_mtime(&ext_root.join(dir)))
            .max();
        let Some(build) = build else { return };

        let source_stale = source.is_some_and(|s| s > build);
        let window_stale = mtime_ms(build) > conn.session.started_at_ms;
        if !source_stale && !window_stale {
            return;
        }

        info!("companion extension changed, replacing the editor window");
        if source_stale {
            if let Err(e) = self.ctx.lifecycle.host().run_task("build-extension").await {
                warn!("extension rebuild task failed (continuing): {e:#}");
            }
        }
        conn.transport.set_intentional_close(true);
        if let Err(e) = self.ctx.lifecycle.host().stop_window().await {
            warn!("stop-window request failed: {e:#}");
        }
        conn.transport.close();

        if let Err(e) = self.ctx.lifecycle.ensure_connected().await {
            warn!("reconnect after extension reload failed: {e:#}");
        }
    }
}

/// Include the on-error snapshot iff the connection generation changed
/// or the text differs from what was last sent on an error.
fn should_include_snapshot(stored: Option<&(u64, String)>, generation: u64, text: &str) -> bool {
    match stored {
        Some((last_generation, last_text)) => *last_generation != generation || last_text != text,
        None => true,
    }
}

fn mtime_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
