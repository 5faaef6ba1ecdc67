// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed bridge errors.
//!
//! Transport and protocol failures come from [`drover_cdp::CdpError`];
//! everything the bridge itself can fail with is here. Handlers propagate
//! freely with `?`; the tool dispatcher turns whatever bubbles up into an
//! error response with the full cause chain in the first text part.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// A UID from a snapshot that has since been replaced.
    #[error("{uid} is not in the current snapshot — take a new snapshot and retry")]
    StaleSnapshot { uid: String },

    /// The a11y node exists but nothing on its parent chain has a DOM node.
    #[error("{uid} is a virtual accessibility node with no DOM backing")]
    VirtualNode { uid: String },

    /// A modal dialog is up; non-input tools must not run.
    #[error("the editor is showing a blocking dialog: {message}")]
    BlockingUi { message: String },

    /// The per-tool budget elapsed. In-flight protocol requests are
    /// orphaned, not cancelled; their responses are dropped.
    #[error("tool '{tool}' timed out after {seconds}s")]
    ToolTimeout { tool: String, seconds: u64 },

    /// Could not spawn or reach the editor. The message carries the
    /// likely-cause bullets verbatim.
    #[error("{message}")]
    Connection { message: String },

    /// Self-rebuild failed; carries the build command's combined output.
    #[error("bridge rebuild failed:\n{output}")]
    Build { output: String },
}

impl BridgeError {
    pub fn stale_snapshot(uid: impl Into<String>) -> Self {
        Self::StaleSnapshot { uid: uid.into() }
    }

    pub fn virtual_node(uid: impl Into<String>) -> Self {
        Self::VirtualNode { uid: uid.into() }
    }

    /// Build a connection error with a bulleted likely-cause list.
    pub fn connection(reason: impl Into<String>, causes: &[&str]) -> Self {
        let mut message = reason.into();
        if !causes.is_empty() {
            message.push_str("\nLikely causes:");
            for cause in causes {
                message.push_str("\n  - ");
                message.push_str(cause);
            }
        }
        Self::Connection { message }
    }
}

/// Render an error with its full cause chain, outermost first.
pub fn render_chain(err: &anyhow::Error) -> String {
    let mut out = String::new();
    for (i, cause) in err.chain().enumerate() {
        if i == 0 {
            out.push_str(&cause.to_string());
        } else {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
        }
    }
    out
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
