// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors surfaced by the debug transport.
///
/// `Transport` means the socket is gone and the lifecycle layer must
/// reconnect before the next command; `Protocol` means the peer received
/// the command and rejected it.
#[derive(Debug, Clone, Error)]
pub enum CdpError {
    /// The WebSocket is not open (never connected, closing, or closed).
    #[error("debug transport is not open: {0}")]
    Transport(String),

    /// The remote debugger rejected a command.
    #[error("debugger rejected {method}: {message}")]
    Protocol { method: String, message: String },
}

impl CdpError {
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport(detail.into())
    }

    pub fn protocol(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol { method: method.into(), message: message.into() }
    }
}
