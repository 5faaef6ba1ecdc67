// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

/// Control-plane bridge that drives a code editor for an AI agent.
#[derive(Debug, Clone, Parser)]
#[command(name = "drover", version, about)]
pub struct Config {
    /// Workspace folder the controlled editor opens.
    #[arg(env = "DROVER_WORKSPACE", default_value = ".")]
    pub workspace: PathBuf,

    /// Editor executable path (skips host-bridge discovery).
    #[arg(long, env = "DROVER_EDITOR_PATH")]
    pub editor_path: Option<PathBuf>,

    /// Companion extension development path loaded into the editor.
    #[arg(long, env = "DROVER_EXTENSION_PATH")]
    pub extension_path: Option<PathBuf>,

    /// Bridge source/build root used for self hot-reload. Hot reload is
    /// disabled when unset.
    #[arg(long, env = "DROVER_BRIDGE_ROOT")]
    pub bridge_root: Option<PathBuf>,

    /// Force a new editor window on spawn.
    #[arg(long, env = "DROVER_NEW_WINDOW")]
    pub new_window: bool,

    /// Hide the release-notes tab in the spawned window.
    #[arg(long, env = "DROVER_SKIP_RELEASE_NOTES")]
    pub skip_release_notes: bool,

    /// Skip the welcome page in the spawned window.
    #[arg(long, env = "DROVER_SKIP_WELCOME")]
    pub skip_welcome: bool,

    /// Disable all extensions except the companion extension.
    #[arg(long, env = "DROVER_DISABLE_EXTENSIONS")]
    pub disable_extensions: bool,

    /// Force the software renderer in the spawned window.
    #[arg(long, env = "DROVER_DISABLE_GPU")]
    pub disable_gpu: bool,

    /// Turn the workspace-trust prompt off.
    #[arg(long, env = "DROVER_DISABLE_WORKSPACE_TRUST")]
    pub disable_workspace_trust: bool,

    /// Verbose logging inside the spawned editor (not the bridge).
    #[arg(long, env = "DROVER_EDITOR_VERBOSE")]
    pub editor_verbose: bool,

    /// UI locale tag for the spawned editor (e.g. "en", "de").
    #[arg(long, env = "DROVER_LOCALE")]
    pub locale: Option<String>,

    /// Allow a specific extension id alongside --disable-extensions.
    #[arg(long = "enable-extension", env = "DROVER_ENABLE_EXTENSION")]
    pub enable_extensions: Vec<String>,

    /// Per-tool timeout in seconds.
    #[arg(long, env = "DROVER_TOOL_TIMEOUT", default_value = "30")]
    pub tool_timeout: u64,

    /// Budget in seconds for the spawned editor's debug port to open.
    #[arg(long, env = "DROVER_CONNECT_TIMEOUT", default_value = "30")]
    pub connect_timeout: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DROVER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text or json). Logs go to stderr; stdout carries the
    /// agent protocol.
    #[arg(long, env = "DROVER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Extra arguments passed through to the editor (after --).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub editor_args: Vec<String>,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.workspace.exists() {
            anyhow::bail!("workspace folder does not exist: {}", self.workspace.display());
        }
        if self.tool_timeout == 0 {
            anyhow::bail!("--tool-timeout must be at least 1 second");
        }
        if self.connect_timeout == 0 {
            anyhow::bail!("--connect-timeout must be at least 1 second");
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            anyhow::bail!("--log-format must be 'text' or 'json'");
        }
        Ok(())
    }

    /// Canonicalized workspace folder. Falls back to the raw path when
    /// canonicalization fails (validate() already checked existence).
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace.canonicalize().unwrap_or_else(|_| self.workspace.clone())
    }

    /// Bridge-private state directory inside the workspace.
    pub fn devtools_dir(&self) -> PathBuf {
        self.workspace_root().join(".devtools")
    }

    pub fn session_file(&self) -> PathBuf {
        self.devtools_dir().join("session.json")
    }

    pub fn user_data_dir(&self) -> PathBuf {
        self.devtools_dir().join("user-data")
    }

    /// Companion extension path: explicit flag, else `extension/` next to
    /// the bridge root, else `extension/` next to the running executable.
    pub fn extension_dev_path(&self) -> PathBuf {
        if let Some(ref path) = self.extension_path {
            return path.clone();
        }
        if let Some(ref root) = self.bridge_root {
            return root.join("extension");
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("extension")
    }

    pub fn tool_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.tool_timeout)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
