// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-backed session record.
//!
//! `<workspace>/.devtools/session.json` mirrors the fields a restarted
//! bridge needs to rediscover an already-running editor window. Written
//! after every successful connect; deleted on intentional teardown or
//! when the window is proven dead.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub cdp_port: u16,
    pub electron_pid: Option<u32>,
    pub inspector_port: u16,
    pub host_bridge_path: PathBuf,
    pub user_data_dir: PathBuf,
    /// Wall-clock start of the debug window, ms since the epoch.
    pub debug_window_started_at: u64,
    /// When this record was written, ms since the epoch.
    pub persisted_at: u64,
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Read the persisted session, if any. A missing file is `Ok(None)`; a
/// corrupt file is treated the same way (the record is advisory) after a
/// debug log.
pub fn load(path: &Path) -> Option<PersistedSession> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            debug!("could not read {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(session) => Some(session),
        Err(e) => {
            debug!("discarding corrupt session record {}: {e}", path.display());
            None
        }
    }
}

/// Write the record, creating `.devtools/` if needed.
pub fn store(path: &Path, session: &PersistedSession) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(session)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Delete the record. Best-effort; missing is fine.
pub fn remove(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed session record {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("could not remove {}: {e}", path.display()),
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
