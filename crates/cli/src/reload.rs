// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self hot-reload: rebuild and restart the bridge when its own source
//! changes under it.
//!
//! Two conditions are checked per tool call: "source newer than build"
//! (rebuild, then restart) and "build newer than process start" (someone
//! else rebuilt; restart only). A `notify` watcher on the source root
//! keeps the per-call check cheap; a full mtime scan only runs after the
//! watcher has seen an event (or when no watcher could be installed).
//!
//! The restart itself is delegated to the companion extension, which
//! respawns the bridge after we exit. A marker file written just before
//! scheduling lets the next process prepend a "recently updated" banner.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::host::HostBridge;

/// Marker file name under the bridge root.
const RESTART_MARKER: &str = ".drover-restart";

/// Delay between scheduling a restart and exiting, enough for stdio to
/// flush the scheduling response.
const RESTART_EXIT_DELAY: Duration = Duration::from_millis(300);

/// What the per-call check decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadDecision {
    /// Nothing changed.
    Current,
    /// Source newer than the build output: rebuild, then restart.
    Rebuild,
    /// Build output newer than this process: restart only.
    RestartOnly,
}

pub struct ReloadController {
    bridge_root: Option<PathBuf>,
    process_started_at: SystemTime,
    restart_pending: AtomicBool,
    banner: Mutex<Option<String>>,
    /// Set by the watcher; cleared after a scan that found no change.
    dirty: Arc<AtomicBool>,
    watcher: Option<notify::RecommendedWatcher>,
}

impl ReloadController {
    pub fn new(bridge_root: Option<PathBuf>) -> Self {
        let dirty = Arc::new(AtomicBool::new(true));
        let watcher = bridge_root.as_ref().and_then(|root| {
            let flag = Arc::clone(&dirty);
            let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                if result.is_ok() {
                    flag.store(true, Ordering::Release);
                }
            })
            .ok()?;
            match watcher.watch(&root.join("src"), RecursiveMode::Recursive) {
                Ok(()) => Some(watcher),
                Err(e) => {
                    debug!("source watcher unavailable, falling back to scans: {e}");
                    None
                }
            }
        });

        let banner = bridge_root.as_ref().and_then(|root| take_marker_banner(root));

        Self {
            bridge_root,
            process_started_at: SystemTime::now(),
            restart_pending: AtomicBool::new(false),
            banner: Mutex::new(banner),
            dirty,
            watcher,
        }
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_pending.load(Ordering::Acquire)
    }

    /// The "recently updated" banner, consumed by the first response
    /// after a hot-reload restart.
    pub fn take_banner(&self) -> Option<String> {
        self.banner.lock().take()
    }

    /// Per-call staleness check.
    pub fn check(&self) -> ReloadDecision {
        let Some(ref root) = self.bridge_root else {
            return ReloadDecision::Current;
        };
        let Some(build_mtime) = build_output_mtime() else {
            return ReloadDecision::Current;
        };

        // Source scan only when the watcher saw something (or we have
        // no watcher and must scan every time).
        let must_scan = self.watcher.is_none() || self.dirty.load(Ordering::Acquire);
        if must_scan {
            let source_mtime = newest_mtime(&root.join("src"))
                .max(mtime_of(&root.join("Cargo.toml")));
            let decision = detect(source_mtime, Some(build_mtime), self.process_started_at);
            if decision == ReloadDecision::Current {
                self.dirty.store(false, Ordering::Release);
            }
            if decision != ReloadDecision::Current {
                return decision;
            }
        }

        detect(None, Some(build_mtime), self.process_started_at)
    }

    /// Run the build command in the bridge root. `BridgeError::Build`
    /// carries the combined stdout/stderr on failure.
    pub async fn rebuild(&self) -> anyhow::Result<()> {
        let Some(ref root) = self.bridge_root else {
            anyhow::bail!("no bridge root configured");
        };
        info!("bridge source changed, rebuilding");
        let output = tokio::process::Command::new("cargo")
            .args(["build"])
            .current_dir(root)
            .output()
            .await?;
        if output.status.success() {
            return Ok(());
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(BridgeError::Build { output: combined }.into())
    }

    /// Write the marker, ask the extension to respawn us, and exit after
    /// a short delay. The caller returns its response first.
    pub fn schedule_restart(&self, host: &HostBridge) {
        if self.restart_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(ref root) = self.bridge_root {
            if let Err(e) = write_marker(root) {
                debug!("could not write restart marker: {e}");
            }
        }
        let host = host.clone();
        tokio::spawn(async move {
            if let Err(e) = host.restart_bridge().await {
                warn!("restart request to the host bridge failed: {e:#}");
            }
            tokio::time::sleep(RESTART_EXIT_DELAY).await;
            info!("exiting for hot reload");
            std::process::exit(0);
        });
    }
}

/// Pure decision from the three timestamps.
pub fn detect(
    source_mtime: Option<SystemTime>,
    build_mtime: Option<SystemTime>,
    process_started_at: SystemTime,
) -> ReloadDecision {
    let Some(build) = build_mtime else { return ReloadDecision::Current };
    if let Some(source) = source_mtime {
        if source > build {
            return ReloadDecision::Rebuild;
        }
    }
    if build > process_started_at {
        return ReloadDecision::RestartOnly;
    }
    ReloadDecision::Current
}

fn build_output_mtime() -> Option<SystemTime> {
    let exe = std::env::current_exe().ok()?;
    mtime_of(&exe)
}

fn mtime_of(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Newest mtime under `dir`, recursively.
pub fn newest_mtime(dir: &Path) -> Option<SystemTime> {
    let mut newest = None;
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        let candidate =
            if path.is_dir() { newest_mtime(&path) } else { mtime_of(&path) };
        if candidate > newest {
            newest = candidate;
        }
    }
    newest
}

fn marker_path(root: &Path) -> PathBuf {
    root.join(RESTART_MARKER)
}

fn write_marker(root: &Path) -> std::io::Result<()> {
    std::fs::write(marker_path(root), format!("{}\n", crate::lifecycle::persist::now_ms()))
}

/// If a restart marker exists, consume it and build the banner text.
fn take_marker_banner(root: &Path) -> Option<String> {
    let path = marker_path(root);
    let marker_mtime = mtime_of(&path)?;
    let age = SystemTime::now().duration_since(marker_mtime).unwrap_or_default();
    let _ = std::fs::remove_file(&path);
    Some(format!("Bridge recently updated ({}s old build); state was reset.", age.as_secs()))
}

#[cfg(test)]
#[path = "reload_tests.rs"]
mod tests;
