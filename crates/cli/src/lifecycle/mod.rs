// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Editor process lifecycle: spawn, reconnect, teardown.
//!
//! At most one child editor exists at a time. `ensure_connected` is the
//! single public entry point: it returns the live connection, awaits a
//! connect already in flight, or performs reconnect-to-existing-window
//! with spawn as the fallback. The persisted session record under
//! `<workspace>/.devtools/` lets a restarted bridge readopt a window it
//! did not spawn.

pub mod persist;
pub mod ports;
pub mod userdata;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info, warn};

use drover_cdp::{CdpTransport, TargetRegistry};

use crate::config::Config;
use crate::console::ConsoleTap;
use crate::error::BridgeError;
use crate::host::HostBridge;
use persist::PersistedSession;

/// Title signature of the workbench page among the debug targets.
const WORKBENCH_TITLE_SIGNATURE: &str = r"(?i)visual studio code|vs ?code";

/// Budget for the host-bridge pipe to become connectable after the
/// window is up. This is the authoritative readiness signal.
const HOST_READY_BUDGET: Duration = Duration::from_secs(30);

/// Human-readable name for the extension-host debugger session.
const DEBUG_SESSION_NAME: &str = "Drover: extension host";

/// Env vars scrubbed from the child so it does not inherit the parent
/// editor's IPC hooks.
const SCRUBBED_ENV_EXACT: [&str; 2] = ["ELECTRON_RUN_AS_NODE", "ELECTRON_NO_ATTACH_CONSOLE"];
const SCRUBBED_ENV_PREFIX: &str = "VSCODE_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Detached,
    Connecting,
    Connected,
    ShuttingDown,
}

/// In-memory editor session fields. Singleton: owned by [`Lifecycle`].
#[derive(Debug, Clone)]
pub struct EditorSession {
    pub cdp_port: u16,
    pub inspector_port: u16,
    /// PID returned by spawn; on the Windows family this is a launcher
    /// stub that exits after forking the real process.
    pub launcher_pid: Option<u32>,
    /// The real Electron PID, recovered from the debug port listener.
    pub electron_pid: Option<u32>,
    pub user_data_dir: PathBuf,
    pub host_bridge_path: PathBuf,
    pub started_at_ms: u64,
}

/// A live, ready-to-drive connection to the editor window.
#[derive(Debug)]
pub struct EditorConnection {
    pub transport: Arc<CdpTransport>,
    pub registry: Arc<TargetRegistry>,
    pub console: Arc<ConsoleTap>,
    /// Strictly increases across successful connects in this process.
    pub generation: u64,
    pub session: EditorSession,
}

/// State the panic hook can reach synchronously for last-resort cleanup.
#[derive(Default)]
pub struct TeardownState {
    pub electron_pid: Mutex<Option<u32>>,
    pub cdp_port: Mutex<Option<u16>>,
    pub user_data_dir: Mutex<Option<PathBuf>>,
    pub session_file: Mutex<Option<PathBuf>>,
    /// Single-shot guard shared by every shutdown path.
    pub fired: AtomicBool,
}

pub struct Lifecycle {
    config: Config,
    host: HostBridge,
    state: Mutex<LifecycleState>,
    generation: AtomicU64,
    current: Arc<Mutex<Option<Arc<EditorConnection>>>>,
    /// Serializes connect attempts; concurrent callers await the holder.
    connect_lock: tokio::sync::Mutex<()>,
    teardown_state: Arc<TeardownState>,
}

impl Lifecycle {
    pub fn new(config: Config) -> Self {
        let host = HostBridge::for_workspace(&config.workspace_root());
        Self {
            config,
            host,
            state: Mutex::new(LifecycleState::Detached),
            generation: AtomicU64::new(0),
            current: Arc::new(Mutex::new(None)),
            connect_lock: tokio::sync::Mutex::new(()),
            teardown_state: Arc::new(TeardownState::default()),
        }
    }

    pub fn host(&self) -> &HostBridge {
        &self.host
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn teardown_state(&self) -> Arc<TeardownState> {
        Arc::clone(&self.teardown_state)
    }

    /// Latest connection generation (0 before the first connect).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn current(&self) -> Option<Arc<EditorConnection>> {
        self.current.lock().clone()
    }

    /// Idempotent connect. Returns the existing transport when open,
    /// joins a connect in flight, otherwise reconnects or spawns.
    pub async fn ensure_connected(&self) -> anyhow::Result<Arc<EditorConnection>> {
        if self.state() == LifecycleState::ShuttingDown {
            anyhow::bail!("bridge is shutting down");
        }
        if let Some(conn) = self.current() {
            if conn.transport.is_open() {
                return Ok(conn);
            }
        }

        // Concurrent callers queue here and re-check: whoever held the
        // lock has either connected (fast path below) or failed (the
        // next holder retries). There is never a second child editor.
        let _guard = self.connect_lock.lock().await;
        if let Some(conn) = self.current() {
            if conn.transport.is_open() {
                return Ok(conn);
            }
        }
        self.current.lock().take();
        *self.state.lock() = LifecycleState::Connecting;

        let result = match self.try_reconnect().await {
            Ok(Some(conn)) => Ok(conn),
            Ok(None) => self.spawn_fresh().await,
            Err(e) => {
                warn!("reconnect failed, spawning fresh: {e:#}");
                self.spawn_fresh().await
            }
        };

        match result {
            Ok(conn) => {
                *self.current.lock() = Some(Arc::clone(&conn));
                *self.state.lock() = LifecycleState::Connected;
                info!(generation = conn.generation, port = conn.session.cdp_port, "editor connected");
                Ok(conn)
            }
            Err(e) => {
                *self.state.lock() = LifecycleState::Detached;
                Err(e)
            }
        }
    }

    /// Reconnect to a window recorded in the persisted session file.
    /// `Ok(None)` means there is nothing usable to reconnect to.
    async fn try_reconnect(&self) -> anyhow::Result<Option<Arc<EditorConnection>>> {
        let session_file = self.config.session_file();
        let Some(persisted) = persist::load(&session_file) else {
            return Ok(None);
        };

        if !ports::probe_version(persisted.cdp_port).await {
            info!(port = persisted.cdp_port, "persisted window is gone, discarding record");
            persist::remove(&session_file);
            return Ok(None);
        }

        // Restore the recorded PID first so teardown can kill the window
        // even if the rest of the reconnect fails.
        *self.teardown_state.electron_pid.lock() = persisted.electron_pid;
        *self.teardown_state.cdp_port.lock() = Some(persisted.cdp_port);

        if let Some(pid) = persisted.electron_pid {
            if let Err(e) = self.host.register_pid(pid).await {
                debug!("pid re-registration failed (continuing): {e:#}");
            }
        }

        let session = EditorSession {
            cdp_port: persisted.cdp_port,
            inspector_port: persisted.inspector_port,
            launcher_pid: None,
            electron_pid: persisted.electron_pid,
            user_data_dir: persisted.user_data_dir.clone(),
            host_bridge_path: persisted.host_bridge_path.clone(),
            started_at_ms: persisted.debug_window_started_at,
        };

        match self.open_connection(session).await {
            Ok(conn) => {
                self.finalize_readiness(&conn.session).await;
                Ok(Some(conn))
            }
            Err(e) => {
                // The port answered but the WebSocket did not: the window
                // is wedged. Kill it and let the caller spawn fresh.
                warn!("persisted window refused the debug socket, replacing it: {e:#}");
                if let Some(pid) = persisted.electron_pid {
                    kill_pid_tree(pid).await;
                }
                persist::remove(&session_file);
                Ok(None)
            }
        }
    }

    /// Spawn a brand-new editor window and connect to it.
    async fn spawn_fresh(&self) -> anyhow::Result<Arc<EditorConnection>> {
        let session_file = self.config.session_file();

        // A stale record means a previous bridge died without teardown.
        // Adopt its PID so the orphan is killed instead of leaked.
        if let Some(stale) = persist::load(&session_file) {
            info!("cleaning up stale session record before spawn");
            *self.teardown_state.electron_pid.lock() = stale.electron_pid;
            if let Some(pid) = stale.electron_pid {
                kill_pid_tree(pid).await;
            } else if let Some(pid) = ports::discover_listening_pid(stale.cdp_port).await {
                kill_pid_tree(pid).await;
            }
            persist::remove(&session_file);
        }

        let executable = self.resolve_editor_executable().await?;
        let cdp_port = ports::alloc_port().context("allocating the remote-debug port")?;
        let inspector_port = ports::alloc_port().context("allocating the inspector port")?;

        let user_data_dir = self.config.user_data_dir();
        userdata::ensure_user_data_dir(&user_data_dir)?;
        if let Err(e) = userdata::ensure_gitignored(&self.config.workspace_root()) {
            debug!("could not update .gitignore: {e:#}");
        }

        let args = build_editor_args(&self.config, cdp_port, inspector_port);
        info!(executable = %executable.display(), cdp_port, inspector_port, "spawning editor");

        let mut command = tokio::process::Command::new(&executable);
        command
            .args(&args)
            .env_clear()
            .envs(scrubbed_env(std::env::vars()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = command
            .spawn()
            .with_context(|| format!("spawning {}", executable.display()))?;
        let launcher_pid = child.id();

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = tokio::io::BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "editor_stderr", "{line}");
                }
            });
        }
        // The child is detached: dropping the handle leaves it running
        // and the runtime reaps it in the background if it exits.
        drop(child);

        if !ports::wait_for_debug_port(cdp_port, self.config.connect_timeout_duration()).await {
            return Err(BridgeError::connection(
                format!(
                    "the editor's debug port {cdp_port} never opened within {}s",
                    self.config.connect_timeout
                ),
                &[
                    "the editor crashed during startup (re-run with DROVER_LOG_LEVEL=debug to see its stderr)",
                    "another editor instance already owns the user-data directory",
                    "a wrapper script swallowed the --remote-debugging-port flag",
                    "a sandbox or firewall blocked listening on localhost",
                ],
            )
            .into());
        }

        let electron_pid = ports::discover_listening_pid(cdp_port).await;
        *self.teardown_state.electron_pid.lock() = electron_pid;
        *self.teardown_state.cdp_port.lock() = Some(cdp_port);
        *self.teardown_state.user_data_dir.lock() = Some(user_data_dir.clone());

        if let Some(pid) = electron_pid {
            if let Err(e) = self.host.register_pid(pid).await {
                debug!("pid registration failed (continuing): {e:#}");
            }
        }

        let session = EditorSession {
            cdp_port,
            inspector_port,
            launcher_pid,
            electron_pid,
            user_data_dir,
            host_bridge_path: self.host.pipe_path().to_path_buf(),
            started_at_ms: persist::now_ms(),
        };

        let conn = self.open_connection(session).await?;
        self.finalize_readiness(&conn.session).await;
        Ok(conn)
    }

    /// Shared tail of both connect paths: resolve the workbench page,
    /// open the WebSocket, enable domains, wire subscribers, install the
    /// close handler, persist.
    async fn open_connection(&self, session: EditorSession) -> anyhow::Result<Arc<EditorConnection>> {
        let pages = ports::list_pages(session.cdp_port).await?;
        let ws_url = pick_workbench_page(&pages)
            .ok_or_else(|| anyhow::anyhow!("no debuggable page target on port {}", session.cdp_port))?;

        let transport = Arc::new(CdpTransport::connect(&ws_url).await?);

        transport.send("Runtime.enable", json!({}), None).await?;
        transport.send("Page.enable", json!({}), None).await?;
        transport.send("Target.setDiscoverTargets", json!({ "discover": true }), None).await?;
        transport
            .send(
                "Target.setAutoAttach",
                json!({
                    "autoAttach": true,
                    "waitForDebuggerOnStart": false,
                    "flatten": true,
                    "filter": [ { "type": "page" }, { "type": "iframe" } ],
                }),
                None,
            )
            .await?;

        let registry = Arc::new(TargetRegistry::new());
        registry.spawn_subscriber(transport.subscribe(), transport.closed());
        let console = Arc::new(ConsoleTap::new());
        console.spawn_subscriber(transport.subscribe(), transport.closed());

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        // Close handler: an intentional close just clears state; a
        // user-closed window means there is nothing left to control.
        {
            let transport = Arc::clone(&transport);
            let current = Arc::clone(&self.current);
            let session_file = self.config.session_file();
            tokio::spawn(async move {
                transport.closed().cancelled().await;
                if transport.was_intentional() {
                    debug!("debug transport closed intentionally");
                    current.lock().take();
                } else {
                    warn!("editor window closed by the user, exiting");
                    persist::remove(&session_file);
                    std::process::exit(0);
                }
            });
        }

        let persisted = PersistedSession {
            cdp_port: session.cdp_port,
            electron_pid: session.electron_pid,
            inspector_port: session.inspector_port,
            host_bridge_path: session.host_bridge_path.clone(),
            user_data_dir: session.user_data_dir.clone(),
            debug_window_started_at: session.started_at_ms,
            persisted_at: persist::now_ms(),
        };
        persist::store(&self.config.session_file(), &persisted)?;
        *self.teardown_state.session_file.lock() = Some(self.config.session_file());

        Ok(Arc::new(EditorConnection { transport, registry, console, generation, session }))
    }

    /// Post-connect readiness: the host-bridge pipe is the authoritative
    /// signal; the debugger attach is a convenience. Run in parallel.
    async fn finalize_readiness(&self, session: &EditorSession) {
        let wait = self.host.wait_ready(HOST_READY_BUDGET);
        let attach = self.host.attach_debugger(session.inspector_port, DEBUG_SESSION_NAME);
        let (ready, attach_result) = tokio::join!(wait, attach);
        if !ready {
            warn!("host bridge never became connectable; extension-backed tools will fail");
        }
        if let Err(e) = attach_result {
            warn!("debugger attach failed (continuing): {e:#}");
        }
    }

    async fn resolve_editor_executable(&self) -> anyhow::Result<PathBuf> {
        if let Some(ref path) = self.config.editor_path {
            if !path.exists() {
                anyhow::bail!("--editor-path does not exist: {}", path.display());
            }
            return Ok(path.clone());
        }

        match self.host.exec_path().await {
            Ok(path) => Ok(path),
            Err(e) => {
                // Chicken and egg: the extension that knows the path runs
                // inside the editor we are trying to spawn. When we were
                // launched by a node-compatible host, our own executable
                // is the editor.
                if std::env::var("DROVER_NODE_HOST").map(|v| v == "1").unwrap_or(false) {
                    return std::env::current_exe().context("resolving current executable");
                }
                Err(BridgeError::connection(
                    format!("could not resolve the editor executable: {e:#}"),
                    &[
                        "no editor window with the companion extension is running",
                        "pass --editor-path or set DROVER_EDITOR_PATH explicitly",
                        "set DROVER_NODE_HOST=1 when running under the editor's node host",
                    ],
                )
                .into())
            }
        }
    }

    /// Detach without killing: the window survives and the persisted
    /// record stays so the next bridge reconnects.
    pub fn graceful_detach(&self) {
        if let Some(conn) = self.current.lock().take() {
            conn.transport.set_intentional_close(true);
            conn.transport.close();
        }
        *self.state.lock() = LifecycleState::Detached;
        info!("detached from editor (window kept alive)");
    }

    /// Full teardown: kill the window and delete the session record.
    /// Every step is best-effort.
    pub async fn teardown(&self) {
        if self.teardown_state.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock() = LifecycleState::ShuttingDown;

        let conn = self.current.lock().take();
        if let Some(ref conn) = conn {
            conn.transport.set_intentional_close(true);
        }

        let pid = *self.teardown_state.electron_pid.lock();
        if let Some(pid) = pid {
            if let Err(e) = self.host.unregister_pid(pid).await {
                debug!("pid unregistration failed: {e:#}");
            }
        }

        if let Some(conn) = conn {
            conn.transport.close();
        }

        match pid {
            Some(pid) => kill_pid_tree(pid).await,
            None => {
                let port = *self.teardown_state.cdp_port.lock();
                if let Some(port) = port {
                    if let Some(pid) = ports::discover_listening_pid(port).await {
                        kill_pid_tree(pid).await;
                    } else {
                        let dir = self.teardown_state.user_data_dir.lock().clone();
                        if let Some(dir) = dir {
                            kill_by_user_data_dir(&dir).await;
                        }
                    }
                }
            }
        }

        persist::remove(&self.config.session_file());
        *self.teardown_state.electron_pid.lock() = None;
        *self.teardown_state.cdp_port.lock() = None;
        // Re-arm so a later spawn in this process can be torn down too.
        self.teardown_state.fired.store(false, Ordering::SeqCst);
        *self.state.lock() = LifecycleState::Detached;
        info!("editor session torn down");
    }

    pub fn mark_shutting_down(&self) {
        *self.state.lock() = LifecycleState::ShuttingDown;
    }
}

/// Pick the workbench page's WebSocket URL from `/json/list`: the first
/// page whose title matches the editor signature, else the first page.
pub fn pick_workbench_page(pages: &[Value]) -> Option<String> {
    let signature = regex::Regex::new(WORKBENCH_TITLE_SIGNATURE).ok()?;
    let is_page = |p: &&Value| p.get("type").and_then(Value::as_str) == Some("page");

    let by_title = pages.iter().filter(is_page).find(|p| {
        p.get("title").and_then(Value::as_str).is_some_and(|t| signature.is_match(t))
    });
    let chosen = by_title.or_else(|| pages.iter().find(is_page))?;
    chosen.get("webSocketDebuggerUrl").and_then(Value::as_str).map(str::to_owned)
}

/// Command-line flags for the child editor, target folder last.
pub fn build_editor_args(config: &Config, cdp_port: u16, inspector_port: u16) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={cdp_port}"),
        format!("--inspect-extensions={inspector_port}"),
        format!("--extensionDevelopmentPath={}", config.extension_dev_path().display()),
        format!("--user-data-dir={}", config.user_data_dir().display()),
        "--disable-updates".to_owned(),
    ];
    if config.new_window {
        args.push("--new-window".to_owned());
    }
    if config.skip_release_notes {
        args.push("--skip-release-notes".to_owned());
    }
    if config.skip_welcome {
        args.push("--skip-welcome".to_owned());
    }
    if config.disable_extensions {
        args.push("--disable-extensions".to_owned());
    }
    if config.disable_gpu {
        args.push("--disable-gpu".to_owned());
    }
    if config.disable_workspace_trust {
        args.push("--disable-workspace-trust".to_owned());
    }
    if config.editor_verbose {
        args.push("--verbose".to_owned());
    }
    if let Some(ref locale) = config.locale {
        args.push(format!("--locale={locale}"));
    }
    for id in &config.enable_extensions {
        args.push(format!("--enable-extension={id}"));
    }
    args.extend(config.editor_args.iter().cloned());
    args.push(config.workspace_root().display().to_string());
    args
}

/// Filter the parent environment down to what the child may inherit.
pub fn scrubbed_env(
    vars: impl Iterator<Item = (String, String)>,
) -> impl Iterator<Item = (String, String)> {
    vars.filter(|(name, _)| {
        !name.starts_with(SCRUBBED_ENV_PREFIX) && !SCRUBBED_ENV_EXACT.contains(&name.as_str())
    })
}

/// Kill the editor process tree.
pub async fn kill_pid_tree(pid: u32) {
    #[cfg(windows)]
    {
        let result = tokio::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .output()
            .await;
        if let Err(e) = result {
            warn!(pid, "taskkill failed: {e}");
        }
    }
    #[cfg(not(windows))]
    {
        kill_pid_blocking(pid);
    }
}

/// Synchronous kill, usable from the panic hook.
#[cfg(not(windows))]
pub fn kill_pid_blocking(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let Ok(pid_i32) = i32::try_from(pid) else { return };
    if let Err(e) = kill(Pid::from_raw(pid_i32), Signal::SIGKILL) {
        debug!(pid, "kill failed: {e}");
    }
}

#[cfg(windows)]
pub fn kill_pid_blocking(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .output();
}

/// Windows last resort: enumerate processes whose command line names the
/// user-data directory and kill each.
#[cfg(windows)]
async fn kill_by_user_data_dir(dir: &std::path::Path) {
    let filter = format!("CommandLine like '%{}%'", dir.display().to_string().replace('\\', "\\\\"));
    let output = tokio::process::Command::new("wmic")
        .args(["process", "where", &filter, "get", "ProcessId"])
        .output()
        .await;
    let Ok(output) = output else { return };
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        if let Ok(pid) = line.trim().parse::<u32>() {
            kill_pid_tree(pid).await;
        }
    }
}

#[cfg(not(windows))]
async fn kill_by_user_data_dir(_dir: &std::path::Path) {}

/// Last-resort synchronous teardown for the panic hook: kill the child
/// and drop the session record. Guarded by the same single-shot flag as
/// the async path.
pub fn teardown_blocking(state: &TeardownState) {
    if state.fired.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Some(pid) = *state.electron_pid.lock() {
        kill_pid_blocking(pid);
    }
    if let Some(ref path) = *state.session_file.lock() {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
