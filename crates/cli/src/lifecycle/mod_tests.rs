// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use serde_json::json;

use super::*;

fn config_for(dir: &std::path::Path) -> Config {
    Config::try_parse_from([
        "drover",
        dir.to_str().expect("utf8 path"),
        "--extension-path",
        "/opt/drover/extension",
    ])
    .expect("config should parse")
}

// -- editor args --------------------------------------------------------------

#[test]
fn editor_args_always_carry_the_fixed_flags_and_end_with_the_folder() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_for(dir.path());
    let args = build_editor_args(&config, 9222, 9333);

    assert_eq!(args[0], "--remote-debugging-port=9222");
    assert_eq!(args[1], "--inspect-extensions=9333");
    assert_eq!(args[2], "--extensionDevelopmentPath=/opt/drover/extension");
    assert!(args[3].starts_with("--user-data-dir="));
    assert_eq!(args[4], "--disable-updates");

    let folder = args.last().expect("non-empty");
    assert!(!folder.starts_with("--"), "target folder must be positional, got {folder}");
}

#[test]
fn optional_editor_flags_appear_only_when_configured() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config_for(dir.path());
    let baseline = build_editor_args(&config, 1, 2);
    assert!(!baseline.contains(&"--new-window".to_owned()));
    assert!(!baseline.contains(&"--disable-gpu".to_owned()));

    config.new_window = true;
    config.disable_gpu = true;
    config.disable_workspace_trust = true;
    config.editor_verbose = true;
    config.locale = Some("de".to_owned());
    config.enable_extensions = vec!["a.b".to_owned(), "c.d".to_owned()];
    config.editor_args = vec!["--passthrough".to_owned()];

    let args = build_editor_args(&config, 1, 2);
    assert!(args.contains(&"--new-window".to_owned()));
    assert!(args.contains(&"--disable-gpu".to_owned()));
    assert!(args.contains(&"--disable-workspace-trust".to_owned()));
    assert!(args.contains(&"--verbose".to_owned()));
    assert!(args.contains(&"--locale=de".to_owned()));
    assert!(args.contains(&"--enable-extension=a.b".to_owned()));
    assert!(args.contains(&"--enable-extension=c.d".to_owned()));
    // Passthrough args come before the positional folder.
    let passthrough = args.iter().position(|a| a == "--passthrough").expect("present");
    assert_eq!(passthrough, args.len() - 2);
}

// -- env scrubbing ------------------------------------------------------------

#[test]
fn scrubbing_removes_editor_ipc_vars_and_keeps_the_rest() {
    let vars = vec![
        ("PATH".to_owned(), "/usr/bin".to_owned()),
        ("VSCODE_IPC_HOOK".to_owned(), "/tmp/hook.sock".to_owned()),
        ("VSCODE_PID".to_owned(), "123".to_owned()),
        ("ELECTRON_RUN_AS_NODE".to_owned(), "1".to_owned()),
        ("ELECTRON_NO_ATTACH_CONSOLE".to_owned(), "1".to_owned()),
        ("HOME".to_owned(), "/home/u".to_owned()),
    ];
    let kept: Vec<String> = scrubbed_env(vars.into_iter()).map(|(k, _)| k).collect();
    assert_eq!(kept, vec!["PATH".to_owned(), "HOME".to_owned()]);
}

// -- workbench page selection -------------------------------------------------

#[test]
fn workbench_page_prefers_the_title_signature() {
    let pages = vec![
        json!({ "type": "iframe", "title": "Visual Studio Code", "webSocketDebuggerUrl": "ws://x/0" }),
        json!({ "type": "page", "title": "DevTools", "webSocketDebuggerUrl": "ws://x/1" }),
        json!({ "type": "page", "title": "project — Visual Studio Code", "webSocketDebuggerUrl": "ws://x/2" }),
    ];
    assert_eq!(pick_workbench_page(&pages).as_deref(), Some("ws://x/2"));
}

#[test]
fn workbench_page_falls_back_to_first_page() {
    let pages = vec![
        json!({ "type": "iframe", "title": "frame", "webSocketDebuggerUrl": "ws://x/0" }),
        json!({ "type": "page", "title": "Untitled", "webSocketDebuggerUrl": "ws://x/1" }),
    ];
    assert_eq!(pick_workbench_page(&pages).as_deref(), Some("ws://x/1"));
}

#[test]
fn no_page_targets_means_no_workbench() {
    let pages = vec![json!({ "type": "iframe", "title": "frame" })];
    assert_eq!(pick_workbench_page(&pages), None);
    assert_eq!(pick_workbench_page(&[]), None);
}

// -- teardown -----------------------------------------------------------------

#[test]
fn blocking_teardown_removes_the_session_record_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let session_file = dir.path().join("session.json");
    std::fs::write(&session_file, "{}")?;

    let state = TeardownState::default();
    *state.session_file.lock() = Some(session_file.clone());

    teardown_blocking(&state);
    assert!(!session_file.exists());

    // Second invocation is a guarded no-op.
    std::fs::write(&session_file, "{}")?;
    teardown_blocking(&state);
    assert!(session_file.exists());
    Ok(())
}

#[tokio::test]
async fn ensure_connected_fails_cleanly_without_an_editor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_for(dir.path());
    let lifecycle = Lifecycle::new(config);

    // No persisted session, no host bridge, no DROVER_NODE_HOST: the
    // executable cannot be resolved and the attempt must fail without
    // leaving the lifecycle wedged.
    let err = lifecycle.ensure_connected().await.expect_err("no editor available");
    assert!(err.to_string().contains("executable"), "got: {err:#}");
    assert_eq!(lifecycle.state(), LifecycleState::Detached);
    assert_eq!(lifecycle.generation(), 0);
    assert!(lifecycle.current().is_none());
}

#[tokio::test]
async fn debug_port_never_opening_is_fatal_with_diagnostics() -> anyhow::Result<()> {
    // `/bin/true` spawns fine, ignores every editor flag, and exits
    // without ever opening the debug port.
    if !std::path::Path::new("/bin/true").exists() {
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let config = Config::try_parse_from([
        "drover",
        dir.path().to_str().expect("utf8 path"),
        "--editor-path",
        "/bin/true",
        "--extension-path",
        "/opt/drover/extension",
        "--connect-timeout",
        "1",
    ])?;

    let lifecycle = Lifecycle::new(config.clone());
    let err = lifecycle.ensure_connected().await.expect_err("port never opens");
    let text = format!("{err:#}");
    assert!(text.contains("never opened"), "got: {text}");
    assert!(text.contains("Likely causes:"));
    assert_eq!(text.matches("\n  - ").count(), 4, "four diagnostic bullets: {text}");

    // Nothing was persisted for a window that never came up.
    assert!(persist::load(&config.session_file()).is_none());
    assert_eq!(lifecycle.state(), LifecycleState::Detached);
    Ok(())
}

#[tokio::test]
async fn stale_unreachable_session_record_is_discarded() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_for(dir.path());

    let port = ports::alloc_port()?;
    let record = persist::PersistedSession {
        cdp_port: port,
        electron_pid: None,
        inspector_port: 0,
        host_bridge_path: dir.path().join("host.sock"),
        user_data_dir: dir.path().join("user-data"),
        debug_window_started_at: 0,
        persisted_at: 0,
    };
    persist::store(&config.session_file(), &record)?;

    let lifecycle = Lifecycle::new(config.clone());
    // Reconnect fails (nothing listens on the port), spawn also fails
    // (no executable); the stale record must be gone afterwards.
    let _ = lifecycle.ensure_connected().await.expect_err("nothing to connect to");
    assert!(persist::load(&config.session_file()).is_none());
    Ok(())
}
