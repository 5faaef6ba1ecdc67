// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample() -> PersistedSession {
    PersistedSession {
        cdp_port: 9222,
        electron_pid: Some(4242),
        inspector_port: 9333,
        host_bridge_path: PathBuf::from("/tmp/drover-host-abc.sock"),
        user_data_dir: PathBuf::from("/ws/.devtools/user-data"),
        debug_window_started_at: 1_700_000_000_000,
        persisted_at: 1_700_000_060_000,
    }
}

#[test]
fn store_then_load_round_trips() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(".devtools").join("session.json");

    store(&path, &sample())?;
    let loaded = load(&path).expect("record should load");
    assert_eq!(loaded, sample());
    Ok(())
}

#[test]
fn field_names_are_camel_case_on_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    store(&path, &sample())?;

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(raw["cdpPort"], 9222);
    assert_eq!(raw["electronPid"], 4242);
    assert_eq!(raw["inspectorPort"], 9333);
    assert!(raw["hostBridgePath"].is_string());
    assert!(raw["userDataDir"].is_string());
    assert!(raw["debugWindowStartedAt"].is_u64());
    assert!(raw["persistedAt"].is_u64());
    Ok(())
}

#[test]
fn missing_file_loads_as_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(load(&dir.path().join("session.json")).is_none());
}

#[test]
fn corrupt_file_loads_as_none() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{not json")?;
    assert!(load(&path).is_none());
    Ok(())
}

#[test]
fn remove_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    store(&path, &sample())?;
    remove(&path);
    assert!(!path.exists());
    remove(&path);
    Ok(())
}
