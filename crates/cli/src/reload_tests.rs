// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

fn t(base: SystemTime, secs: u64) -> SystemTime {
    base + Duration::from_secs(secs)
}

#[test]
fn fresh_build_and_source_are_current() {
    let base = SystemTime::UNIX_EPOCH;
    // source(10) < build(20) < start(30)
    assert_eq!(detect(Some(t(base, 10)), Some(t(base, 20)), t(base, 30)), ReloadDecision::Current);
}

#[test]
fn source_newer_than_build_means_rebuild() {
    let base = SystemTime::UNIX_EPOCH;
    assert_eq!(detect(Some(t(base, 40)), Some(t(base, 20)), t(base, 30)), ReloadDecision::Rebuild);
}

#[test]
fn build_newer_than_process_start_means_restart_only() {
    let base = SystemTime::UNIX_EPOCH;
    assert_eq!(
        detect(Some(t(base, 10)), Some(t(base, 40)), t(base, 30)),
        ReloadDecision::RestartOnly
    );
}

#[test]
fn rebuild_takes_priority_over_restart() {
    let base = SystemTime::UNIX_EPOCH;
    // Both conditions hold; rebuilding first is the only safe order.
    assert_eq!(detect(Some(t(base, 50)), Some(t(base, 40)), t(base, 30)), ReloadDecision::Rebuild);
}

#[test]
fn missing_build_output_is_never_stale() {
    let base = SystemTime::UNIX_EPOCH;
    assert_eq!(detect(Some(t(base, 50)), None, t(base, 30)), ReloadDecision::Current);
}

#[test]
fn missing_source_tree_can_still_trigger_restart() {
    let base = SystemTime::UNIX_EPOCH;
    assert_eq!(detect(None, Some(t(base, 40)), t(base, 30)), ReloadDecision::RestartOnly);
}

#[test]
fn newest_mtime_recurses_into_subdirectories() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::create_dir_all(dir.path().join("a/b"))?;
    std::fs::write(dir.path().join("a/old.rs"), "x")?;
    std::fs::write(dir.path().join("a/b/new.rs"), "y")?;

    let newest = newest_mtime(dir.path()).expect("has files");
    let deep = std::fs::metadata(dir.path().join("a/b/new.rs"))?.modified()?;
    assert!(newest >= deep);
    Ok(())
}

#[test]
fn newest_mtime_of_missing_dir_is_none() {
    assert_eq!(newest_mtime(Path::new("/nonexistent/drover-src")), None);
}

#[test]
fn controller_without_a_root_is_always_current() {
    let controller = ReloadController::new(None);
    assert_eq!(controller.check(), ReloadDecision::Current);
    assert!(!controller.restart_pending());
    assert!(controller.take_banner().is_none());
}

#[test]
fn marker_round_trips_into_a_banner_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_marker(dir.path())?;

    let banner = take_marker_banner(dir.path()).expect("banner");
    assert!(banner.contains("recently updated"), "got {banner}");
    // Marker is consumed: a second startup sees nothing.
    assert!(take_marker_banner(dir.path()).is_none());
    Ok(())
}

#[test]
fn controller_consumes_the_marker_at_startup() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::create_dir_all(dir.path().join("src"))?;
    write_marker(dir.path())?;

    let controller = ReloadController::new(Some(dir.path().to_path_buf()));
    let banner = controller.take_banner().expect("banner");
    assert!(banner.contains("recently updated"));
    assert!(controller.take_banner().is_none());
    assert!(!marker_path(dir.path()).exists());
    Ok(())
}
