// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn alloc_port_returns_distinct_usable_ports() -> anyhow::Result<()> {
    let a = alloc_port()?;
    let b = alloc_port()?;
    assert!(a > 0);
    assert!(b > 0);
    // Binding again proves the port was released.
    std::net::TcpListener::bind(("127.0.0.1", a))?;
    Ok(())
}

#[test]
fn parse_lsof_takes_first_pid() {
    assert_eq!(parse_lsof_output("1234\n5678\n"), Some(1234));
    assert_eq!(parse_lsof_output("  901  \n"), Some(901));
    assert_eq!(parse_lsof_output(""), None);
    assert_eq!(parse_lsof_output("garbage\n"), None);
}

#[test]
fn parse_netstat_finds_listening_row_for_port() {
    let output = "\
  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1096
  TCP    127.0.0.1:9222         0.0.0.0:0              LISTENING       31412
  TCP    127.0.0.1:9222         127.0.0.1:53811        ESTABLISHED     31412
  UDP    0.0.0.0:5353           *:*                                    2044
";
    assert_eq!(parse_netstat_output(output, 9222), Some(31412));
    assert_eq!(parse_netstat_output(output, 135), Some(1096));
    assert_eq!(parse_netstat_output(output, 9999), None);
}

#[test]
fn parse_netstat_does_not_match_port_suffixes() {
    // :222 must not match :9222.
    let output = "  TCP    127.0.0.1:9222    0.0.0.0:0    LISTENING    31412\n";
    assert_eq!(parse_netstat_output(output, 222), None);
}

#[tokio::test]
async fn probe_version_is_false_for_closed_port() -> anyhow::Result<()> {
    // A port we just allocated and released has no listener.
    let port = alloc_port()?;
    assert!(!probe_version(port).await);
    Ok(())
}

#[tokio::test]
async fn wait_for_debug_port_gives_up_after_budget() -> anyhow::Result<()> {
    let port = alloc_port()?;
    let start = std::time::Instant::now();
    let ok = wait_for_debug_port(port, std::time::Duration::from_millis(100)).await;
    assert!(!ok);
    assert!(start.elapsed() < std::time::Duration::from_secs(10));
    Ok(())
}
