// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port allocation, debug-endpoint probing, and real-PID discovery.
//!
//! The editor binary on the Windows family is a launcher stub that forks
//! the real process and exits, so the PID returned by spawn is useless
//! for teardown. The real PID is recovered from whoever is LISTENING on
//! the remote-debug port.

use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

/// Cadence of the debug-port poll after spawn.
const PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Per-request timeout for the HTTP probes.
const HTTP_TIMEOUT: Duration = Duration::from_secs(2);

/// Allocate a free TCP port by binding to :0 and reading back the
/// assigned number. The listener is dropped immediately; the editor
/// re-binds the port itself.
pub fn alloc_port() -> anyhow::Result<u16> {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").context("allocating a free port")?;
    Ok(listener.local_addr()?.port())
}

fn probe_client() -> reqwest::Client {
    reqwest::Client::builder().timeout(HTTP_TIMEOUT).build().unwrap_or_default()
}

/// One-shot probe of `/json/version`. `Ok(true)` means something that
/// speaks the debug protocol is listening.
pub async fn probe_version(port: u16) -> bool {
    let url = format!("http://127.0.0.1:{port}/json/version");
    match probe_client().get(&url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            debug!(port, "version probe failed: {e}");
            false
        }
    }
}

/// Poll `/json/version` until it answers or the budget runs out.
pub async fn wait_for_debug_port(port: u16, budget: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if probe_version(port).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(PROBE_INTERVAL).await;
    }
}

/// Fetch the target list from `/json/list`.
pub async fn list_pages(port: u16) -> anyhow::Result<Vec<Value>> {
    let url = format!("http://127.0.0.1:{port}/json/list");
    let resp = probe_client().get(&url).send().await.context("fetching /json/list")?;
    let pages: Vec<Value> = resp.json().await.context("parsing /json/list")?;
    Ok(pages)
}

/// Discover the PID listening on `port`.
///
/// Windows family: parse `netstat -ano`; elsewhere `lsof -ti :port`.
pub async fn discover_listening_pid(port: u16) -> Option<u32> {
    let pid = discover_impl(port).await;
    if pid.is_none() {
        warn!(port, "no LISTENING pid found; teardown may leak the editor process");
    }
    pid
}

#[cfg(windows)]
async fn discover_impl(port: u16) -> Option<u32> {
    let output = Command::new("netstat").args(["-ano"]).output().await.ok()?;
    parse_netstat_output(&String::from_utf8_lossy(&output.stdout), port)
}

#[cfg(not(windows))]
async fn discover_impl(port: u16) -> Option<u32> {
    let output = Command::new("lsof").args(["-ti", &format!(":{port}")]).output().await.ok()?;
    parse_lsof_output(&String::from_utf8_lossy(&output.stdout))
}

/// First PID in `lsof -ti` output (one PID per line).
pub fn parse_lsof_output(output: &str) -> Option<u32> {
    output.lines().find_map(|line| line.trim().parse().ok())
}

/// PID from the LISTENING row for `port` in `netstat -ano` output.
pub fn parse_netstat_output(output: &str, port: u16) -> Option<u32> {
    let needle = format!(":{port}");
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // Proto Local-Address Foreign-Address State PID
        if fields.len() < 5 || fields[0] != "TCP" {
            continue;
        }
        if fields[1].ends_with(&needle) && fields[3].eq_ignore_ascii_case("LISTENING") {
            if let Ok(pid) = fields[4].parse() {
                return Some(pid);
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
