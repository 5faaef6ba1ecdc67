// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process ledger: terminals and child processes spawned on behalf of
//! the agent, with a Markdown summary appended to tool responses.
//!
//! Each process appears in exactly one section per render. Completed
//! entries are capped at the three most recent.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Cap on the Recently-Completed section.
const COMPLETED_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Completed,
    Killed,
}

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// Terminal name, unique within the ledger.
    pub terminal: String,
    pub pid: Option<u32>,
    pub command: String,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
    /// Terminals spawned from this one.
    pub children: Vec<String>,
    pub started_at_ms: u64,
    /// Terminal that spawned this one, if any.
    pub parent_terminal: Option<String>,
    /// Monotonic order of completion; `None` while running.
    completed_seq: Option<u64>,
}

#[derive(Default)]
pub struct ProcessLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    completion_counter: std::sync::atomic::AtomicU64,
}

impl ProcessLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new running process. A re-used terminal name replaces
    /// the old entry.
    pub fn record_spawn(
        &self,
        terminal: &str,
        pid: Option<u32>,
        command: &str,
        parent_terminal: Option<&str>,
    ) {
        let mut entries = self.entries.lock();
        entries.retain(|e| e.terminal != terminal);
        if let Some(parent) = parent_terminal {
            if let Some(parent_entry) = entries.iter_mut().find(|e| e.terminal == parent) {
                if !parent_entry.children.contains(&terminal.to_owned()) {
                    parent_entry.children.push(terminal.to_owned());
                }
            }
        }
        entries.push(LedgerEntry {
            terminal: terminal.to_owned(),
            pid,
            command: command.to_owned(),
            status: ProcessStatus::Running,
            exit_code: None,
            children: Vec::new(),
            started_at_ms: now_ms(),
            parent_terminal: parent_terminal.map(str::to_owned),
            completed_seq: None,
        });
    }

    pub fn mark_completed(&self, terminal: &str, exit_code: Option<i32>) {
        self.set_status(terminal, ProcessStatus::Completed, exit_code);
    }

    pub fn mark_killed(&self, terminal: &str) {
        self.set_status(terminal, ProcessStatus::Killed, None);
    }

    fn set_status(&self, terminal: &str, status: ProcessStatus, exit_code: Option<i32>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.terminal == terminal) {
            entry.status = status;
            entry.exit_code = exit_code;
            entry.completed_seq = Some(
                self.completion_counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Render the Orphaned / Terminal-Sessions / Unmatched-Active /
    /// Recently-Completed Markdown layout. `None` when nothing tracked.
    pub fn format_summary(&self) -> Option<String> {
        let entries = self.entries.lock().clone();
        if entries.is_empty() {
            return None;
        }

        let running_names: Vec<&str> = entries
            .iter()
            .filter(|e| e.status == ProcessStatus::Running)
            .map(|e| e.terminal.as_str())
            .collect();
        let known_names: Vec<&str> = entries.iter().map(|e| e.terminal.as_str()).collect();

        let mut orphaned = Vec::new();
        let mut sessions = Vec::new();
        let mut unmatched = Vec::new();
        let mut completed = Vec::new();

        for entry in &entries {
            match entry.status {
                ProcessStatus::Running => match entry.parent_terminal.as_deref() {
                    None => sessions.push(render_running(entry)),
                    Some(parent) if !known_names.contains(&parent) => {
                        unmatched.push(render_running(entry));
                    }
                    Some(parent) if !running_names.contains(&parent) => {
                        orphaned.push(render_running(entry));
                    }
                    // Running under a live parent: rendered as that
                    // parent's child line, not its own bullet.
                    Some(_) => {}
                },
                ProcessStatus::Completed | ProcessStatus::Killed => {
                    completed.push((entry.completed_seq.unwrap_or(0), render_completed(entry)));
                }
            }
        }

        completed.sort_by_key(|(seq, _)| std::cmp::Reverse(*seq));
        let completed: Vec<String> =
            completed.into_iter().take(COMPLETED_LIMIT).map(|(_, line)| line).collect();

        let mut out = vec!["## Processes".to_owned()];
        if !orphaned.is_empty() {
            out.push(section("Orphaned", &orphaned));
        }
        if !sessions.is_empty() {
            let mut lines = Vec::new();
            for entry in entries.iter().filter(|e| {
                e.status == ProcessStatus::Running && e.parent_terminal.is_none()
            }) {
                lines.push(render_running(entry));
                for child in &entry.children {
                    if running_names.contains(&child.as_str()) {
                        lines.push(format!("  - child: {child}"));
                    }
                }
            }
            out.push(section("Terminal sessions", &lines));
        }
        if !unmatched.is_empty() {
            out.push(section("Unmatched active", &unmatched));
        }
        if !completed.is_empty() {
            out.push(section("Recently completed", &completed));
        }
        Some(out.join("\n"))
    }
}

fn section(title: &str, lines: &[String]) -> String {
    format!("### {title}\n{}", lines.join("\n"))
}

fn render_running(entry: &LedgerEntry) -> String {
    match entry.pid {
        Some(pid) => format!("- {} (pid {pid}, running): `{}`", entry.terminal, entry.command),
        None => format!("- {} (running): `{}`", entry.terminal, entry.command),
    }
}

fn render_completed(entry: &LedgerEntry) -> String {
    match (entry.status, entry.exit_code) {
        (ProcessStatus::Killed, _) => format!("- {} (killed): `{}`", entry.terminal, entry.command),
        (_, Some(code)) => format!("- {} (exit {code}): `{}`", entry.terminal, entry.command),
        (_, None) => format!("- {} (exited): `{}`", entry.terminal, entry.command),
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
