// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Before/after accessibility diffs, used to summarize what an action
//! changed on screen.
//!
//! The diff map is keyed by backend DOM node id (stable across
//! snapshots, unlike a11y node ids) and carries a compact signature per
//! interesting node. Added nodes in a summary are labelled
//! `s<diffId>_<index>` to keep them apart from regular snapshot UIDs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::{json, Value};

use crate::lifecycle::EditorConnection;

use super::node::{AxFlags, AxNode};
use super::{SnapshotEngine, UNINTERESTING_ROLES};

/// Poll cadence while waiting for a change to land.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Compact per-node signature compared across snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSignature {
    pub role: String,
    pub name: String,
    pub description: String,
    pub value: String,
    pub flags: AxFlags,
}

impl NodeSignature {
    pub fn of(node: &AxNode) -> Self {
        Self {
            role: node.role.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
            value: node.value.clone(),
            flags: node.flags,
        }
    }

    fn label(&self) -> String {
        format!("{} \"{}\"", self.role, self.name)
    }
}

pub type DiffMap = HashMap<i64, NodeSignature>;

/// The three change lists of one diff.
#[derive(Debug, Default)]
pub struct DiffReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Human-readable summary for a tool response.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return "No visible change detected.".to_owned();
        }
        let mut out = Vec::new();
        if !self.added.is_empty() {
            out.push(format!("Added:\n  {}", self.added.join("\n  ")));
        }
        if !self.removed.is_empty() {
            out.push(format!("Removed:\n  {}", self.removed.join("\n  ")));
        }
        if !self.changed.is_empty() {
            out.push(format!("Changed:\n  {}", self.changed.join("\n  ")));
        }
        out.join("\n")
    }
}

/// Fetch the main tree as a diff map, limited to interesting DOM-backed
/// nodes.
pub async fn fetch_for_diff(conn: &EditorConnection) -> anyhow::Result<DiffMap> {
    let payload = conn.transport.send("Accessibility.getFullAXTree", json!({}), None).await?;
    let mut map = DiffMap::new();
    for raw in payload.get("nodes").and_then(Value::as_array).into_iter().flatten() {
        let node = AxNode::parse(raw, "main");
        if node.ignored || UNINTERESTING_ROLES.contains(&node.role.as_str()) {
            continue;
        }
        let Some(backend_id) = node.backend_dom_node_id else { continue };
        map.insert(backend_id, NodeSignature::of(&node));
    }
    Ok(map)
}

/// Compare two diff maps: added (after only), removed (before only),
/// changed (both, signature differs, annotated with field deltas).
pub fn diff(before: &DiffMap, after: &DiffMap, diff_id: u64) -> DiffReport {
    let mut report = DiffReport::default();

    let mut added_ids: Vec<i64> =
        after.keys().filter(|id| !before.contains_key(*id)).copied().collect();
    added_ids.sort_unstable();
    for (index, id) in added_ids.iter().enumerate() {
        let sig = &after[id];
        report.added.push(format!("s{diff_id}_{index} {}", sig.label()));
    }

    let mut removed_ids: Vec<i64> =
        before.keys().filter(|id| !after.contains_key(*id)).copied().collect();
    removed_ids.sort_unstable();
    for id in removed_ids {
        report.removed.push(before[&id].label());
    }

    let mut changed_ids: Vec<i64> = before
        .iter()
        .filter(|&(id, old)| after.get(id).is_some_and(|new| new != old))
        .map(|(id, _)| *id)
        .collect();
    changed_ids.sort_unstable();
    for id in changed_ids {
        let old = &before[&id];
        let new = &after[&id];
        report.changed.push(format!("{}: {}", old.label(), field_deltas(old, new).join(", ")));
    }

    report
}

/// Per-field deltas between two signatures of the same node.
fn field_deltas(old: &NodeSignature, new: &NodeSignature) -> Vec<String> {
    let mut deltas = Vec::new();
    for (field, a, b) in [
        ("role", &old.role, &new.role),
        ("name", &old.name, &new.name),
        ("description", &old.description, &new.description),
        ("value", &old.value, &new.value),
    ] {
        if a != b {
            deltas.push(format!("{field} \"{a}\"→\"{b}\""));
        }
    }
    for ((name, was), (_, now)) in old.flags.entries().iter().zip(new.flags.entries().iter()) {
        if was != now {
            deltas.push(format!("{name} {was}→{now}"));
        }
    }
    deltas
}

/// Capture a before-map, run `action`, then poll until the tree changes
/// or `timeout` elapses. Returns the rendered summary.
pub async fn execute_with_diff<F>(
    engine: &SnapshotEngine,
    conn: &EditorConnection,
    action: F,
    timeout: Duration,
) -> anyhow::Result<String>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let before = fetch_for_diff(conn).await?;
    action.await?;

    let diff_id = engine.snapshot_counter.fetch_add(1, Ordering::Relaxed) + 1;
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let after = fetch_for_diff(conn).await?;
        let report = diff(&before, &after, diff_id);
        if !report.is_empty() {
            return Ok(report.render());
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(report.render());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
