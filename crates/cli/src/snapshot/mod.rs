// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accessibility snapshot engine.
//!
//! `fetch_tree` walks the accessibility tree of every frame on the main
//! connection plus every attached OOPIF/webview session, assigns a
//! stable interaction UID (`s<counter>`) to each interesting node, and
//! renders the indented text the agent sees. The UID tables are replaced
//! atomically as one bundle: a UID from an older snapshot fails
//! resolution with a stale-snapshot error rather than acting on the
//! wrong element.

pub mod diff;
pub mod node;
pub mod resolve;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::lifecycle::EditorConnection;
use node::AxNode;

/// Roles that never get a UID (unless `verbose`): pure layout noise.
const UNINTERESTING_ROLES: [&str; 7] =
    ["generic", "none", "InlineTextBox", "StaticText", "LineBreak", "paragraph", "group"];

/// URL substrings that classify a sub-target as a webview. Tunable.
const WEBVIEW_URL_MARKERS: [&str; 3] = ["vscode-webview://", "webview.html", "vscode-app://"];

/// Alias map for the four flags rendered as adjectives; both the alias
/// and the original name are emitted.
const FLAG_ALIASES: [(&str, &str); 4] = [
    ("disabled", "disableable"),
    ("expanded", "expandable"),
    ("focused", "focusable"),
    ("selected", "selectable"),
];

/// Where a UID's node lives, for routing interactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A frame on the main page session.
    Frame { frame_id: String },
    /// An out-of-process sub-target.
    Session { session_id: String },
}

impl Origin {
    /// The session to thread through protocol commands, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Origin::Frame { .. } => None,
            Origin::Session { session_id } => Some(session_id),
        }
    }
}

/// One atomically-replaced snapshot bundle.
pub struct Snapshot {
    pub id: u64,
    /// Connection generation the snapshot was taken on.
    pub generation: u64,
    pub text: String,
    uid_nodes: HashMap<String, AxNode>,
    uid_origin: HashMap<String, Origin>,
    /// Every parsed node, keyed `frameKey:nodeId` with an unprefixed
    /// legacy fallback entry.
    all_nodes: HashMap<String, AxNode>,
}

/// Result of a fetch, for the caller's response.
pub struct FetchedTree {
    pub text: String,
    pub node_count: usize,
}

#[derive(Default)]
pub struct SnapshotEngine {
    current: Mutex<Option<Arc<Snapshot>>>,
    uid_counter: AtomicU64,
    snapshot_counter: AtomicU64,
}

impl SnapshotEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.lock().clone()
    }

    /// Fetch the accessibility tree across all frames and sub-targets,
    /// assign UIDs, and atomically install the new snapshot.
    pub async fn fetch_tree(
        &self,
        conn: &EditorConnection,
        verbose: bool,
    ) -> anyhow::Result<FetchedTree> {
        conn.transport.send("Accessibility.enable", json!({}), None).await?;
        conn.transport.send("Page.enable", json!({}), None).await?;

        let frame_tree = conn.transport.send("Page.getFrameTree", json!({}), None).await?;
        let frames = collect_frames(frame_tree.get("frameTree"));

        let mut builder = SnapshotBuilder::new(
            self.snapshot_counter.fetch_add(1, Ordering::Relaxed) + 1,
            conn.generation,
            &self.uid_counter,
            verbose,
        );

        // Same-process frames, main frame first.
        for frame in &frames {
            let result = conn
                .transport
                .send("Accessibility.getFullAXTree", json!({ "frameId": frame.id }), None)
                .await;
            match result {
                Ok(payload) => {
                    let nodes = parse_nodes(&payload, &frame.id);
                    builder.add_tree(&nodes, Origin::Frame { frame_id: frame.id.clone() }, None);
                }
                Err(e) => warn!(frame = %frame.id, "frame a11y tree failed, skipping: {e}"),
            }
        }

        // OOPIF and webview sub-targets, each behind its own session.
        for target in conn.registry.list_attached() {
            if target.kind != "iframe" && !is_webview_url(&target.url) {
                continue;
            }
            let session = target.session_id.as_str();
            let enable =
                conn.transport.send("Accessibility.enable", json!({}), Some(session)).await;
            if let Err(e) = enable {
                warn!(session, "could not enable a11y on sub-target: {e}");
                continue;
            }
            let result = conn
                .transport
                .send("Accessibility.getFullAXTree", json!({}), Some(session))
                .await;
            match result {
                Ok(payload) => {
                    let nodes = parse_nodes(&payload, session);
                    let label = sub_target_label(&target.kind, &target.url);
                    builder.add_tree(
                        &nodes,
                        Origin::Session { session_id: session.to_owned() },
                        Some(label),
                    );
                }
                Err(e) => warn!(session, "sub-target a11y tree failed, skipping: {e}"),
            }
        }

        let snapshot = builder.finish();
        let fetched =
            FetchedTree { text: snapshot.text.clone(), node_count: snapshot.uid_nodes.len() };
        debug!(snapshot = snapshot.id, nodes = fetched.node_count, "snapshot installed");
        *self.current.lock() = Some(Arc::new(snapshot));
        Ok(fetched)
    }

    /// Resolve a UID against the current snapshot.
    pub fn uid_to_node(&self, uid: &str) -> Result<AxNode, BridgeError> {
        let current = self.current();
        current
            .as_ref()
            .and_then(|s| s.uid_nodes.get(uid).cloned())
            .ok_or_else(|| BridgeError::stale_snapshot(uid))
    }

    pub fn uid_origin(&self, uid: &str) -> Result<Origin, BridgeError> {
        let current = self.current();
        current
            .as_ref()
            .and_then(|s| s.uid_origin.get(uid).cloned())
            .ok_or_else(|| BridgeError::stale_snapshot(uid))
    }

    /// UID → backend DOM node id, walking parents when the node itself
    /// is not DOM-backed.
    pub fn uid_to_backend_dom_id(&self, uid: &str) -> Result<i64, BridgeError> {
        let current = self.current();
        let snapshot = current.as_ref().ok_or_else(|| BridgeError::stale_snapshot(uid))?;
        let node =
            snapshot.uid_nodes.get(uid).ok_or_else(|| BridgeError::stale_snapshot(uid))?;
        resolve::backend_dom_id(node, &snapshot.all_nodes)
            .ok_or_else(|| BridgeError::virtual_node(uid))
    }

    /// Everything an input primitive needs: the DOM node id and the
    /// session to route through.
    pub fn resolve_for_input(&self, uid: &str) -> Result<(i64, Option<String>), BridgeError> {
        let backend_id = self.uid_to_backend_dom_id(uid)?;
        let origin = self.uid_origin(uid)?;
        Ok((backend_id, origin.session_id().map(str::to_owned)))
    }

    #[cfg(test)]
    pub(crate) fn install(&self, snapshot: Snapshot) {
        *self.current.lock() = Some(Arc::new(snapshot));
    }
}

/// The tunable webview predicate.
pub fn is_webview_url(url: &str) -> bool {
    WEBVIEW_URL_MARKERS.iter().any(|marker| url.contains(marker))
}

fn sub_target_label(kind: &str, url: &str) -> String {
    if is_webview_url(url) {
        format!("[webview: {url}]")
    } else {
        format!("[{kind}: {url}]")
    }
}

#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub security_origin: String,
}

/// Flatten `Page.getFrameTree` recursively, parents before children.
pub fn collect_frames(tree: Option<&Value>) -> Vec<FrameInfo> {
    let mut frames = Vec::new();
    collect_frames_into(tree, &mut frames);
    frames
}

fn collect_frames_into(tree: Option<&Value>, out: &mut Vec<FrameInfo>) {
    let Some(tree) = tree else { return };
    if let Some(frame) = tree.get("frame") {
        out.push(FrameInfo {
            id: frame.get("id").and_then(Value::as_str).unwrap_or_default().to_owned(),
            name: frame.get("name").and_then(Value::as_str).unwrap_or_default().to_owned(),
            url: frame.get("url").and_then(Value::as_str).unwrap_or_default().to_owned(),
            security_origin: frame
                .get("securityOrigin")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        });
    }
    for child in tree.get("childFrames").and_then(Value::as_array).into_iter().flatten() {
        collect_frames_into(Some(child), out);
    }
}

fn parse_nodes(payload: &Value, frame_key: &str) -> Vec<AxNode> {
    payload
        .get("nodes")
        .and_then(Value::as_array)
        .map(|nodes| nodes.iter().map(|raw| AxNode::parse(raw, frame_key)).collect())
        .unwrap_or_default()
}

/// Accumulates trees into one snapshot bundle.
pub struct SnapshotBuilder<'a> {
    snapshot_id: u64,
    generation: u64,
    uid_counter: &'a AtomicU64,
    verbose: bool,
    lines: Vec<String>,
    uid_nodes: HashMap<String, AxNode>,
    uid_origin: HashMap<String, Origin>,
    all_nodes: HashMap<String, AxNode>,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(
        snapshot_id: u64,
        generation: u64,
        uid_counter: &'a AtomicU64,
        verbose: bool,
    ) -> Self {
        Self {
            snapshot_id,
            generation,
            uid_counter,
            verbose,
            lines: Vec::new(),
            uid_nodes: HashMap::new(),
            uid_origin: HashMap::new(),
            all_nodes: HashMap::new(),
        }
    }

    /// Add one frame's (or sub-target's) tree. `label` indents the whole
    /// subtree one level under a bracketed marker line.
    pub fn add_tree(&mut self, nodes: &[AxNode], origin: Origin, label: Option<String>) {
        let by_id: HashMap<&str, &AxNode> =
            nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();

        for node in nodes {
            self.all_nodes.insert(node.map_key(), node.clone());
            // Legacy fallback: unprefixed key, first frame wins.
            self.all_nodes.entry(node.node_id.clone()).or_insert_with(|| node.clone());
        }

        let base = match label {
            Some(label) => {
                self.lines.push(format!(" {label}"));
                2
            }
            None => 0,
        };

        let roots: Vec<&AxNode> = nodes
            .iter()
            .filter(|n| {
                n.parent_id.as_deref().map(|p| !by_id.contains_key(p)).unwrap_or(true)
            })
            .collect();
        for root in roots {
            self.walk(root, &by_id, &origin, base);
        }
    }

    fn walk(
        &mut self,
        node: &AxNode,
        by_id: &HashMap<&str, &AxNode>,
        origin: &Origin,
        depth: usize,
    ) {
        let include =
            self.verbose || (!node.ignored && !UNINTERESTING_ROLES.contains(&node.role.as_str()));

        // Skipped nodes neither consume a UID nor indent their children.
        let child_depth = if include {
            let uid = format!("s{}", self.uid_counter.fetch_add(1, Ordering::Relaxed) + 1);
            self.lines.push(format!("{}{}", " ".repeat(depth), format_line(&uid, node)));
            self.uid_nodes.insert(uid.clone(), node.clone());
            self.uid_origin.insert(uid, origin.clone());
            depth + 1
        } else {
            depth
        };

        for child_id in &node.child_ids {
            if let Some(child) = by_id.get(child_id.as_str()) {
                self.walk(child, by_id, origin, child_depth);
            }
        }
    }

    pub fn finish(self) -> Snapshot {
        debug_assert!(self.uid_origin.keys().all(|uid| self.uid_nodes.contains_key(uid)));
        Snapshot {
            id: self.snapshot_id,
            generation: self.generation,
            text: self.lines.join("\n"),
            uid_nodes: self.uid_nodes,
            uid_origin: self.uid_origin,
            all_nodes: self.all_nodes,
        }
    }
}

/// One rendered line: `uid=sN role "name" <flags> prop=value value="…"`.
fn format_line(uid: &str, node: &AxNode) -> String {
    let mut line = format!("uid={uid} {} \"{}\"", node.role, node.name);

    for (name, set) in node.flags.entries() {
        if !set {
            continue;
        }
        match FLAG_ALIASES.iter().find(|(orig, _)| *orig == name) {
            Some((orig, alias)) => {
                line.push(' ');
                line.push_str(alias);
                line.push(' ');
                line.push_str(orig);
            }
            None => {
                line.push(' ');
                line.push_str(name);
            }
        }
    }

    if !node.description.is_empty() {
        line.push_str(&format!(" description=\"{}\"", node.description));
    }
    for (name, value) in &node.properties {
        line.push_str(&format!(" {name}={value}"));
    }
    if !node.value.is_empty() {
        line.push_str(&format!(" value=\"{}\"", node.value));
    }
    line
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
