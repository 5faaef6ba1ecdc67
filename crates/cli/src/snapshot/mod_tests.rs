// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::AtomicU64;

use serde_json::json;

use super::node::AxFlags;
use super::*;

fn ax(id: &str, role: &str, name: &str, parent: Option<&str>, children: &[&str]) -> AxNode {
    AxNode {
        node_id: id.to_owned(),
        frame_key: "main".to_owned(),
        role: role.to_owned(),
        name: name.to_owned(),
        parent_id: parent.map(str::to_owned),
        child_ids: children.iter().map(|c| (*c).to_owned()).collect(),
        backend_dom_node_id: Some(100),
        ..AxNode::default()
    }
}

fn build(nodes: &[AxNode], verbose: bool) -> Snapshot {
    let counter = AtomicU64::new(0);
    let mut builder = SnapshotBuilder::new(1, 1, &counter, verbose);
    builder.add_tree(nodes, Origin::Frame { frame_id: "main".to_owned() }, None);
    builder.finish()
}

// -- inclusion predicate ------------------------------------------------------

#[test]
fn uninteresting_roles_are_skipped_without_consuming_uids() {
    let nodes = vec![
        ax("1", "RootWebArea", "editor", None, &["2"]),
        ax("2", "generic", "", Some("1"), &["3"]),
        ax("3", "button", "Save", Some("2"), &[]),
    ];
    let snapshot = build(&nodes, false);

    // The generic wrapper is invisible: no UID, no indent for its child.
    assert!(snapshot.uid_nodes.values().all(|n| n.role != "generic"));
    assert_eq!(snapshot.uid_nodes.len(), 2);
    let lines: Vec<&str> = snapshot.text.lines().collect();
    assert!(lines[0].starts_with("uid=s1 RootWebArea"));
    assert_eq!(lines[1], " uid=s2 button \"Save\"");
}

#[test]
fn verbose_mode_includes_everything() {
    let mut ignored = ax("2", "button", "hidden", Some("1"), &[]);
    ignored.ignored = true;
    let nodes = vec![
        ax("1", "RootWebArea", "editor", None, &["2", "3"]),
        ignored,
        ax("3", "StaticText", "label", Some("1"), &[]),
    ];

    assert_eq!(build(&nodes, false).uid_nodes.len(), 1);
    assert_eq!(build(&nodes, true).uid_nodes.len(), 3);
}

#[test]
fn ignored_nodes_are_excluded_even_with_interesting_roles() {
    let mut node = ax("1", "button", "ghost", None, &[]);
    node.ignored = true;
    assert_eq!(build(&[node], false).uid_nodes.len(), 0);
}

// -- uid assignment and rendering ---------------------------------------------

#[test]
fn every_rendered_uid_resolves_to_a_node() {
    let nodes = vec![
        ax("1", "RootWebArea", "editor", None, &["2", "3"]),
        ax("2", "button", "Save", Some("1"), &[]),
        ax("3", "textbox", "Search", Some("1"), &[]),
    ];
    let snapshot = build(&nodes, false);

    for line in snapshot.text.lines() {
        let uid = line
            .trim_start()
            .strip_prefix("uid=")
            .and_then(|rest| rest.split(' ').next())
            .expect("line should start with uid=");
        assert!(snapshot.uid_nodes.contains_key(uid), "unresolvable {uid}");
    }
}

#[test]
fn flags_render_with_alias_and_original_name() {
    let mut node = ax("1", "button", "Save", None, &[]);
    node.flags = AxFlags { focused: true, disabled: true, ..AxFlags::default() };
    let snapshot = build(&[node], false);

    assert_eq!(snapshot.text, "uid=s1 button \"Save\" focusable focused disableable disabled");
}

#[test]
fn flags_without_alias_render_bare() {
    let mut node = ax("1", "checkbox", "Wrap", None, &[]);
    node.flags = AxFlags { checked: true, required: true, ..AxFlags::default() };
    let snapshot = build(&[node], false);
    assert_eq!(snapshot.text, "uid=s1 checkbox \"Wrap\" checked required");
}

#[test]
fn value_and_properties_render_after_flags() {
    let mut node = ax("1", "textbox", "Search", None, &[]);
    node.value = "TODO".to_owned();
    node.description = "Search files".to_owned();
    node.properties.push(("level".to_owned(), "2".to_owned()));
    let snapshot = build(&[node], false);

    assert_eq!(
        snapshot.text,
        "uid=s1 textbox \"Search\" description=\"Search files\" level=2 value=\"TODO\""
    );
}

#[test]
fn sub_target_trees_sit_under_a_bracketed_label() {
    let counter = AtomicU64::new(0);
    let mut builder = SnapshotBuilder::new(1, 1, &counter, false);
    builder.add_tree(
        &[ax("1", "RootWebArea", "editor", None, &[])],
        Origin::Frame { frame_id: "main".to_owned() },
        None,
    );

    let mut webview_node = ax("1", "button", "Refresh", None, &[]);
    webview_node.frame_key = "sess-9".to_owned();
    builder.add_tree(
        &[webview_node],
        Origin::Session { session_id: "sess-9".to_owned() },
        Some("[webview: vscode-webview://panel]".to_owned()),
    );

    let snapshot = builder.finish();
    let lines: Vec<&str> = snapshot.text.lines().collect();
    assert_eq!(lines[0], "uid=s1 RootWebArea \"editor\"");
    assert_eq!(lines[1], " [webview: vscode-webview://panel]");
    assert_eq!(lines[2], "  uid=s2 button \"Refresh\"");

    // The webview UID routes through its session.
    assert_eq!(
        snapshot.uid_origin.get("s2"),
        Some(&Origin::Session { session_id: "sess-9".to_owned() })
    );
}

// -- engine resolution --------------------------------------------------------

#[test]
fn uids_from_a_replaced_snapshot_go_stale() {
    let engine = SnapshotEngine::new();
    engine.install(build(&[ax("1", "button", "Old", None, &[])], false));
    assert!(engine.uid_to_node("s1").is_ok());

    // New snapshot; counter moved on, s1 is gone.
    let counter = AtomicU64::new(10);
    let mut builder = SnapshotBuilder::new(2, 1, &counter, false);
    builder.add_tree(
        &[ax("1", "button", "New", None, &[])],
        Origin::Frame { frame_id: "main".to_owned() },
        None,
    );
    engine.install(builder.finish());

    let err = engine.uid_to_node("s1").expect_err("stale uid");
    assert!(matches!(err, BridgeError::StaleSnapshot { .. }));
    assert!(engine.uid_to_node("s11").is_ok());
}

#[test]
fn resolve_for_input_threads_the_session() {
    let engine = SnapshotEngine::new();
    let counter = AtomicU64::new(0);
    let mut builder = SnapshotBuilder::new(1, 1, &counter, false);
    let mut node = ax("1", "button", "Go", None, &[]);
    node.frame_key = "sess-2".to_owned();
    node.backend_dom_node_id = Some(77);
    builder.add_tree(&[node], Origin::Session { session_id: "sess-2".to_owned() }, None);
    engine.install(builder.finish());

    let (backend, session) = engine.resolve_for_input("s1").expect("resolves");
    assert_eq!(backend, 77);
    assert_eq!(session.as_deref(), Some("sess-2"));
}

#[test]
fn virtual_only_chain_is_a_typed_error() {
    let engine = SnapshotEngine::new();
    let mut node = ax("1", "button", "Ghost", None, &[]);
    node.backend_dom_node_id = None;
    engine.install(build(&[node], false));

    let err = engine.uid_to_backend_dom_id("s1").expect_err("virtual");
    assert!(matches!(err, BridgeError::VirtualNode { .. }));
}

// -- frame collection and webview predicate -----------------------------------

#[test]
fn frame_tree_flattens_recursively() {
    let tree = json!({
        "frame": { "id": "A", "url": "app://workbench", "securityOrigin": "app://" },
        "childFrames": [
            {
                "frame": { "id": "B", "name": "panel", "url": "app://panel" },
                "childFrames": [
                    { "frame": { "id": "C", "url": "app://inner" } }
                ]
            }
        ]
    });
    let frames = collect_frames(Some(&tree));
    let ids: Vec<&str> = frames.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert_eq!(frames[1].name, "panel");
    assert_eq!(frames[0].security_origin, "app://");
}

#[test]
fn webview_predicate_matches_the_marker_list() {
    assert!(is_webview_url("vscode-webview://abc123/index"));
    assert!(is_webview_url("https://host/webview.html?id=1"));
    assert!(!is_webview_url("https://example.test/app"));
    assert!(!is_webview_url(""));
}
