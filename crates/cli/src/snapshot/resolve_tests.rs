// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn node(id: &str, frame: &str, parent: Option<&str>, backend: Option<i64>) -> AxNode {
    AxNode {
        node_id: id.to_owned(),
        frame_key: frame.to_owned(),
        parent_id: parent.map(str::to_owned),
        backend_dom_node_id: backend,
        ..AxNode::default()
    }
}

fn map_of(nodes: &[AxNode]) -> HashMap<String, AxNode> {
    let mut map = HashMap::new();
    for n in nodes {
        map.insert(n.map_key(), n.clone());
        map.entry(n.node_id.clone()).or_insert_with(|| n.clone());
    }
    map
}

#[test]
fn dom_backed_node_resolves_to_itself() {
    let n = node("1", "f", None, Some(501));
    assert_eq!(backend_dom_id(&n, &map_of(&[n.clone()])), Some(501));
}

#[test]
fn virtual_node_walks_up_to_a_dom_backed_ancestor() {
    let root = node("1", "f", None, Some(501));
    let mid = node("2", "f", Some("1"), None);
    let leaf = node("3", "f", Some("2"), None);
    let all = map_of(&[root, mid, leaf.clone()]);
    assert_eq!(backend_dom_id(&leaf, &all), Some(501));
}

#[test]
fn fully_virtual_chain_resolves_to_none() {
    let root = node("1", "f", None, None);
    let leaf = node("2", "f", Some("1"), None);
    let all = map_of(&[root, leaf.clone()]);
    assert_eq!(backend_dom_id(&leaf, &all), None);
}

#[test]
fn frame_prefixed_key_wins_over_legacy() {
    // Two frames reuse node id "1"; only frame g's has a DOM id. The
    // walk from g's child must hit g's parent, not f's.
    let f_parent = node("1", "f", None, None);
    let g_parent = node("1", "g", None, Some(700));
    let g_child = node("2", "g", Some("1"), None);

    let mut all = HashMap::new();
    // Legacy unprefixed slot holds frame f's node (first frame wins).
    all.insert(f_parent.map_key(), f_parent.clone());
    all.insert("1".to_owned(), f_parent);
    all.insert(g_parent.map_key(), g_parent);
    all.insert(g_child.map_key(), g_child.clone());

    assert_eq!(backend_dom_id(&g_child, &all), Some(700));
}

#[test]
fn legacy_fallback_is_used_when_prefixed_key_is_absent() {
    let parent = node("1", "other-frame", None, Some(900));
    let child = node("2", "f", Some("1"), None);

    let mut all = HashMap::new();
    all.insert("1".to_owned(), parent);
    all.insert(child.map_key(), child.clone());

    assert_eq!(backend_dom_id(&child, &all), Some(900));
}

#[test]
fn parent_cycles_terminate() {
    let a = node("1", "f", Some("2"), None);
    let b = node("2", "f", Some("1"), None);
    let all = map_of(&[a.clone(), b]);
    assert_eq!(backend_dom_id(&a, &all), None);
}

#[test]
fn missing_parent_terminates_the_walk() {
    let orphan = node("5", "f", Some("99"), None);
    assert_eq!(backend_dom_id(&orphan, &map_of(&[orphan.clone()])), None);
}
