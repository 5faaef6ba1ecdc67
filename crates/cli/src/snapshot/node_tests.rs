// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

#[test]
fn parses_a_full_protocol_node() {
    let raw = json!({
        "nodeId": "42",
        "ignored": false,
        "role": { "type": "role", "value": "button" },
        "name": { "type": "computedString", "value": "Save All" },
        "description": { "type": "computedString", "value": "Saves every file" },
        "value": { "type": "string", "value": "" },
        "properties": [
            { "name": "focused", "value": { "type": "booleanOrUndefined", "value": true } },
            { "name": "disabled", "value": { "type": "booleanOrUndefined", "value": false } },
            { "name": "level", "value": { "type": "integer", "value": 2 } },
        ],
        "parentId": "41",
        "childIds": ["43", "44"],
        "backendDOMNodeId": 1007,
    });

    let node = AxNode::parse(&raw, "frame-a");
    assert_eq!(node.node_id, "42");
    assert_eq!(node.frame_key, "frame-a");
    assert_eq!(node.role, "button");
    assert_eq!(node.name, "Save All");
    assert_eq!(node.description, "Saves every file");
    assert!(node.flags.focused);
    assert!(!node.flags.disabled);
    assert_eq!(node.properties, vec![("level".to_owned(), "2".to_owned())]);
    assert_eq!(node.parent_id.as_deref(), Some("41"));
    assert_eq!(node.child_ids, vec!["43".to_owned(), "44".to_owned()]);
    assert_eq!(node.backend_dom_node_id, Some(1007));
    assert_eq!(node.map_key(), "frame-a:42");
}

#[test]
fn missing_fields_default_cleanly() {
    let node = AxNode::parse(&json!({ "nodeId": "1" }), "f");
    assert_eq!(node.role, "");
    assert_eq!(node.name, "");
    assert!(!node.ignored);
    assert!(node.child_ids.is_empty());
    assert_eq!(node.backend_dom_node_id, None);
    assert_eq!(node.flags, AxFlags::default());
}

#[test]
fn tri_state_checked_counts_as_set() {
    let raw = json!({
        "nodeId": "1",
        "properties": [
            { "name": "checked", "value": { "type": "tristate", "value": "mixed" } },
            { "name": "pressed", "value": { "type": "tristate", "value": "false" } },
        ],
    });
    let node = AxNode::parse(&raw, "f");
    assert!(node.flags.checked);
    assert!(!node.flags.pressed);
}

#[test]
fn flag_entries_keep_render_order() {
    let flags = AxFlags { focused: true, readonly: true, ..AxFlags::default() };
    let names: Vec<&str> =
        flags.entries().iter().filter(|(_, set)| *set).map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["focused", "readonly"]);
}
