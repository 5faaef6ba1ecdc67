// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accessibility node model, parsed from protocol payloads.

use serde_json::Value;

/// Boolean state flags carried by an accessibility node, in render order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxFlags {
    pub focused: bool,
    pub expanded: bool,
    pub selected: bool,
    pub disabled: bool,
    pub checked: bool,
    pub pressed: bool,
    pub required: bool,
    pub readonly: bool,
}

impl AxFlags {
    /// `(name, set)` pairs in render order.
    pub fn entries(&self) -> [(&'static str, bool); 8] {
        [
            ("focused", self.focused),
            ("expanded", self.expanded),
            ("selected", self.selected),
            ("disabled", self.disabled),
            ("checked", self.checked),
            ("pressed", self.pressed),
            ("required", self.required),
            ("readonly", self.readonly),
        ]
    }
}

/// One node of the accessibility tree. Produced fresh by every snapshot;
/// nothing persists across snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxNode {
    /// Opaque protocol node id, unique within one frame's tree.
    pub node_id: String,
    /// Key of the frame (or OOPIF session) this node came from.
    pub frame_key: String,
    pub ignored: bool,
    pub role: String,
    pub name: String,
    pub description: String,
    pub value: String,
    pub flags: AxFlags,
    /// Remaining non-boolean properties, as `name=value` pairs.
    pub properties: Vec<(String, String)>,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    pub backend_dom_node_id: Option<i64>,
}

impl AxNode {
    /// Parse a node from an `Accessibility.getFullAXTree` payload entry.
    pub fn parse(raw: &Value, frame_key: &str) -> Self {
        let mut node = AxNode {
            node_id: raw.get("nodeId").and_then(Value::as_str).unwrap_or_default().to_owned(),
            frame_key: frame_key.to_owned(),
            ignored: raw.get("ignored").and_then(Value::as_bool).unwrap_or(false),
            role: ax_value(raw.get("role")),
            name: ax_value(raw.get("name")),
            description: ax_value(raw.get("description")),
            value: ax_value(raw.get("value")),
            parent_id: raw.get("parentId").and_then(Value::as_str).map(str::to_owned),
            child_ids: raw
                .get("childIds")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter().filter_map(Value::as_str).map(str::to_owned).collect()
                })
                .unwrap_or_default(),
            backend_dom_node_id: raw.get("backendDOMNodeId").and_then(Value::as_i64),
            ..AxNode::default()
        };

        for prop in raw.get("properties").and_then(Value::as_array).into_iter().flatten() {
            let Some(name) = prop.get("name").and_then(Value::as_str) else { continue };
            let value = prop.get("value").and_then(|v| v.get("value"));
            let truthy = matches!(value, Some(Value::Bool(true)))
                || value.and_then(Value::as_str).is_some_and(|s| s == "true" || s == "mixed");
            match name {
                "focused" => node.flags.focused = truthy,
                "expanded" => node.flags.expanded = truthy,
                "selected" => node.flags.selected = truthy,
                "disabled" => node.flags.disabled = truthy,
                "checked" => node.flags.checked = truthy,
                "pressed" => node.flags.pressed = truthy,
                "required" => node.flags.required = truthy,
                "readonly" => node.flags.readonly = truthy,
                other => {
                    if let Some(rendered) = render_prop_value(value) {
                        node.properties.push((other.to_owned(), rendered));
                    }
                }
            }
        }
        node
    }

    /// Frame-prefixed key for the cross-frame node map.
    pub fn map_key(&self) -> String {
        format!("{}:{}", self.frame_key, self.node_id)
    }
}

/// Extract `.value` from an AXValue-shaped field.
fn ax_value(field: Option<&Value>) -> String {
    match field.and_then(|f| f.get("value")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Render a non-boolean property value compactly, or `None` when empty.
fn render_prop_value(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
