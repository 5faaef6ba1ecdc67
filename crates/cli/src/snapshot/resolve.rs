// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UID → backend DOM node resolution.
//!
//! Accessibility nodes reference each other by opaque id, not by
//! reference, and ids can collide across frames. The node map is keyed
//! `frameKey:nodeId`; parent walks try the frame-prefixed key first and
//! fall back to the unprefixed legacy key.

use std::collections::HashMap;

use super::node::AxNode;

/// Find the backend DOM node id for `start`, walking up the parent
/// chain until a DOM-backed node is found. `None` means the whole chain
/// is virtual.
pub fn backend_dom_id(start: &AxNode, all_nodes: &HashMap<String, AxNode>) -> Option<i64> {
    let mut current = start;
    // Bounded by tree depth; the guard breaks accidental parent cycles.
    for _ in 0..10_000 {
        if let Some(id) = current.backend_dom_node_id {
            return Some(id);
        }
        let parent_id = current.parent_id.as_deref()?;
        let prefixed = format!("{}:{parent_id}", current.frame_key);
        current = all_nodes.get(&prefixed).or_else(|| all_nodes.get(parent_id))?;
    }
    None
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
