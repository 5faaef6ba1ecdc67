// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Input primitives: UID-addressed clicks, typing, scrolling, dragging.
//!
//! Each primitive is a stateless translation from a high-level action to
//! low-level mouse/keyboard protocol events on the session that owns the
//! element. Nothing is cached between calls.

pub mod keys;

use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};

use crate::lifecycle::EditorConnection;
use crate::snapshot::SnapshotEngine;

/// Pause between focusing an element and sending text, so the editor's
/// focus handlers have settled.
const FOCUS_SETTLE: Duration = Duration::from_millis(50);

/// Pause before releasing the mouse at the end of a drag.
const DRAG_RELEASE_PAUSE: Duration = Duration::from_millis(50);

/// Intermediate mouse-move steps along a drag path.
const DRAG_STEPS: u32 = 10;

/// Wheel delta per unit of scroll `amount`.
const SCROLL_STEP_PX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl std::str::FromStr for ScrollDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => anyhow::bail!("unknown scroll direction {other:?}"),
        }
    }
}

impl ScrollDirection {
    /// `(deltaX, deltaY)` for one unit of scrolling.
    fn deltas(self, amount: u32) -> (f64, f64) {
        let px = f64::from(amount) * SCROLL_STEP_PX;
        match self {
            Self::Up => (0.0, -px),
            Self::Down => (0.0, px),
            Self::Left => (-px, 0.0),
            Self::Right => (px, 0.0),
        }
    }
}

/// Focus the element behind `uid`.
pub async fn focus_element(
    conn: &EditorConnection,
    engine: &SnapshotEngine,
    uid: &str,
) -> anyhow::Result<()> {
    let (backend_id, session) = engine.resolve_for_input(uid)?;
    conn.transport
        .send("DOM.focus", json!({ "backendNodeId": backend_id }), session.as_deref())
        .await?;
    Ok(())
}

/// Scroll the element into view if needed.
pub async fn scroll_into_view(
    conn: &EditorConnection,
    engine: &SnapshotEngine,
    uid: &str,
) -> anyhow::Result<()> {
    let (backend_id, session) = engine.resolve_for_input(uid)?;
    conn.transport
        .send(
            "DOM.scrollIntoViewIfNeeded",
            json!({ "backendNodeId": backend_id }),
            session.as_deref(),
        )
        .await?;
    Ok(())
}

/// Viewport center of the element: box model, falling back to content
/// quads; the arithmetic mean of the four corners either way.
pub async fn element_center(
    conn: &EditorConnection,
    engine: &SnapshotEngine,
    uid: &str,
) -> anyhow::Result<(f64, f64)> {
    let (backend_id, session) = engine.resolve_for_input(uid)?;

    let box_model = conn
        .transport
        .send("DOM.getBoxModel", json!({ "backendNodeId": backend_id }), session.as_deref())
        .await;
    if let Ok(result) = box_model {
        if let Some(quad) = result
            .get("model")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_array)
        {
            if let Some(center) = center_of_quad(quad) {
                return Ok(center);
            }
        }
    }

    let quads = conn
        .transport
        .send("DOM.getContentQuads", json!({ "backendNodeId": backend_id }), session.as_deref())
        .await?;
    let first = quads
        .get("quads")
        .and_then(Value::as_array)
        .and_then(|qs| qs.first())
        .and_then(Value::as_array)
        .with_context(|| format!("{uid} has no layout box"))?;
    center_of_quad(first).with_context(|| format!("{uid} has a degenerate layout box"))
}

/// Mean of the four corners of an 8-number quad.
pub fn center_of_quad(quad: &[Value]) -> Option<(f64, f64)> {
    if quad.len() != 8 {
        return None;
    }
    let numbers: Vec<f64> = quad.iter().filter_map(Value::as_f64).collect();
    if numbers.len() != 8 {
        return None;
    }
    let x = (numbers[0] + numbers[2] + numbers[4] + numbers[6]) / 4.0;
    let y = (numbers[1] + numbers[3] + numbers[5] + numbers[7]) / 4.0;
    Some((x, y))
}

async fn mouse_event(
    conn: &EditorConnection,
    session: Option<&str>,
    kind: &str,
    x: f64,
    y: f64,
    extra: Value,
) -> anyhow::Result<()> {
    let mut params = json!({ "type": kind, "x": x, "y": y });
    if let (Some(params_obj), Some(extra_obj)) = (params.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            params_obj.insert(k.clone(), v.clone());
        }
    }
    conn.transport.send("Input.dispatchMouseEvent", params, session).await?;
    Ok(())
}

/// Scroll into view, find the center, click.
pub async fn click_element(
    conn: &EditorConnection,
    engine: &SnapshotEngine,
    uid: &str,
) -> anyhow::Result<()> {
    scroll_into_view(conn, engine, uid).await?;
    let (x, y) = element_center(conn, engine, uid).await?;
    let (_, session) = engine.resolve_for_input(uid)?;
    let session = session.as_deref();

    let press = json!({ "button": "left", "clickCount": 1 });
    mouse_event(conn, session, "mousePressed", x, y, press.clone()).await?;
    mouse_event(conn, session, "mouseReleased", x, y, press).await?;
    Ok(())
}

/// Scroll into view and park the pointer over the element.
pub async fn hover_element(
    conn: &EditorConnection,
    engine: &SnapshotEngine,
    uid: &str,
) -> anyhow::Result<()> {
    scroll_into_view(conn, engine, uid).await?;
    let (x, y) = element_center(conn, engine, uid).await?;
    let (_, session) = engine.resolve_for_input(uid)?;
    mouse_event(conn, session.as_deref(), "mouseMoved", x, y, json!({})).await
}

/// Replace the element's content: focus, settle, select-all + delete,
/// insert.
pub async fn fill_element(
    conn: &EditorConnection,
    engine: &SnapshotEngine,
    uid: &str,
    text: &str,
) -> anyhow::Result<()> {
    scroll_into_view(conn, engine, uid).await?;
    focus_element(conn, engine, uid).await?;
    tokio::time::sleep(FOCUS_SETTLE).await;

    let (_, session) = engine.resolve_for_input(uid)?;
    let session = session.as_deref();

    let select_all = keys::parse_combo("Control+a")?;
    keys::dispatch_combo(&conn.transport, session, &select_all).await?;
    let delete = keys::parse_combo("Delete")?;
    keys::dispatch_combo(&conn.transport, session, &delete).await?;

    conn.transport.send("Input.insertText", json!({ "text": text }), session).await?;
    Ok(())
}

/// Append text at the caret without clearing.
pub async fn type_into_element(
    conn: &EditorConnection,
    engine: &SnapshotEngine,
    uid: &str,
    text: &str,
) -> anyhow::Result<()> {
    scroll_into_view(conn, engine, uid).await?;
    focus_element(conn, engine, uid).await?;
    tokio::time::sleep(FOCUS_SETTLE).await;

    let (_, session) = engine.resolve_for_input(uid)?;
    conn.transport
        .send("Input.insertText", json!({ "text": text }), session.as_deref())
        .await?;
    Ok(())
}

/// Scroll the element into view, then optionally send a wheel event at
/// its center.
pub async fn scroll_element(
    conn: &EditorConnection,
    engine: &SnapshotEngine,
    uid: &str,
    direction: Option<ScrollDirection>,
    amount: u32,
) -> anyhow::Result<()> {
    scroll_into_view(conn, engine, uid).await?;
    let Some(direction) = direction else { return Ok(()) };

    let (x, y) = element_center(conn, engine, uid).await?;
    let (_, session) = engine.resolve_for_input(uid)?;
    let (dx, dy) = direction.deltas(amount);
    mouse_event(
        conn,
        session.as_deref(),
        "mouseWheel",
        x,
        y,
        json!({ "deltaX": dx, "deltaY": dy }),
    )
    .await
}

/// Drag from one element to another: press, a 10-step linear move path,
/// a short pause, release.
pub async fn drag_element(
    conn: &EditorConnection,
    engine: &SnapshotEngine,
    from_uid: &str,
    to_uid: &str,
) -> anyhow::Result<()> {
    scroll_into_view(conn, engine, from_uid).await?;
    let from = element_center(conn, engine, from_uid).await?;
    let to = element_center(conn, engine, to_uid).await?;
    let (_, session) = engine.resolve_for_input(from_uid)?;
    let session = session.as_deref();

    let press = json!({ "button": "left", "clickCount": 1 });
    mouse_event(conn, session, "mousePressed", from.0, from.1, press.clone()).await?;
    for (x, y) in linear_path(from, to, DRAG_STEPS) {
        mouse_event(conn, session, "mouseMoved", x, y, json!({ "button": "left" })).await?;
    }
    tokio::time::sleep(DRAG_RELEASE_PAUSE).await;
    mouse_event(conn, session, "mouseReleased", to.0, to.1, press).await?;
    Ok(())
}

/// `steps` points interpolated from just after `from` to exactly `to`.
pub fn linear_path(from: (f64, f64), to: (f64, f64), steps: u32) -> Vec<(f64, f64)> {
    (1..=steps)
        .map(|i| {
            let t = f64::from(i) / f64::from(steps);
            (from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t)
        })
        .collect()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
