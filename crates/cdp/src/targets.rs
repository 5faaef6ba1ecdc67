// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of attached sub-targets (iframes, webviews).
//!
//! The registry is a pure reflection of `Target.attachedToTarget` /
//! `Target.detachedFromTarget` events observed since the transport was
//! opened. It never originates requests; the lifecycle layer enables
//! discovery and auto-attach, and a fan-out task feeds events in here.
//! A fresh transport always gets a fresh registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::transport::CdpEvent;

/// A page-level target or an attached sub-target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub target_id: String,
    /// Routing key for commands; empty for the main page.
    pub session_id: String,
    pub kind: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
}

/// Tracks `sessionId → Target` for every attached sub-target.
#[derive(Default, Debug)]
pub struct TargetRegistry {
    attached: Arc<Mutex<HashMap<String, Target>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the subscriber task feeding this registry from a transport
    /// event stream. The task ends when `shutdown` fires or the stream
    /// closes, clearing the registry either way.
    pub fn spawn_subscriber(
        &self,
        mut events: broadcast::Receiver<CdpEvent>,
        shutdown: CancellationToken,
    ) {
        let attached = Arc::clone(&self.attached);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => {
                        let event = match event {
                            Ok(e) => e,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                debug!("target registry lagged by {n} events");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        };
                        apply_event(&attached, &event);
                    }
                }
            }
            attached.lock().clear();
        });
    }

    /// All currently attached sub-targets.
    pub fn list_attached(&self) -> Vec<Target> {
        self.attached.lock().values().cloned().collect()
    }

    pub fn get(&self, session_id: &str) -> Option<Target> {
        self.attached.lock().get(session_id).cloned()
    }

    #[cfg(test)]
    pub(crate) fn apply(&self, event: &CdpEvent) {
        apply_event(&self.attached, event);
    }
}

fn apply_event(attached: &Mutex<HashMap<String, Target>>, event: &CdpEvent) {
    match event.method.as_str() {
        "Target.attachedToTarget" => {
            let Some(session_id) = event.params.get("sessionId").and_then(Value::as_str) else {
                return;
            };
            let info = event.params.get("targetInfo").cloned().unwrap_or(Value::Null);
            let target = Target {
                target_id: str_field(&info, "targetId"),
                session_id: session_id.to_owned(),
                kind: str_field(&info, "type"),
                title: str_field(&info, "title"),
                url: str_field(&info, "url"),
                attached: true,
            };
            debug!(session = session_id, kind = %target.kind, url = %target.url, "target attached");
            attached.lock().insert(session_id.to_owned(), target);
        }
        "Target.detachedFromTarget" => {
            let Some(session_id) = event.params.get("sessionId").and_then(Value::as_str) else {
                return;
            };
            debug!(session = session_id, "target detached");
            attached.lock().remove(session_id);
        }
        "Target.targetInfoChanged" => {
            let info = event.params.get("targetInfo").cloned().unwrap_or(Value::Null);
            let target_id = str_field(&info, "targetId");
            let mut map = attached.lock();
            if let Some(target) = map.values_mut().find(|t| t.target_id == target_id) {
                target.title = str_field(&info, "title");
                target.url = str_field(&info, "url");
            }
        }
        _ => {}
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_owned()
}

#[cfg(test)]
#[path = "targets_tests.rs"]
mod tests;
