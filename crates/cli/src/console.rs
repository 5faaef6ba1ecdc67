// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Console tap — buffers recent console output from the page.
//!
//! A transport event subscriber collects `Runtime.consoleAPICalled` and
//! `Runtime.exceptionThrown` into a bounded ring, which the
//! `console_logs` tool drains. One tap per connection; a reconnect gets
//! a fresh one.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use drover_cdp::CdpEvent;

/// Bounded capacity of the ring; oldest entries are dropped first.
const RING_CAPACITY: usize = 200;

#[derive(Default, Debug)]
pub struct ConsoleTap {
    entries: Arc<Mutex<VecDeque<String>>>,
}

impl ConsoleTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the subscriber feeding this tap from a transport event
    /// stream. Ends with `shutdown` or when the stream closes.
    pub fn spawn_subscriber(
        &self,
        mut events: broadcast::Receiver<CdpEvent>,
        shutdown: CancellationToken,
    ) {
        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => {
                        let event = match event {
                            Ok(e) => e,
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => break,
                        };
                        if let Some(line) = format_event(&event) {
                            let mut ring = entries.lock();
                            if ring.len() == RING_CAPACITY {
                                ring.pop_front();
                            }
                            ring.push_back(line);
                        }
                    }
                }
            }
        });
    }

    /// Take everything buffered so far, oldest first.
    pub fn drain(&self) -> Vec<String> {
        self.entries.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn push_event(&self, event: &CdpEvent) {
        if let Some(line) = format_event(event) {
            let mut ring = self.entries.lock();
            if ring.len() == RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(line);
        }
    }
}

/// Render a console event as one line, or `None` for unrelated events.
fn format_event(event: &CdpEvent) -> Option<String> {
    let origin = event.session_id.as_deref().unwrap_or("main");
    match event.method.as_str() {
        "Runtime.consoleAPICalled" => {
            let level = event.params.get("type").and_then(Value::as_str).unwrap_or("log");
            let args = event
                .params
                .get("args")
                .and_then(Value::as_array)
                .map(|args| {
                    args.iter().map(preview_arg).collect::<Vec<_>>().join(" ")
                })
                .unwrap_or_default();
            Some(format!("[{origin}] console.{level}: {args}"))
        }
        "Runtime.exceptionThrown" => {
            let details = event.params.get("exceptionDetails");
            let text = details
                .and_then(|d| d.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("Uncaught exception");
            let description = details
                .and_then(|d| d.get("exception"))
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str);
            match description {
                Some(desc) => Some(format!("[{origin}] exception: {text} {desc}")),
                None => Some(format!("[{origin}] exception: {text}")),
            }
        }
        _ => None,
    }
}

/// Short preview of one console argument.
fn preview_arg(arg: &Value) -> String {
    if let Some(text) = arg.get("value").and_then(Value::as_str) {
        return text.to_owned();
    }
    if let Some(value) = arg.get("value") {
        return value.to_string();
    }
    if let Some(desc) = arg.get("description").and_then(Value::as_str) {
        return desc.to_owned();
    }
    arg.get("type").and_then(Value::as_str).unwrap_or("?").to_owned()
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
