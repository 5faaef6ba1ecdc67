// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexed JSON-RPC client over a single debugger WebSocket.
//!
//! One writer task serializes outbound frames; one reader task parses
//! every inbound frame and routes it either to the pending-response table
//! (frames carrying a matching `id`) or to the event subscribers (frames
//! carrying `method` but no `id`). Commands aimed at an out-of-process
//! sub-target carry a `sessionId`, and inbound events are attributed to
//! their session the same way.
//!
//! The transport does not serialize callers — the tool dispatcher above
//! it does. Close may be intentional (the bridge is detaching and the
//! window survives) or not (the user closed the window); the lifecycle
//! layer reads [`CdpTransport::was_intentional`] to tell them apart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::CdpError;

/// Capacity of the event fan-out channel. Subscribers that lag simply
/// miss events; the registry resyncs on the next attach/detach.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the outbound frame queue feeding the writer task.
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// A protocol event received from the debugger.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    /// Session the event belongs to; `None` means the main page target.
    pub session_id: Option<String>,
}

type PendingMap = Arc<Mutex<HashMap<u64, (String, oneshot::Sender<Result<Value, CdpError>>)>>>;

/// A live connection to the editor's page-level debugging endpoint.
#[derive(Debug)]
pub struct CdpTransport {
    next_id: AtomicU64,
    pending: PendingMap,
    outbound: mpsc::Sender<Message>,
    events: broadcast::Sender<CdpEvent>,
    open: Arc<AtomicBool>,
    intentional_close: Arc<AtomicBool>,
    closed: CancellationToken,
}

impl CdpTransport {
    /// Connect to a page-level WebSocket debugger URL.
    pub async fn connect(ws_url: &str) -> Result<Self, CdpError> {
        let (stream, _response) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| CdpError::transport(format!("WebSocket connect failed: {e}")))?;
        let (mut ws_tx, mut ws_rx) = stream.split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_CAPACITY);
        let open = Arc::new(AtomicBool::new(true));
        let closed = CancellationToken::new();

        // Writer task: owns the sink half, drains the outbound queue.
        {
            let closed = closed.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = closed.cancelled() => {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            break;
                        }
                        msg = outbound_rx.recv() => {
                            let Some(msg) = msg else { break };
                            if let Err(e) = ws_tx.send(msg).await {
                                debug!("debug transport write failed: {e}");
                                closed.cancel();
                                break;
                            }
                        }
                    }
                }
            });
        }

        // Reader task: parses every inbound frame and fans it out.
        {
            let pending = Arc::clone(&pending);
            let events = events.clone();
            let open = Arc::clone(&open);
            let closed = closed.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = closed.cancelled() => break,
                        frame = ws_rx.next() => {
                            match frame {
                                Some(Ok(Message::Text(text))) => {
                                    route_frame(&pending, &events, text.as_str());
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    debug!("debug transport read failed: {e}");
                                    break;
                                }
                            }
                        }
                    }
                }

                open.store(false, Ordering::Release);
                fail_pending(&pending, "connection closed");
                closed.cancel();
            });
        }

        Ok(Self {
            next_id: AtomicU64::new(0),
            pending,
            outbound: outbound_tx,
            events,
            open,
            intentional_close: Arc::new(AtomicBool::new(false)),
            closed,
        })
    }

    /// Send a command and await its correlated response.
    ///
    /// `session_id` routes the command to an attached sub-target; `None`
    /// targets the main page.
    pub async fn send(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        if !self.is_open() {
            return Err(CdpError::transport(format!("cannot send {method}")));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, (method.to_owned(), tx));

        let mut frame = serde_json::json!({ "id": id, "method": method, "params": params });
        if let Some(sid) = session_id {
            frame["sessionId"] = Value::String(sid.to_owned());
        }
        trace!(method, session = session_id.unwrap_or("main"), "cdp send");

        if self.outbound.send(Message::Text(frame.to_string().into())).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(CdpError::transport(format!("writer gone while sending {method}")));
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                Err(CdpError::transport(format!("connection closed awaiting response to {method}")))
            }
        }
    }

    /// Subscribe to protocol events. Each subscriber gets every event
    /// delivered after the point of subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Token cancelled when the connection is gone (either direction).
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Mark the upcoming close as bridge-initiated so the close handler
    /// does not treat it as the user closing the window.
    pub fn set_intentional_close(&self, intentional: bool) {
        self.intentional_close.store(intentional, Ordering::Release);
    }

    pub fn was_intentional(&self) -> bool {
        self.intentional_close.load(Ordering::Acquire)
    }

    /// Close the socket. The window survives; callers that want the
    /// close handler silenced set the intentional flag first.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.closed.cancel();
    }
}

/// Route one inbound frame: response (has `id`) or event (has `method`).
fn route_frame(pending: &PendingMap, events: &broadcast::Sender<CdpEvent>, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("unparseable debugger frame: {e}");
            return;
        }
    };

    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        let Some((method, tx)) = pending.lock().remove(&id) else {
            debug!(id, "response for unknown request id (dropped after timeout?)");
            return;
        };
        let result = match value.get("error") {
            Some(err) => {
                let message = err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown protocol error")
                    .to_owned();
                Err(CdpError::Protocol { method, message })
            }
            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
        };
        let _ = tx.send(result);
        return;
    }

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        let event = CdpEvent {
            method: method.to_owned(),
            params: value.get("params").cloned().unwrap_or(Value::Null),
            session_id: value.get("sessionId").and_then(Value::as_str).map(str::to_owned),
        };
        // No subscribers is fine; events are advisory.
        let _ = events.send(event);
    }
}

/// Resolve every in-flight request with a transport error.
fn fail_pending(pending: &PendingMap, detail: &str) {
    let drained: Vec<_> = pending.lock().drain().collect();
    for (_, (method, tx)) in drained {
        let _ = tx.send(Err(CdpError::transport(format!("{detail} awaiting {method}"))));
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
