// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

fn console_event(level: &str, text: &str, session: Option<&str>) -> CdpEvent {
    CdpEvent {
        method: "Runtime.consoleAPICalled".to_owned(),
        params: json!({
            "type": level,
            "args": [{ "type": "string", "value": text }],
        }),
        session_id: session.map(str::to_owned),
    }
}

#[test]
fn console_calls_are_formatted_with_origin_and_level() {
    let tap = ConsoleTap::new();
    tap.push_event(&console_event("warn", "renderer slow", None));
    tap.push_event(&console_event("log", "webview booted", Some("sub-1")));

    let lines = tap.drain();
    assert_eq!(lines[0], "[main] console.warn: renderer slow");
    assert_eq!(lines[1], "[sub-1] console.log: webview booted");
}

#[test]
fn exceptions_include_description_when_present() {
    let tap = ConsoleTap::new();
    tap.push_event(&CdpEvent {
        method: "Runtime.exceptionThrown".to_owned(),
        params: json!({
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "description": "TypeError: x is not a function" }
            }
        }),
        session_id: None,
    });

    let lines = tap.drain();
    assert_eq!(lines[0], "[main] exception: Uncaught TypeError: x is not a function");
}

#[test]
fn drain_empties_the_ring() {
    let tap = ConsoleTap::new();
    tap.push_event(&console_event("log", "one", None));
    assert_eq!(tap.len(), 1);
    assert_eq!(tap.drain().len(), 1);
    assert!(tap.is_empty());
}

#[test]
fn ring_drops_oldest_beyond_capacity() {
    let tap = ConsoleTap::new();
    for i in 0..250 {
        tap.push_event(&console_event("log", &format!("line {i}"), None));
    }
    let lines = tap.drain();
    assert_eq!(lines.len(), 200);
    assert_eq!(lines[0], "[main] console.log: line 50");
    assert_eq!(lines[199], "[main] console.log: line 249");
}

#[test]
fn unrelated_events_are_ignored() {
    let tap = ConsoleTap::new();
    tap.push_event(&CdpEvent {
        method: "Page.loadEventFired".to_owned(),
        params: json!({}),
        session_id: None,
    });
    assert!(tap.is_empty());
}

#[test]
fn non_string_args_fall_back_to_json_or_description() {
    let tap = ConsoleTap::new();
    tap.push_event(&CdpEvent {
        method: "Runtime.consoleAPICalled".to_owned(),
        params: json!({
            "type": "log",
            "args": [
                { "type": "number", "value": 42 },
                { "type": "object", "description": "HTMLDivElement" },
            ],
        }),
        session_id: None,
    });
    assert_eq!(tap.drain()[0], "[main] console.log: 42 HTMLDivElement");
}
