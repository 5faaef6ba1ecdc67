// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `drover` binary and speak
//! the agent protocol over stdio. None of these require an editor
//! installation; the connect path fails fast and must do so cleanly.

use serde_json::json;

use drover_specs::DroverProcess;

#[tokio::test]
async fn tools_list_over_stdio() -> anyhow::Result<()> {
    let mut bridge = DroverProcess::start()?;
    let response = bridge.request("tools/list", json!({})).await?;

    let tools = response["result"]["tools"].as_array().expect("tools array");
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert!(names.contains(&"snapshot"));
    assert!(names.contains(&"keyboard_hotkey"));
    assert!(names.contains(&"list_processes"));
    Ok(())
}

#[tokio::test]
async fn standalone_tool_call_round_trips() -> anyhow::Result<()> {
    let mut bridge = DroverProcess::start()?;
    let result = bridge.call_tool("list_processes", json!({})).await?;

    assert!(result.get("isError").is_none());
    assert_eq!(result["content"][0]["type"], "text");
    assert_eq!(result["content"][0]["text"], "No tracked processes.");
    Ok(())
}

#[tokio::test]
async fn malformed_lines_get_a_parse_error_without_killing_the_bridge() -> anyhow::Result<()> {
    let mut bridge = DroverProcess::start()?;

    let response = bridge.send_raw("{definitely not json").await?;
    assert_eq!(response["error"]["code"], -32700);

    // The loop keeps serving after a bad line.
    let response = bridge.request("tools/list", json!({})).await?;
    assert!(response["result"]["tools"].is_array());
    Ok(())
}

#[tokio::test]
async fn unknown_tools_surface_as_error_results() -> anyhow::Result<()> {
    let mut bridge = DroverProcess::start()?;
    let result = bridge.call_tool("bogus_tool", json!({})).await?;
    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().expect("text part");
    assert!(text.contains("unknown tool"));
    Ok(())
}

#[tokio::test]
async fn connect_failures_are_clean_error_results() -> anyhow::Result<()> {
    // No editor, no host bridge, no persisted session: a snapshot call
    // must come back as a structured error, not a hang or crash.
    let mut bridge = DroverProcess::start()?;
    let result = bridge.call_tool("snapshot", json!({})).await?;

    assert_eq!(result["isError"], true);
    let text = result["content"][0]["text"].as_str().expect("text part");
    assert!(text.contains("executable"), "got: {text}");
    Ok(())
}

#[tokio::test]
async fn stdin_eof_exits_zero() -> anyhow::Result<()> {
    let bridge = DroverProcess::start()?;
    let code = bridge.hang_up().await?;
    assert_eq!(code, Some(0));
    Ok(())
}
