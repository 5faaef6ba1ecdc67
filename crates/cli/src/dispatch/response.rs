// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool response: an ordered list of text and image parts plus an error
//! flag, rendered to the agent protocol's `{content, isError}` shape.

use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Image { data: String, mime: String },
}

#[derive(Debug, Clone, Default)]
pub struct ToolResponse {
    parts: Vec<Part>,
    is_error: bool,
}

impl ToolResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        let mut response = Self::new();
        response.push_text(text);
        response
    }

    pub fn error(message: impl Into<String>) -> Self {
        let mut response = Self::text(message);
        response.is_error = true;
        response
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.parts.push(Part::Text(text.into()));
    }

    pub fn push_image(&mut self, data: impl Into<String>, mime: impl Into<String>) {
        self.parts.push(Part::Image { data: data.into(), mime: mime.into() });
    }

    /// Insert a text part before everything else (banners).
    pub fn prepend_text(&mut self, text: impl Into<String>) {
        self.parts.insert(0, Part::Text(text.into()));
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Concatenated text parts, for assertions and logs.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(text) => Some(text.as_str()),
                Part::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The agent-protocol result object.
    pub fn to_wire(&self) -> Value {
        let content: Vec<Value> = self
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => json!({ "type": "text", "text": text }),
                Part::Image { data, mime } => {
                    json!({ "type": "image", "data": data, "mimeType": mime })
                }
            })
            .collect();
        let mut wire = json!({ "content": content });
        if self.is_error {
            wire["isError"] = Value::Bool(true);
        }
        wire
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
