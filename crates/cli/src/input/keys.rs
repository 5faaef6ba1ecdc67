// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyboard model: named keys, modifier bits, combo parsing.
//!
//! Combos dispatch as modifier presses in forward order, the main key
//! with the accumulated modifier bits, then modifier releases in reverse
//! order. The event sequence is built as data so the dispatch order is
//! testable without a live transport.

use anyhow::Context;
use serde_json::json;

use drover_cdp::CdpTransport;

/// A resolved key: protocol `key`, `code`, and Windows virtual keycode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDef {
    pub key: String,
    pub code: String,
    pub vk: u32,
}

/// Modifier bit contributions, per the input protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Alt,
    Control,
    Meta,
    Shift,
}

impl Modifier {
    pub fn bit(self) -> u32 {
        match self {
            Modifier::Alt => 1,
            Modifier::Control => 2,
            Modifier::Meta => 4,
            Modifier::Shift => 8,
        }
    }

    pub fn key_def(self) -> KeyDef {
        match self {
            Modifier::Alt => KeyDef { key: "Alt".into(), code: "AltLeft".into(), vk: 18 },
            Modifier::Control => {
                KeyDef { key: "Control".into(), code: "ControlLeft".into(), vk: 17 }
            }
            Modifier::Meta => KeyDef { key: "Meta".into(), code: "MetaLeft".into(), vk: 91 },
            Modifier::Shift => KeyDef { key: "Shift".into(), code: "ShiftLeft".into(), vk: 16 },
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "alt" | "option" => Some(Modifier::Alt),
            "control" | "ctrl" => Some(Modifier::Control),
            "meta" | "cmd" | "command" | "super" => Some(Modifier::Meta),
            "shift" => Some(Modifier::Shift),
            _ => None,
        }
    }
}

/// Fixed table of named keys.
const NAMED_KEYS: [(&str, &str, &str, u32); 22] = [
    ("enter", "Enter", "Enter", 13),
    ("tab", "Tab", "Tab", 9),
    ("escape", "Escape", "Escape", 27),
    ("esc", "Escape", "Escape", 27),
    ("backspace", "Backspace", "Backspace", 8),
    ("delete", "Delete", "Delete", 46),
    ("space", " ", "Space", 32),
    ("arrowup", "ArrowUp", "ArrowUp", 38),
    ("arrowdown", "ArrowDown", "ArrowDown", 40),
    ("arrowleft", "ArrowLeft", "ArrowLeft", 37),
    ("arrowright", "ArrowRight", "ArrowRight", 39),
    ("up", "ArrowUp", "ArrowUp", 38),
    ("down", "ArrowDown", "ArrowDown", 40),
    ("left", "ArrowLeft", "ArrowLeft", 37),
    ("right", "ArrowRight", "ArrowRight", 39),
    ("home", "Home", "Home", 36),
    ("end", "End", "End", 35),
    ("pageup", "PageUp", "PageUp", 33),
    ("pagedown", "PageDown", "PageDown", 34),
    ("insert", "Insert", "Insert", 45),
    ("capslock", "CapsLock", "CapsLock", 20),
    ("contextmenu", "ContextMenu", "ContextMenu", 93),
];

/// Resolve a key name: named keys, function keys, digits, letters, and
/// printable single characters.
pub fn lookup_key(name: &str) -> Option<KeyDef> {
    let lower = name.to_ascii_lowercase();
    if let Some((_, key, code, vk)) = NAMED_KEYS.iter().find(|(n, _, _, _)| *n == lower) {
        return Some(KeyDef { key: (*key).to_owned(), code: (*code).to_owned(), vk: *vk });
    }

    // F1..F12
    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u32>().ok()) {
        if (1..=12).contains(&n) {
            let name = format!("F{n}");
            return Some(KeyDef { key: name.clone(), code: name, vk: 111 + n });
        }
    }

    let mut chars = name.chars();
    let (Some(ch), None) = (chars.next(), chars.next()) else { return None };
    match ch {
        'a'..='z' | 'A'..='Z' => {
            let upper = ch.to_ascii_uppercase();
            Some(KeyDef {
                key: ch.to_string(),
                code: format!("Key{upper}"),
                vk: upper as u32,
            })
        }
        '0'..='9' => Some(KeyDef {
            key: ch.to_string(),
            code: format!("Digit{ch}"),
            vk: ch as u32,
        }),
        _ if !ch.is_control() => Some(KeyDef { key: ch.to_string(), code: String::new(), vk: 0 }),
        _ => None,
    }
}

/// A parsed combo: modifiers in written order plus the main key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCombo {
    pub modifiers: Vec<Modifier>,
    pub key: KeyDef,
}

/// Parse a `+`-separated combo; the last token is the main key.
pub fn parse_combo(combo: &str) -> anyhow::Result<KeyCombo> {
    let tokens: Vec<&str> = combo.split('+').map(str::trim).collect();
    let (main, modifier_tokens) =
        tokens.split_last().context("empty key combo")?;
    if main.is_empty() {
        anyhow::bail!("key combo ends with '+': {combo:?}");
    }

    let mut modifiers = Vec::with_capacity(modifier_tokens.len());
    for token in modifier_tokens {
        let modifier = Modifier::parse(token)
            .with_context(|| format!("unknown modifier {token:?} in {combo:?}"))?;
        modifiers.push(modifier);
    }

    let key =
        lookup_key(main).with_context(|| format!("unknown key {main:?} in {combo:?}"))?;
    Ok(KeyCombo { modifiers, key })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Down,
    Up,
}

/// One low-level key event, ready to serialize.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub key: KeyDef,
    /// Accumulated modifier bits active while this event fires.
    pub modifiers: u32,
}

/// The full ordered event sequence for a combo: modifiers down in
/// forward order, main key down+up with all bits, modifiers up reversed.
pub fn combo_event_sequence(combo: &KeyCombo) -> Vec<KeyEvent> {
    let mut events = Vec::with_capacity(combo.modifiers.len() * 2 + 2);
    let mut bits = 0;

    for modifier in &combo.modifiers {
        bits |= modifier.bit();
        events.push(KeyEvent { kind: KeyEventKind::Down, key: modifier.key_def(), modifiers: bits });
    }

    events.push(KeyEvent { kind: KeyEventKind::Down, key: combo.key.clone(), modifiers: bits });
    events.push(KeyEvent { kind: KeyEventKind::Up, key: combo.key.clone(), modifiers: bits });

    for modifier in combo.modifiers.iter().rev() {
        events.push(KeyEvent { kind: KeyEventKind::Up, key: modifier.key_def(), modifiers: bits });
        bits &= !modifier.bit();
    }

    events
}

/// Dispatch a combo on the given session.
pub async fn dispatch_combo(
    transport: &CdpTransport,
    session_id: Option<&str>,
    combo: &KeyCombo,
) -> anyhow::Result<()> {
    for event in combo_event_sequence(combo) {
        send_key_event(transport, session_id, &event).await?;
    }
    Ok(())
}

pub async fn send_key_event(
    transport: &CdpTransport,
    session_id: Option<&str>,
    event: &KeyEvent,
) -> anyhow::Result<()> {
    let kind = match event.kind {
        KeyEventKind::Down => "keyDown",
        KeyEventKind::Up => "keyUp",
    };
    transport
        .send(
            "Input.dispatchKeyEvent",
            json!({
                "type": kind,
                "modifiers": event.modifiers,
                "key": event.key.key,
                "code": event.key.code,
                "windowsVirtualKeyCode": event.key.vk,
            }),
            session_id,
        )
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
