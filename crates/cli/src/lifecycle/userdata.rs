// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent user-data directory for the controlled editor.
//!
//! `<workspace>/.devtools/user-data/` keeps the spawned window's profile
//! isolated from the user's own editor. On first creation a minimal
//! settings file is seeded so the window comes up without trust prompts,
//! release notes, welcome tabs, telemetry, or native dialogs. The
//! directory is never deleted by the bridge.

use std::path::Path;

use anyhow::Context;
use serde_json::json;
use tracing::info;

/// Seeded first-run settings. Native dialogs are replaced with DOM
/// dialogs so they show up in the accessibility tree.
fn first_run_settings() -> serde_json::Value {
    json!({
        "security.workspace.trust.enabled": false,
        "window.dialogStyle": "custom",
        "update.showReleaseNotes": false,
        "workbench.startupEditor": "none",
        "workbench.tips.enabled": false,
        "extensions.ignoreRecommendations": true,
        "telemetry.telemetryLevel": "off"
    })
}

/// Create the user-data directory if needed; seed `User/settings.json`
/// on first creation only. Returns whether the settings were seeded.
pub fn ensure_user_data_dir(dir: &Path) -> anyhow::Result<bool> {
    let settings_dir = dir.join("User");
    std::fs::create_dir_all(&settings_dir)
        .with_context(|| format!("creating {}", settings_dir.display()))?;

    let settings_path = settings_dir.join("settings.json");
    if settings_path.exists() {
        return Ok(false);
    }
    let json = serde_json::to_string_pretty(&first_run_settings())?;
    std::fs::write(&settings_path, json)
        .with_context(|| format!("seeding {}", settings_path.display()))?;
    info!("seeded editor settings at {}", settings_path.display());
    Ok(true)
}

/// Make sure `.devtools/` is ignored by git in the workspace. Creates
/// `.gitignore` when missing; appends when the entry is absent.
pub fn ensure_gitignored(workspace: &Path) -> anyhow::Result<()> {
    let gitignore = workspace.join(".gitignore");
    let existing = match std::fs::read_to_string(&gitignore) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("reading {}", gitignore.display())),
    };

    if existing.lines().any(|line| {
        let trimmed = line.trim();
        trimmed == ".devtools" || trimmed == ".devtools/" || trimmed == "/.devtools/"
    }) {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(".devtools/\n");
    std::fs::write(&gitignore, updated)
        .with_context(|| format!("updating {}", gitignore.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "userdata_tests.rs"]
mod tests;
