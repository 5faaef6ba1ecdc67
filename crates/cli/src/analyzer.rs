// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin client for the companion extension's code-structure queries,
//! with progressive compression of the returned tree.
//!
//! The extension returns a nested folder/file/symbol tree that can be
//! far larger than a tool response should be. Compression levels are
//! applied in order until the render fits the output budget: trim
//! symbol nesting, drop symbols, drop files, flatten to folder paths,
//! and finally a folder summary with counts.

use serde_json::{json, Value};

use crate::host::HostBridge;

/// Character budget for a rendered tree (≈3000 tokens).
pub const CHAR_BUDGET: usize = 12_000;

/// Queries forwarded to the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Overview,
    Exports,
    ImportGraph,
    SymbolTrace,
}

impl QueryKind {
    fn wire_name(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Exports => "exports",
            Self::ImportGraph => "import-graph",
            Self::SymbolTrace => "symbol-trace",
        }
    }
}

/// Scope filters threaded through to the extension.
#[derive(Debug, Clone, Default)]
pub struct QueryScope {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub depth: Option<u32>,
    pub symbol: Option<String>,
}

/// Run a code-structure query and compress the result to the budget.
pub async fn query(
    host: &HostBridge,
    kind: QueryKind,
    scope: &QueryScope,
) -> anyhow::Result<String> {
    let tree = host
        .code_query(json!({
            "kind": kind.wire_name(),
            "include": scope.include,
            "exclude": scope.exclude,
            "depth": scope.depth,
            "symbol": scope.symbol,
        }))
        .await?;
    Ok(compress(&tree, CHAR_BUDGET))
}

/// Render the tree at the first compression level that fits `budget`.
pub fn compress(tree: &Value, budget: usize) -> String {
    let renders = [
        render_tree(tree, SymbolDetail::Full),
        render_tree(tree, SymbolDetail::TopLevel),
        render_tree(tree, SymbolDetail::None),
        render_folders(tree),
        render_flat_paths(tree),
    ];
    for render in renders {
        if render.len() <= budget {
            return render;
        }
    }
    render_counts(tree)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolDetail {
    /// Symbols with their full nesting.
    Full,
    /// Deepest nesting dropped: top-level symbols only.
    TopLevel,
    /// No symbols at all.
    None,
}

fn render_tree(tree: &Value, detail: SymbolDetail) -> String {
    let mut out = Vec::new();
    render_folder(tree, 0, detail, &mut out);
    out.join("\n")
}

fn render_folder(folder: &Value, depth: usize, detail: SymbolDetail, out: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let name = folder_name(folder);
    if !name.is_empty() {
        out.push(format!("{indent}{name}/"));
    }
    let child_depth = if name.is_empty() { depth } else { depth + 1 };
    let child_indent = "  ".repeat(child_depth);

    for file in files_of(folder) {
        let file_name = str_of(file, "name");
        out.push(format!("{child_indent}{file_name}"));
        if detail == SymbolDetail::None {
            continue;
        }
        for symbol in symbols_of(file) {
            render_symbol(symbol, child_depth + 1, detail == SymbolDetail::Full, out);
        }
    }
    for child in folders_of(folder) {
        render_folder(child, child_depth, detail, out);
    }
}

fn render_symbol(symbol: &Value, depth: usize, nested: bool, out: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    out.push(format!("{indent}• {}", str_of(symbol, "name")));
    if !nested {
        return;
    }
    for child in symbol.get("children").and_then(Value::as_array).into_iter().flatten() {
        render_symbol(child, depth + 1, nested, out);
    }
}

/// Folders only, still as an indented tree.
fn render_folders(tree: &Value) -> String {
    let mut out = Vec::new();
    fn walk(folder: &Value, depth: usize, out: &mut Vec<String>) {
        let name = folder_name(folder);
        let child_depth = if name.is_empty() {
            depth
        } else {
            out.push(format!("{}{name}/", "  ".repeat(depth)));
            depth + 1
        };
        for child in folders_of(folder) {
            walk(child, child_depth, out);
        }
    }
    walk(tree, 0, &mut out);
    out.join("\n")
}

/// One folder path per line, no nesting.
fn render_flat_paths(tree: &Value) -> String {
    let mut out = Vec::new();
    fn walk(folder: &Value, prefix: &str, out: &mut Vec<String>) {
        let name = folder_name(folder);
        let path = join_path(prefix, &name);
        if !name.is_empty() {
            out.push(format!("{path}/"));
        }
        for child in folders_of(folder) {
            walk(child, &path, out);
        }
    }
    walk(tree, "", &mut out);
    out.join("\n")
}

/// Last resort: top-level folders with file counts.
fn render_counts(tree: &Value) -> String {
    let mut out = Vec::new();
    for child in folders_of(tree) {
        let (folders, files) = count_subtree(child);
        out.push(format!("{}/ ({folders} folders, {files} files)", folder_name(child)));
    }
    let (_, root_files) = count_subtree(tree);
    out.push(format!("total: {root_files} files"));
    out.join("\n")
}

fn count_subtree(folder: &Value) -> (usize, usize) {
    let mut folders = 0;
    let mut files = files_of(folder).count();
    for child in folders_of(folder) {
        let (f, n) = count_subtree(child);
        folders += 1 + f;
        files += n;
    }
    (folders, files)
}

fn folder_name(folder: &Value) -> String {
    str_of(folder, "name")
}

fn folders_of(folder: &Value) -> impl Iterator<Item = &Value> {
    folder.get("folders").and_then(Value::as_array).into_iter().flatten()
}

fn files_of(folder: &Value) -> impl Iterator<Item = &Value> {
    folder.get("files").and_then(Value::as_array).into_iter().flatten()
}

fn symbols_of(file: &Value) -> impl Iterator<Item = &Value> {
    file.get("symbols").and_then(Value::as_array).into_iter().flatten()
}

fn str_of(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_owned()
}

fn join_path(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (_, true) => prefix.to_owned(),
        (true, false) => name.to_owned(),
        (false, false) => format!("{prefix}/{name}"),
    }
}

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod tests;
