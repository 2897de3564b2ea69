//! Tool Inventory Scanner: a structural lexical scan over wrapper source
//! files, independent of the host language's grammar.
//!
//! Two passes per file: an exact-delimiter pass locating tool-definition
//! call sites (the span between consecutive markers is one block, the
//! last block runs to end of file), then a bounded bracket-depth pass
//! inside each block for the parameter-schema sub-block. Nothing here
//! compiles or parses the wrapper language.

use crate::config::ScanConfig;
use crate::error::SyncError;
use crate::model::ToolInventoryEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']([^"']+)["']"#).expect("literal regex"));
static PARAM_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*"?([A-Za-z_][A-Za-z0-9_]*)"?\s*:"#).expect("param regex"));
static CALL_ARGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^()]*\)").expect("args regex"));

/// Scan a directory of wrapper sources into a flat inventory.
///
/// Files are visited in sorted order so repeated scans produce identical
/// inventories. Duplicate tool names keep the first occurrence.
pub fn scan_inventory(
    tools_dir: &Path,
    config: &ScanConfig,
) -> Result<Vec<ToolInventoryEntry>, SyncError> {
    let mut inventory: Vec<ToolInventoryEntry> = Vec::new();
    let mut seen_names: BTreeSet<String> = BTreeSet::new();

    for entry in WalkDir::new(tools_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let extension = entry
            .path()
            .extension()
            .and_then(|os| os.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !config.extensions.contains(&extension) {
            continue;
        }
        if config.excluded_files.contains(&file_name) {
            debug!(file = %file_name, "file excluded from inventory scan");
            continue;
        }

        let text = fs::read_to_string(entry.path())?;
        for tool in scan_source(&file_name, &text, config) {
            if !seen_names.insert(tool.name.clone()) {
                warn!(tool = %tool.name, file = %file_name, "duplicate tool name; keeping first");
                continue;
            }
            inventory.push(tool);
        }
    }

    Ok(inventory)
}

/// Scan one source text into inventory entries.
pub fn scan_source(file_name: &str, text: &str, config: &ScanConfig) -> Vec<ToolInventoryEntry> {
    let starts = marker_positions(text, &config.definition_marker);
    let mut tools = Vec::new();

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let block = &text[start..end];

        let Some(name) = block_tool_name(block, &config.definition_marker) else {
            warn!(file = %file_name, "tool definition without a name literal; skipping block");
            continue;
        };

        tools.push(ToolInventoryEntry {
            name,
            file: file_name.to_string(),
            sdk_calls: block_sdk_calls(block, &config.client_object),
            params: block_params(block, &config.schema_marker),
        });
    }
    tools
}

/// Exact-delimiter pass: byte offsets of every definition-start marker.
fn marker_positions(text: &str, marker: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut from = 0;
    while let Some(found) = text[from..].find(marker) {
        positions.push(from + found);
        from += found + marker.len();
    }
    positions
}

/// The tool's declared name is the first string literal argument to the
/// definition call.
fn block_tool_name(block: &str, marker: &str) -> Option<String> {
    let after = &block[marker.len().min(block.len())..];
    STRING_LITERAL
        .captures(after)
        .map(|caps| caps[1].to_string())
}

/// Collect client call chains, stripping parenthesized instance-identifier
/// arguments so variable chains collapse to one canonical dotted path:
/// `client.messages(sid).media.list` and `client.messages.media.list`
/// both yield `client.messages.media.list`.
fn block_sdk_calls(block: &str, client_object: &str) -> BTreeSet<String> {
    let chain = Regex::new(&format!(
        r"\b{}(?:\([^()]*\))?(?:\.[A-Za-z_][A-Za-z0-9_]*(?:\([^()]*\))?)+",
        regex::escape(client_object)
    ))
    .expect("client chain regex");

    chain
        .find_iter(block)
        .map(|m| CALL_ARGS.replace_all(m.as_str(), "").into_owned())
        .collect()
}

/// Balanced-bracket pass: top-level parameter names of the schema
/// sub-block. Only lines at depth zero relative to the schema's outer
/// object count; nested object/array shapes are not expanded.
fn block_params(block: &str, schema_marker: &str) -> BTreeSet<String> {
    let mut params = BTreeSet::new();
    let Some(marker_at) = block.find(schema_marker) else {
        return params;
    };
    let after = &block[marker_at + schema_marker.len()..];
    let Some(open) = after.find('{') else {
        return params;
    };
    let body = &after[open + 1..];

    let mut depth: i32 = 0;
    let mut line_start_depth: i32 = 0;
    let mut line = String::new();
    for ch in body.chars() {
        match ch {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                // Closed the schema's outer object.
                if depth < 0 {
                    break;
                }
            }
            '\n' => {
                record_param_line(&line, line_start_depth, &mut params);
                line.clear();
                line_start_depth = depth;
                continue;
            }
            _ => {}
        }
        line.push(ch);
    }
    record_param_line(&line, line_start_depth, &mut params);
    params
}

fn record_param_line(line: &str, depth_at_start: i32, params: &mut BTreeSet<String>) {
    if depth_at_start != 0 {
        return;
    }
    if let Some(caps) = PARAM_LINE.captures(line) {
        params.insert(caps[1].to_string());
    }
}
