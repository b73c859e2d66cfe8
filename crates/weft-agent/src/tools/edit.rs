use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use weft_llm::ToolDefinition;

use super::tracking::{ensure_visible, exists, is_file, tracked_write};
use super::{
    APPEND_FILE_TOOL, CREATE_FILE_TOOL, INSERT_LINES_TOOL, PATCH_FILE_TOOL, ToolContext,
    WRITE_FILE_TOOL, paths,
};
use crate::ToolError;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentArgs {
    pub path: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchFileArgs {
    pub path: String,
    pub search: String,
    pub replace: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertLinesArgs {
    pub path: String,
    /// 1-indexed; the content goes before this line.
    pub line: i64,
    pub content: String,
}

pub(super) fn create_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: CREATE_FILE_TOOL.to_string(),
        description: "Create a new file with the given content. Fails if the file already exists. Parent directories are created.".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) fn write_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: WRITE_FILE_TOOL.to_string(),
        description: "Replace the whole content of a file, creating it if needed.".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) fn patch_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: PATCH_FILE_TOOL.to_string(),
        description: "Replace the first exact occurrence of `search` with `replace`. If the search text is not found, re-read the file before retrying.".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["path", "search", "replace"],
            "properties": {
                "path": { "type": "string" },
                "search": { "type": "string" },
                "replace": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) fn insert_lines_definition() -> ToolDefinition {
    ToolDefinition {
        name: INSERT_LINES_TOOL.to_string(),
        description: "Insert content before a 1-indexed line. Lines at or below 1 insert at the start; lines past the end append.".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["path", "line", "content"],
            "properties": {
                "path": { "type": "string" },
                "line": { "type": "integer" },
                "content": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) fn append_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: APPEND_FILE_TOOL.to_string(),
        description: "Append content to the end of a file, creating it if needed.".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["path", "content"],
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) async fn create_file(ctx: &ToolContext, args: &ContentArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let path = paths::resolve_for_mutation(root, &args.path)?;
    let shown = paths::display(root, &path);

    let mut ledger = ctx.session.lock().await;
    ensure_visible(&ledger, &shown)?;
    if exists(&path).await {
        return Err(ToolError::AlreadyExists(shown));
    }

    let (_, change) = tracked_write(&mut ledger, &path, write_text(&path, &args.content)).await?;
    Ok(json!({
        "success": true,
        "path": shown,
        "change": change,
        "bytes_written": args.content.len(),
    }))
}

pub(super) async fn write_file(ctx: &ToolContext, args: &ContentArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let path = paths::resolve_for_mutation(root, &args.path)?;
    let shown = paths::display(root, &path);

    let mut ledger = ctx.session.lock().await;
    ensure_visible(&ledger, &shown)?;
    reject_directory(&path, &shown).await?;

    let (_, change) = tracked_write(&mut ledger, &path, write_text(&path, &args.content)).await?;
    Ok(json!({
        "success": true,
        "path": shown,
        "change": change,
        "bytes_written": args.content.len(),
    }))
}

pub(super) async fn patch_file(ctx: &ToolContext, args: &PatchFileArgs) -> Result<Value, ToolError> {
    if args.search.is_empty() {
        return Err(ToolError::Validation("search must not be empty".to_string()));
    }
    let root = ctx.working_directory();
    let path = paths::resolve_for_mutation(root, &args.path)?;
    let shown = paths::display(root, &path);

    let mut ledger = ctx.session.lock().await;
    ensure_visible(&ledger, &shown)?;
    let content = read_existing(&path, &shown).await?;
    let Some(updated) = apply_search_replace(&content, &args.search, &args.replace) else {
        return Err(ToolError::SearchTextNotFound(shown));
    };

    let (_, change) = tracked_write(&mut ledger, &path, write_text(&path, &updated)).await?;
    Ok(json!({
        "success": true,
        "path": shown,
        "change": change,
    }))
}

pub(super) async fn insert_lines(
    ctx: &ToolContext,
    args: &InsertLinesArgs,
) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let path = paths::resolve_for_mutation(root, &args.path)?;
    let shown = paths::display(root, &path);

    let mut ledger = ctx.session.lock().await;
    ensure_visible(&ledger, &shown)?;
    let content = read_existing(&path, &shown).await?;
    let (updated, inserted_at) = insert_at_line(&content, args.line, &args.content);

    let (_, change) = tracked_write(&mut ledger, &path, write_text(&path, &updated)).await?;
    Ok(json!({
        "success": true,
        "path": shown,
        "change": change,
        "inserted_at_line": inserted_at,
    }))
}

pub(super) async fn append_file(ctx: &ToolContext, args: &ContentArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let path = paths::resolve_for_mutation(root, &args.path)?;
    let shown = paths::display(root, &path);

    let mut ledger = ctx.session.lock().await;
    ensure_visible(&ledger, &shown)?;
    reject_directory(&path, &shown).await?;

    let (_, change) = tracked_write(&mut ledger, &path, append_text(&path, &args.content)).await?;
    Ok(json!({
        "success": true,
        "path": shown,
        "change": change,
        "bytes_appended": args.content.len(),
    }))
}

async fn reject_directory(path: &Path, shown: &str) -> Result<(), ToolError> {
    if exists(path).await && !is_file(path).await {
        return Err(ToolError::Validation(format!("{shown} is not a regular file")));
    }
    Ok(())
}

async fn read_existing(path: &Path, shown: &str) -> Result<String, ToolError> {
    if !is_file(path).await {
        return Err(ToolError::NotFound(shown.to_string()));
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|error| ToolError::io("read", path, error))
}

async fn write_text(path: &Path, content: &str) -> Result<(), ToolError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|error| ToolError::io("write", path, error))
}

async fn append_text(path: &Path, content: &str) -> Result<(), ToolError> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|error| ToolError::io("open", path, error))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|error| ToolError::io("append", path, error))?;
    file.flush()
        .await
        .map_err(|error| ToolError::io("append", path, error))
}

/// Replaces the first occurrence of `search`. An exact match wins; otherwise
/// CRLF is folded to LF on both sides for the comparison. Only the matched
/// region changes, and the replacement takes that region's line endings.
fn apply_search_replace(content: &str, search: &str, replace: &str) -> Option<String> {
    if let Some(start) = content.find(search) {
        return Some(splice(content, start..start + search.len(), replace));
    }

    let (folded, raw_offsets) = fold_crlf(content);
    let search = search.replace("\r\n", "\n");
    let start = folded.find(&search)?;
    let raw = raw_offsets[start]..raw_offsets[start + search.len()];
    let replace = replace.replace("\r\n", "\n");
    let replace = if content[raw.clone()].contains("\r\n") {
        replace.replace('\n', "\r\n")
    } else {
        replace
    };
    Some(splice(content, raw, &replace))
}

fn splice(content: &str, range: std::ops::Range<usize>, replacement: &str) -> String {
    let mut updated = String::with_capacity(content.len() + replacement.len());
    updated.push_str(&content[..range.start]);
    updated.push_str(replacement);
    updated.push_str(&content[range.end..]);
    updated
}

/// `content` with every CRLF folded to LF, plus the byte offset in `content`
/// of each folded byte (and of the end). A folded LF maps to its CR, so a
/// range ending before it stops before the CR.
fn fold_crlf(content: &str) -> (String, Vec<usize>) {
    let mut folded = String::with_capacity(content.len());
    let mut offsets = Vec::with_capacity(content.len() + 1);
    let mut chars = content.char_indices().peekable();
    while let Some((position, ch)) = chars.next() {
        if ch == '\r' && chars.peek().is_some_and(|&(_, next)| next == '\n') {
            chars.next();
            folded.push('\n');
            offsets.push(position);
            continue;
        }
        folded.push(ch);
        offsets.extend(std::iter::repeat_n(position, ch.len_utf8()));
    }
    offsets.push(content.len());
    (folded, offsets)
}

/// The file's line ending, taken from its first line break.
fn line_ending(content: &str) -> &'static str {
    match content.find('\n') {
        Some(index) if content[..index].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

/// Returns the new content and the 1-indexed line the block now starts at.
fn insert_at_line(content: &str, line: i64, text: &str) -> (String, usize) {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let line_count = lines.len();
    let index = if line <= 1 {
        0
    } else {
        usize::try_from(line - 1).unwrap_or(usize::MAX).min(line_count)
    };

    let newline = line_ending(content);
    let mut block = if newline == "\r\n" {
        text.replace("\r\n", "\n").replace('\n', newline)
    } else {
        text.to_string()
    };
    if !block.ends_with('\n') && (index < line_count || content.ends_with('\n')) {
        block.push_str(newline);
    }

    let mut updated = String::with_capacity(content.len() + block.len() + newline.len());
    for existing in &lines[..index] {
        updated.push_str(existing);
    }
    if index == line_count && !updated.is_empty() && !updated.ends_with('\n') {
        updated.push_str(newline);
    }
    updated.push_str(&block);
    for existing in &lines[index..] {
        updated.push_str(existing);
    }
    (updated, index + 1)
}
