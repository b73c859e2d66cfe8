use serde::Deserialize;
use serde_json::{Value, json};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;
use weft_llm::ToolDefinition;

use super::analyze::is_skipped_entry;
use super::files::PathArgs;
use super::{
    FILE_INFO_TOOL, LIST_DIRECTORY_TOOL, READ_FILE_RANGE_TOOL, READ_FILE_TOOL, TREE_TOOL,
    ToolContext, format_line_numbered_content, paths,
};
use crate::{ToolError, is_sidecar_path};

const DEFAULT_TREE_DEPTH: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadFileRangeArgs {
    pub path: String,
    pub start_line: usize,
    #[serde(default)]
    pub end_line: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListDirectoryArgs {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeArgs {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

pub(super) fn read_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: READ_FILE_TOOL.to_string(),
        description: "Read the full content of a text file.".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) fn read_file_range_definition() -> ToolDefinition {
    ToolDefinition {
        name: READ_FILE_RANGE_TOOL.to_string(),
        description: "Read a 1-indexed inclusive line range. Returns line-numbered content."
            .to_string(),
        parameters: json!({
            "type": "object",
            "required": ["path", "start_line"],
            "properties": {
                "path": { "type": "string" },
                "start_line": { "type": "integer", "minimum": 1 },
                "end_line": { "type": "integer", "minimum": 1 }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) fn file_info_definition() -> ToolDefinition {
    ToolDefinition {
        name: FILE_INFO_TOOL.to_string(),
        description: "Report whether a path exists, its kind, size and modification time."
            .to_string(),
        parameters: json!({
            "type": "object",
            "required": ["path"],
            "properties": {
                "path": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) fn list_directory_definition() -> ToolDefinition {
    ToolDefinition {
        name: LIST_DIRECTORY_TOOL.to_string(),
        description: "List the entries of one directory (defaults to the working directory)."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) fn tree_definition() -> ToolDefinition {
    ToolDefinition {
        name: TREE_TOOL.to_string(),
        description: "Show the directory tree, skipping dependency and build directories."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "max_depth": { "type": "integer", "minimum": 1 }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) async fn read_file(ctx: &ToolContext, args: &PathArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let path = paths::resolve(root, &args.path)?;
    let shown = paths::display(root, &path);
    let bytes = read_bytes(&path, &shown).await?;
    Ok(json!({
        "path": shown,
        "content": String::from_utf8_lossy(&bytes),
    }))
}

pub(super) async fn read_file_range(
    ctx: &ToolContext,
    args: &ReadFileRangeArgs,
) -> Result<Value, ToolError> {
    if args.start_line == 0 {
        return Err(ToolError::Validation("start_line is 1-indexed".to_string()));
    }
    if args.end_line.is_some_and(|end| end < args.start_line) {
        return Err(ToolError::Validation(
            "end_line must not be before start_line".to_string(),
        ));
    }
    let root = ctx.working_directory();
    let path = paths::resolve(root, &args.path)?;
    let shown = paths::display(root, &path);
    let bytes = read_bytes(&path, &shown).await?;
    let content = String::from_utf8_lossy(&bytes);

    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len();
    let start = args.start_line.min(total_lines + 1);
    let end = args.end_line.unwrap_or(total_lines).min(total_lines);
    let selected = if start <= end {
        lines[start - 1..end].join("\n")
    } else {
        String::new()
    };

    Ok(json!({
        "path": shown,
        "start_line": start,
        "end_line": end,
        "total_lines": total_lines,
        "content": format_line_numbered_content(&selected, start),
    }))
}

pub(super) async fn file_info(ctx: &ToolContext, args: &PathArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let path = paths::resolve(root, &args.path)?;
    let shown = paths::display(root, &path);

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(json!({ "path": shown, "exists": false }));
        }
        Err(error) => return Err(ToolError::io("stat", &path, error)),
    };
    let modified_ms = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis() as u64);

    Ok(json!({
        "path": shown,
        "exists": true,
        "is_file": metadata.is_file(),
        "is_dir": metadata.is_dir(),
        "size": metadata.len(),
        "modified_ms": modified_ms,
        "readonly": metadata.permissions().readonly(),
    }))
}

pub(super) async fn list_directory(
    ctx: &ToolContext,
    args: &ListDirectoryArgs,
) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let path = paths::resolve_or_root(root, args.path.as_deref())?;
    let shown = paths::display(root, &path);
    ensure_directory(&path, &shown).await?;

    let mut reader = tokio::fs::read_dir(&path)
        .await
        .map_err(|error| ToolError::io("list", &path, error))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|error| ToolError::io("list", &path, error))?
    {
        let entry_path = entry.path();
        if is_sidecar_path(&entry_path) {
            continue;
        }
        let metadata = entry
            .metadata()
            .await
            .map_err(|error| ToolError::io("stat", &entry_path, error))?;
        let size = metadata.is_file().then(|| metadata.len());
        entries.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "is_dir": metadata.is_dir(),
            "size": size,
        }));
    }
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    Ok(json!({
        "path": shown,
        "entries": entries,
    }))
}

pub(super) async fn tree(ctx: &ToolContext, args: &TreeArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory().to_path_buf();
    let path = paths::resolve_or_root(&root, args.path.as_deref())?;
    let shown = paths::display(&root, &path);
    ensure_directory(&path, &shown).await?;
    let max_depth = args.max_depth.unwrap_or(DEFAULT_TREE_DEPTH).max(1);

    let rendered = tokio::task::spawn_blocking(move || render_tree(&path, max_depth))
        .await
        .map_err(|error| ToolError::Execution(format!("tree walk failed: {error}")))?;

    Ok(json!({
        "path": shown,
        "tree": rendered,
    }))
}

fn render_tree(path: &std::path::Path, max_depth: usize) -> String {
    let mut lines = Vec::new();
    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_entry(entry));
    for entry in walker.filter_map(Result::ok) {
        if is_sidecar_path(entry.path()) {
            continue;
        }
        let indent = "  ".repeat(entry.depth() - 1);
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() {
            lines.push(format!("{indent}{name}/"));
        } else {
            lines.push(format!("{indent}{name}"));
        }
    }
    lines.join("\n")
}

async fn read_bytes(path: &std::path::Path, shown: &str) -> Result<Vec<u8>, ToolError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => return Err(ToolError::Validation(format!("{shown} is not a regular file"))),
        Err(_) => return Err(ToolError::NotFound(shown.to_string())),
    }
    tokio::fs::read(path)
        .await
        .map_err(|error| ToolError::io("read", path, error))
}

async fn ensure_directory(path: &std::path::Path, shown: &str) -> Result<(), ToolError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(ToolError::Validation(format!("{shown} is not a directory"))),
        Err(_) => Err(ToolError::NotFound(shown.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_skips_dependency_directories_and_sidecars() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).expect("mkdir");
        std::fs::write(dir.path().join("src/main.rs"), "").expect("write");
        std::fs::write(dir.path().join("src/main.rs.backup"), "").expect("write");
        std::fs::write(dir.path().join("README.md"), "").expect("write");

        let rendered = render_tree(dir.path(), 3);
        assert_eq!(rendered, "README.md\nsrc/\n  main.rs");
    }

    #[test]
    fn tree_respects_depth() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("a/b/c")).expect("mkdir");
        assert_eq!(render_tree(dir.path(), 1), "a/");
    }
}
