use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use weft_llm::ToolDefinition;

use super::analyze::is_skipped_entry;
use super::{GLOB_TOOL, SEARCH_TEXT_TOOL, ToolContext, paths};
use crate::{ToolError, is_sidecar_path};

const DEFAULT_MAX_RESULTS: usize = 100;
const MAX_GLOB_MATCHES: usize = 1_000;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchTextArgs {
    pub pattern: String,
    #[serde(default)]
    pub path: Option<String>,
    /// Treat `pattern` as a regular expression instead of literal text.
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub case_insensitive: bool,
    /// Only search files whose relative path matches this glob.
    #[serde(default)]
    pub glob: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobArgs {
    pub pattern: String,
    #[serde(default)]
    pub path: Option<String>,
}

pub(super) fn search_text_definition() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_TEXT_TOOL.to_string(),
        description: "Search file contents line by line. Literal by default; set regex=true for regular expressions.".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": { "type": "string" },
                "path": { "type": "string" },
                "regex": { "type": "boolean" },
                "case_insensitive": { "type": "boolean" },
                "glob": { "type": "string" },
                "max_results": { "type": "integer", "minimum": 1 }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) fn glob_definition() -> ToolDefinition {
    ToolDefinition {
        name: GLOB_TOOL.to_string(),
        description: "Find files matching a glob pattern, relative to the working directory."
            .to_string(),
        parameters: json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": { "type": "string" },
                "path": { "type": "string" }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) async fn search_text(ctx: &ToolContext, args: &SearchTextArgs) -> Result<Value, ToolError> {
    if args.pattern.is_empty() {
        return Err(ToolError::Validation("pattern must not be empty".to_string()));
    }
    let root = ctx.working_directory().to_path_buf();
    let base = paths::resolve_or_root(&root, args.path.as_deref())?;
    let matcher = build_matcher(args)?;
    let filter = args
        .glob
        .as_deref()
        .map(Pattern::new)
        .transpose()
        .map_err(|error| ToolError::Validation(format!("invalid glob filter: {error}")))?;
    let max_results = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS).max(1);

    let (hits, truncated) = tokio::task::spawn_blocking(move || {
        scan(&root, &base, &matcher, filter.as_ref(), max_results)
    })
    .await
    .map_err(|error| ToolError::Execution(format!("search failed: {error}")))?;

    Ok(json!({
        "matches": hits.len(),
        "truncated": truncated,
        "results": hits.join("\n"),
    }))
}

pub(super) async fn glob_files(ctx: &ToolContext, args: &GlobArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory().to_path_buf();
    let base = paths::resolve_or_root(&root, args.path.as_deref())?;
    let pattern = Pattern::new(&args.pattern)
        .map_err(|error| ToolError::Validation(format!("invalid glob pattern: {error}")))?;

    let matches = tokio::task::spawn_blocking(move || find_matches(&root, &base, &pattern))
        .await
        .map_err(|error| ToolError::Execution(format!("glob failed: {error}")))?;

    Ok(json!({
        "count": matches.len(),
        "matches": matches,
    }))
}

fn build_matcher(args: &SearchTextArgs) -> Result<Regex, ToolError> {
    let source = if args.regex {
        args.pattern.clone()
    } else {
        regex::escape(&args.pattern)
    };
    RegexBuilder::new(&source)
        .case_insensitive(args.case_insensitive)
        .build()
        .map_err(|error| ToolError::Validation(format!("invalid search pattern: {error}")))
}

fn searchable_files(base: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_entry(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && !is_sidecar_path(entry.path()))
        .map(|entry| entry.into_path())
}

fn scan(
    root: &Path,
    base: &Path,
    matcher: &Regex,
    filter: Option<&Pattern>,
    max_results: usize,
) -> (Vec<String>, bool) {
    let mut hits = Vec::new();
    for file in searchable_files(base) {
        let shown = paths::display(root, &file);
        if filter.is_some_and(|pattern| !matches_relative(pattern, &shown)) {
            continue;
        }
        // Binary and non-UTF-8 files are skipped.
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        for (index, line) in content.lines().enumerate() {
            if !matcher.is_match(line) {
                continue;
            }
            if hits.len() == max_results {
                return (hits, true);
            }
            hits.push(format!("{shown}:{}: {line}", index + 1));
        }
    }
    (hits, false)
}

fn find_matches(root: &Path, base: &Path, pattern: &Pattern) -> Vec<String> {
    searchable_files(base)
        .map(|file| {
            let relative_to_base = paths::display(base, &file);
            (relative_to_base, paths::display(root, &file))
        })
        .filter(|(relative, _)| matches_relative(pattern, relative))
        .map(|(_, shown)| shown)
        .take(MAX_GLOB_MATCHES)
        .collect()
}

/// A pattern without a separator also matches by file name, so `*.rs` finds
/// files at any depth.
fn matches_relative(pattern: &Pattern, relative: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    if pattern.matches_with(relative, options) {
        return true;
    }
    !pattern.as_str().contains('/')
        && relative
            .rsplit('/')
            .next()
            .is_some_and(|name| pattern.matches_with(name, options))
}
