//! Size limits for the copy of a tool result that goes back to the model.
//! The event stream always carries the untouched value.

use serde_json::Value;

use crate::{RUN_COMMAND_TOOL, SessionConfig};

const DEFAULT_CHAR_LIMIT: usize = 20_000;

/// Which part of an oversized output survives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TruncationMode {
    /// Keep the beginning and the end, drop the middle.
    HeadTail,
    /// Keep the end. Command output puts errors and summaries last.
    Tail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputLimit {
    pub max_chars: usize,
    pub max_lines: Option<usize>,
    pub mode: TruncationMode,
}

impl OutputLimit {
    pub fn for_tool(tool_name: &str, config: &SessionConfig) -> Self {
        Self {
            max_chars: config
                .tool_output_limits
                .get(tool_name)
                .copied()
                .unwrap_or(DEFAULT_CHAR_LIMIT),
            max_lines: config.tool_line_limits.get(tool_name).copied(),
            mode: if tool_name == RUN_COMMAND_TOOL {
                TruncationMode::Tail
            } else {
                TruncationMode::HeadTail
            },
        }
    }

    /// Character limit first, then the line limit on what is left.
    pub fn apply(&self, text: &str) -> String {
        let limited = limit_chars(text, self.max_chars, self.mode);
        match self.max_lines {
            Some(max_lines) => limit_lines(&limited, max_lines),
            None => limited,
        }
    }
}

/// Applies the tool's limit to every string inside `value`, leaving numbers,
/// booleans and keys alone.
pub fn truncate_tool_value(value: &Value, tool_name: &str, config: &SessionConfig) -> Value {
    let limit = OutputLimit::for_tool(tool_name, config);
    limit_value(value, &limit)
}

fn limit_value(value: &Value, limit: &OutputLimit) -> Value {
    match value {
        Value::String(text) => Value::String(limit.apply(text)),
        Value::Array(items) => Value::Array(items.iter().map(|item| limit_value(item, limit)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), limit_value(item, limit)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub fn limit_chars(text: &str, max_chars: usize, mode: TruncationMode) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let omitted = total - max_chars;

    match mode {
        TruncationMode::HeadTail => {
            let head_chars = max_chars / 2;
            let head_end = byte_offset(text, head_chars);
            let tail_start = byte_offset(text, total - (max_chars - head_chars));
            format!(
                "{}\n[output truncated: {omitted} characters omitted from the middle]\n{}",
                &text[..head_end],
                &text[tail_start..]
            )
        }
        TruncationMode::Tail => {
            let tail_start = byte_offset(text, omitted);
            format!(
                "[output truncated: first {omitted} characters omitted]\n{}",
                &text[tail_start..]
            )
        }
    }
}

pub fn limit_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.to_string();
    }

    let head = max_lines / 2;
    let tail = max_lines - head;
    let omitted = lines.len() - max_lines;
    let mut kept = lines[..head].to_vec();
    let marker = format!("[output truncated: {omitted} lines omitted]");
    kept.push(&marker);
    kept.extend_from_slice(&lines[lines.len() - tail..]);
    kept.join("\n")
}

/// Byte index of the `chars`-th character, or the end of `text`.
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}
