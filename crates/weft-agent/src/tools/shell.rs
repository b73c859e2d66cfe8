use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;
use weft_llm::ToolDefinition;

use super::{RUN_COMMAND_TOOL, ToolContext, paths};
use crate::ToolError;

/// Literal substrings that refuse a command before anything is spawned.
pub const DENIED_COMMAND_PATTERNS: [&str; 5] = ["rm -rf /", "sudo", ":(){ :|:& };:", "mkfs", "dd if="];

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunCommandArgs {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

pub(super) fn run_command_definition() -> ToolDefinition {
    ToolDefinition {
        name: RUN_COMMAND_TOOL.to_string(),
        description: "Run a shell command in the working directory. Returns stdout, stderr, exit code and whether it timed out. File changes made by commands are not tracked.".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": { "type": "string" },
                "cwd": { "type": "string" },
                "timeout_ms": { "type": "integer", "minimum": 1 }
            },
            "additionalProperties": false
        }),
    }
}

pub(super) async fn run_command(ctx: &ToolContext, args: &RunCommandArgs) -> Result<Value, ToolError> {
    if args.command.trim().is_empty() {
        return Err(ToolError::Validation("command must not be empty".to_string()));
    }
    if let Some(pattern) = denied_pattern(&args.command) {
        warn!(command = %args.command, pattern, "refusing denied command");
        return Err(ToolError::CommandDenied(pattern.to_string()));
    }

    let root = ctx.working_directory();
    let cwd = paths::resolve_or_root(root, args.cwd.as_deref())?;
    let timeout_ms = ctx.config.effective_command_timeout_ms(args.timeout_ms);
    let result = ctx
        .env
        .exec_command(&args.command, timeout_ms, Some(&cwd))
        .await?;

    Ok(json!({
        "success": result.exit_code == 0 && !result.timed_out,
        "stdout": result.stdout,
        "stderr": result.stderr,
        "exit_code": result.exit_code,
        "timed_out": result.timed_out,
        "duration_ms": result.duration_ms as u64,
    }))
}

fn denied_pattern(command: &str) -> Option<&'static str> {
    DENIED_COMMAND_PATTERNS
        .iter()
        .copied()
        .find(|pattern| command.contains(pattern))
}
