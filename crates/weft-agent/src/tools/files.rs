use serde::Deserialize;
use serde_json::{Value, json};
use weft_llm::ToolDefinition;

use super::tracking::{
    ensure_trackable, ensure_visible, exists, is_file, tracked_delete, tracked_write,
};
use super::{COPY_FILE_TOOL, DELETE_FILE_TOOL, MOVE_FILE_TOOL, ToolContext, paths};
use crate::ToolError;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferArgs {
    pub source: String,
    pub destination: String,
}

pub(super) fn delete_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: DELETE_FILE_TOOL.to_string(),
        description: "Delete a file. The original content is kept so the deletion can be rejected."
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

pub(super) fn copy_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: COPY_FILE_TOOL.to_string(),
        description: "Copy a file, overwriting the destination if it exists.".to_string(),
        parameters: transfer_schema(),
    }
}

pub(super) fn move_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: MOVE_FILE_TOOL.to_string(),
        description: "Move or rename a file, overwriting the destination if it exists."
            .to_string(),
        parameters: transfer_schema(),
    }
}

fn transfer_schema() -> Value {
    json!({
        "type": "object",
        "required": ["source", "destination"],
        "properties": {
            "source": { "type": "string" },
            "destination": { "type": "string" }
        },
        "additionalProperties": false
    })
}

pub(super) async fn delete_file(ctx: &ToolContext, args: &PathArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let path = paths::resolve_for_mutation(root, &args.path)?;
    let shown = paths::display(root, &path);

    let mut ledger = ctx.session.lock().await;
    ensure_visible(&ledger, &shown)?;
    if !is_file(&path).await {
        return Err(ToolError::NotFound(shown));
    }

    let change = tracked_delete(&mut ledger, &path).await?;
    Ok(json!({
        "success": true,
        "path": shown,
        "change": change,
    }))
}

pub(super) async fn copy_file(ctx: &ToolContext, args: &TransferArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let source = paths::resolve(root, &args.source)?;
    let destination = paths::resolve_for_mutation(root, &args.destination)?;
    let shown_source = paths::display(root, &source);
    let shown_destination = paths::display(root, &destination);

    let mut ledger = ctx.session.lock().await;
    ensure_visible(&ledger, &shown_destination)?;
    check_transfer(&source, &destination, &shown_source, &shown_destination).await?;

    let (_, change) = tracked_write(&mut ledger, &destination, async {
        tokio::fs::copy(&source, &destination)
            .await
            .map_err(|error| ToolError::io("copy", &source, error))
    })
    .await?;

    Ok(json!({
        "success": true,
        "source": shown_source,
        "destination": shown_destination,
        "change": change,
    }))
}

/// Tracked as a write of the destination followed by a delete of the source,
/// so both halves can be rejected independently of how the move happened.
pub(super) async fn move_file(ctx: &ToolContext, args: &TransferArgs) -> Result<Value, ToolError> {
    let root = ctx.working_directory();
    let source = paths::resolve_for_mutation(root, &args.source)?;
    let destination = paths::resolve_for_mutation(root, &args.destination)?;
    let shown_source = paths::display(root, &source);
    let shown_destination = paths::display(root, &destination);

    let mut ledger = ctx.session.lock().await;
    ensure_visible(&ledger, &shown_source)?;
    check_transfer(&source, &destination, &shown_source, &shown_destination).await?;
    // Checked up front so a refused source cannot leave half a move behind.
    ensure_trackable(&ledger, &source).await?;

    let (_, destination_change) = tracked_write(&mut ledger, &destination, async {
        tokio::fs::copy(&source, &destination)
            .await
            .map_err(|error| ToolError::io("copy", &source, error))
    })
    .await?;
    let source_change = tracked_delete(&mut ledger, &source).await?;

    Ok(json!({
        "success": true,
        "source": shown_source,
        "destination": shown_destination,
        "source_change": source_change,
        "destination_change": destination_change,
    }))
}

async fn check_transfer(
    source: &std::path::Path,
    destination: &std::path::Path,
    shown_source: &str,
    shown_destination: &str,
) -> Result<(), ToolError> {
    if !is_file(source).await {
        return Err(ToolError::NotFound(shown_source.to_string()));
    }
    if source == destination {
        return Err(ToolError::Validation(
            "source and destination are the same file".to_string(),
        ));
    }
    if exists(destination).await && !is_file(destination).await {
        return Err(ToolError::Validation(format!(
            "{shown_destination} is not a regular file"
        )));
    }
    Ok(())
}
