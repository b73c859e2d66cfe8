use serde_json::{Value, json};
use std::time::Instant;
use tracing::debug;
use weft_llm::{ToolCall, ToolDefinition, ToolResult};

use super::{ToolContext, ToolInvocation, tool_definitions};
use crate::{AgentEvent, EventSink, ToolCallEvent, ToolCallStatus, ToolError, truncate_tool_value};

/// Runs model-issued tool calls one at a time, in request order, narrating
/// each call on the event stream.
#[derive(Clone)]
pub struct ToolDispatcher {
    context: ToolContext,
    events: EventSink,
}

impl ToolDispatcher {
    pub fn new(context: ToolContext, events: EventSink) -> Self {
        Self { context, events }
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        tool_definitions()
    }

    pub async fn dispatch(&self, tool_calls: Vec<ToolCall>) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for tool_call in tool_calls {
            results.push(self.dispatch_single(tool_call).await);
        }
        results
    }

    /// Never fails: every error becomes a `{success: false, error}` result the
    /// model can react to.
    pub async fn dispatch_single(&self, tool_call: ToolCall) -> ToolResult {
        let start_time = Instant::now();
        let parsed_arguments = parse_tool_arguments(&tool_call);
        let event_arguments = match &parsed_arguments {
            Ok(arguments) => arguments.clone(),
            Err(_) => tool_call
                .raw_arguments
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        };

        self.events
            .emit(AgentEvent::ToolCall {
                tool_call: ToolCallEvent {
                    id: tool_call.id.clone(),
                    name: tool_call.name.clone(),
                    args: event_arguments.clone(),
                    result: None,
                    status: ToolCallStatus::Running,
                },
            })
            .await;

        let outcome = match parsed_arguments
            .and_then(|arguments| ToolInvocation::parse(&tool_call.name, arguments))
        {
            Ok(invocation) => invocation.execute(&self.context).await,
            Err(error) => Err(error),
        };

        let (value, status) = match outcome {
            Ok(value) => (value, ToolCallStatus::Completed),
            Err(error) => (error_value(&error), ToolCallStatus::Error),
        };
        debug!(
            tool = %tool_call.name,
            call_id = %tool_call.id,
            duration_ms = start_time.elapsed().as_millis() as u64,
            status = ?status,
            "tool call finished"
        );

        self.events
            .emit(AgentEvent::ToolResult {
                tool_call: ToolCallEvent {
                    id: tool_call.id.clone(),
                    name: tool_call.name.clone(),
                    args: event_arguments,
                    result: Some(value.clone()),
                    status,
                },
            })
            .await;

        ToolResult {
            content: truncate_tool_value(&value, &tool_call.name, &self.context.config),
            tool_call_id: tool_call.id,
            is_error: status == ToolCallStatus::Error,
        }
    }
}

fn parse_tool_arguments(tool_call: &ToolCall) -> Result<Value, ToolError> {
    if tool_call.arguments.is_null() {
        if let Some(raw_arguments) = &tool_call.raw_arguments {
            return serde_json::from_str::<Value>(raw_arguments).map_err(|error| {
                ToolError::Validation(format!(
                    "invalid JSON arguments for tool '{}': {}",
                    tool_call.name, error
                ))
            });
        }
    }
    Ok(tool_call.arguments.clone())
}

fn error_value(error: &ToolError) -> Value {
    json!({
        "success": false,
        "error": error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeSession, LocalExecutionEnvironment, SessionConfig, event_channel};
    use std::sync::Arc;

    fn dispatcher(root: &std::path::Path, events: EventSink) -> ToolDispatcher {
        let env = Arc::new(LocalExecutionEnvironment::new(root).expect("env"));
        let context = ToolContext::new(env, ChangeSession::new(), Arc::new(SessionConfig::default()));
        ToolDispatcher::new(context, events)
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
            raw_arguments: None,
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dispatch_emits_start_and_end_events_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (sink, mut receiver) = event_channel(16);
        let dispatcher = dispatcher(dir.path(), sink);

        let results = dispatcher
            .dispatch(vec![
                call("c1", "create_file", json!({"path": "a.txt", "content": "x"})),
                call("c2", "read_file", json!({"path": "a.txt"})),
            ])
            .await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].is_error);
        assert_eq!(results[1].content["content"], "x");

        let mut statuses = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            match event {
                AgentEvent::ToolCall { tool_call } | AgentEvent::ToolResult { tool_call } => {
                    statuses.push((tool_call.id, tool_call.status));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(
            statuses,
            vec![
                ("c1".to_string(), ToolCallStatus::Running),
                ("c1".to_string(), ToolCallStatus::Completed),
                ("c2".to_string(), ToolCallStatus::Running),
                ("c2".to_string(), ToolCallStatus::Completed),
            ]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn errors_become_structured_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dispatcher = dispatcher(dir.path(), EventSink::disabled());

        let unknown = dispatcher
            .dispatch_single(call("c1", "launch_rocket", json!({})))
            .await;
        assert!(unknown.is_error);
        assert_eq!(unknown.content["success"], false);

        let outside = dispatcher
            .dispatch_single(call("c2", "write_file", json!({"path": "../x", "content": ""})))
            .await;
        assert!(outside.is_error);
        assert!(
            outside.content["error"]
                .as_str()
                .is_some_and(|message| message.contains("escapes"))
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unparseable_raw_arguments_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dispatcher = dispatcher(dir.path(), EventSink::disabled());
        let result = dispatcher
            .dispatch_single(ToolCall {
                id: "c1".to_string(),
                name: "read_file".to_string(),
                arguments: Value::Null,
                raw_arguments: Some("{not json".to_string()),
            })
            .await;
        assert!(result.is_error);
        assert!(
            result.content["error"]
                .as_str()
                .is_some_and(|message| message.contains("invalid JSON"))
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn model_copy_is_truncated_but_event_copy_is_not() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("big.txt"), "y".repeat(200)).expect("write");
        let env = Arc::new(LocalExecutionEnvironment::new(dir.path()).expect("env"));
        let mut config = SessionConfig::default();
        config.tool_output_limits.insert("read_file".to_string(), 50);
        let (sink, mut receiver) = event_channel(4);
        let dispatcher = ToolDispatcher::new(
            ToolContext::new(env, ChangeSession::new(), Arc::new(config)),
            sink,
        );

        let result = dispatcher
            .dispatch_single(call("c1", "read_file", json!({"path": "big.txt"})))
            .await;
        assert!(
            result.content["content"]
                .as_str()
                .is_some_and(|text| text.contains("[output truncated"))
        );

        let _started = receiver.recv().await.expect("start event");
        match receiver.recv().await.expect("end event") {
            AgentEvent::ToolResult { tool_call } => {
                let full = tool_call.result.expect("result");
                assert_eq!(full["content"].as_str().map(str::len), Some(200));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
