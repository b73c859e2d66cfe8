use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use weft_llm::{Client, Message, Request, Response, StreamEvent, ToolCall, ToolResult};

use crate::{AgentError, AgentEvent, EventSink, NoticeLevel, Plan, ToolDispatcher, prompts};

/// What one step produced: the transcript handed to the verifier plus the
/// message log of the tool-calling session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepExecution {
    pub transcript: String,
    pub messages: Vec<Message>,
    pub rounds: usize,
    pub tool_calls: usize,
    pub tool_errors: usize,
    pub round_limit_reached: bool,
}

/// Drives one step as a bounded tool-calling session.
#[derive(Clone)]
pub struct StepExecutor {
    client: Arc<Client>,
    dispatcher: ToolDispatcher,
    events: EventSink,
}

impl StepExecutor {
    pub fn new(client: Arc<Client>, dispatcher: ToolDispatcher, events: EventSink) -> Self {
        Self {
            client,
            dispatcher,
            events,
        }
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub async fn execute(
        &self,
        plan: &Plan,
        index: usize,
        history: &[Message],
    ) -> Result<StepExecution, AgentError> {
        let step = plan.steps.get(index).ok_or_else(|| {
            AgentError::Execution(format!("plan has no step at index {index}"))
        })?;
        let context = self.dispatcher.context();
        let config = context.config.clone();

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(prompts::executor_prompt(
            &config,
            context.env.as_ref(),
        )));
        messages.extend_from_slice(history);
        messages.push(Message::user(prompts::step_prompt(plan, index, step)));

        let mut execution = StepExecution::default();
        let mut transcript = Vec::new();

        while execution.rounds < config.max_tool_rounds_per_step {
            execution.rounds += 1;
            let mut request = Request::new(config.model.clone(), messages.clone());
            request.tools = Some(self.dispatcher.definitions());

            let response = self.stream_round(request).await?;
            let text = response.text();
            let tool_calls = response.tool_calls();
            if !text.trim().is_empty() {
                transcript.push(text.trim().to_string());
            }

            if tool_calls.is_empty() {
                messages.push(Message::assistant(text));
                execution.transcript = transcript.join("\n");
                execution.messages = messages;
                return Ok(execution);
            }

            messages.push(Message::assistant_with_tool_calls(text, tool_calls.clone()));
            let results = self.dispatcher.dispatch(tool_calls.clone()).await;
            for (call, result) in tool_calls.iter().zip(&results) {
                execution.tool_calls += 1;
                if result.is_error {
                    execution.tool_errors += 1;
                }
                transcript.push(transcript_line(call, result));
                messages.push(Message::tool_result(result));
            }
            debug!(
                step = %step.id,
                round = execution.rounds,
                calls = results.len(),
                "tool round finished"
            );
        }

        warn!(
            step = %step.id,
            limit = config.max_tool_rounds_per_step,
            "tool round limit reached"
        );
        self.events
            .emit(AgentEvent::notice(
                NoticeLevel::Warning,
                format!(
                    "step {} stopped after {} tool rounds",
                    index + 1,
                    config.max_tool_rounds_per_step
                ),
            ))
            .await;
        transcript.push(format!(
            "[stopped: tool round limit of {} reached]",
            config.max_tool_rounds_per_step
        ));
        execution.round_limit_reached = true;
        execution.transcript = transcript.join("\n");
        execution.messages = messages;
        Ok(execution)
    }

    async fn stream_round(&self, request: Request) -> Result<Response, AgentError> {
        let mut stream = self.client.stream(request).await?;
        let mut finished = None;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { delta } => {
                    self.events.emit(AgentEvent::Text { content: delta }).await;
                }
                StreamEvent::Finish { response } => finished = Some(response),
            }
        }
        finished.ok_or_else(|| {
            AgentError::Execution("response stream ended without a final response".to_string())
        })
    }
}

fn transcript_line(call: &ToolCall, result: &ToolResult) -> String {
    if result.is_error {
        let message = result
            .content
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        format!("[tool {} error] {}", call.name, message)
    } else {
        format!("[tool {} completed] {}", call.name, compact_arguments(&call.arguments))
    }
}

fn compact_arguments(arguments: &Value) -> String {
    let Some(fields) = arguments.as_object() else {
        return String::new();
    };
    fields
        .iter()
        .filter(|(key, _)| matches!(key.as_str(), "path" | "source" | "destination" | "command" | "pattern"))
        .map(|(key, value)| match value {
            Value::String(text) => format!("{key}={text}"),
            other => format!("{key}={other}"),
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "c1".to_string(),
            name: name.to_string(),
            arguments,
            raw_arguments: None,
        }
    }

    #[test]
    fn transcript_lines_name_tool_and_status() {
        let ok = transcript_line(
            &call("write_file", json!({"path": "a.txt", "content": "long body"})),
            &ToolResult {
                tool_call_id: "c1".to_string(),
                content: json!({"success": true}),
                is_error: false,
            },
        );
        assert_eq!(ok, "[tool write_file completed] path=a.txt");

        let failed = transcript_line(
            &call("patch_file", json!({"path": "a.txt"})),
            &ToolResult {
                tool_call_id: "c1".to_string(),
                content: json!({"success": false, "error": "Code block not found in a.txt."}),
                is_error: true,
            },
        );
        assert_eq!(failed, "[tool patch_file error] Code block not found in a.txt.");
    }
}
