#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use weft_agent::{
    AgentEvent, ChangeSession, EventReceiver, EventSink, LocalExecutionEnvironment,
    SessionConfig, ToolContext, ToolDispatcher,
};
use weft_llm::{
    Client, ConfigurationError, FinishReason, Message, ProviderAdapter, Request, Response,
    RetryPolicy, SDKError, ToolCall, ToolResult, Usage,
};

pub const PROVIDER: &str = "scripted";
pub const MODEL: &str = "scripted-model";

/// Replays queued responses in order; running out is a configuration error.
#[derive(Clone, Default)]
pub struct SequenceAdapter {
    pub responses: Arc<Mutex<VecDeque<Result<Response, SDKError>>>>,
    pub requests: Arc<Mutex<Vec<Request>>>,
}

#[async_trait]
impl ProviderAdapter for SequenceAdapter {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: Request) -> Result<Response, SDKError> {
        self.requests.lock().expect("requests mutex").push(request);
        self.responses
            .lock()
            .expect("responses mutex")
            .pop_front()
            .unwrap_or_else(|| {
                Err(SDKError::Configuration(ConfigurationError::new(
                    "no response queued",
                )))
            })
    }
}

impl SequenceAdapter {
    pub fn enqueue(&self, response: Response) {
        self.responses
            .lock()
            .expect("responses mutex")
            .push_back(Ok(response));
    }

    pub fn enqueue_error(&self, error: SDKError) {
        self.responses
            .lock()
            .expect("responses mutex")
            .push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("responses mutex").len()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests mutex").len()
    }
}

/// Scripted client that surfaces every queued error as-is.
pub fn client_with_adapter() -> (Arc<Client>, SequenceAdapter) {
    client_with_retries(RetryPolicy::none())
}

pub fn client_with_retries(retry: RetryPolicy) -> (Arc<Client>, SequenceAdapter) {
    let adapter = SequenceAdapter::default();
    let client = Client::with_provider(Arc::new(adapter.clone())).with_retry_policy(retry);
    (Arc::new(client), adapter)
}

pub fn usage() -> Usage {
    Usage {
        input_tokens: 1,
        output_tokens: 1,
        total_tokens: 2,
    }
}

pub fn text_response(id: &str, text: &str) -> Response {
    Response {
        id: id.to_string(),
        model: MODEL.to_string(),
        provider: PROVIDER.to_string(),
        message: Message::assistant(text),
        finish_reason: FinishReason::stop(),
        usage: usage(),
    }
}

pub fn json_response(id: &str, value: serde_json::Value) -> Response {
    text_response(id, &value.to_string())
}

pub fn tool_call_response(id: &str, calls: Vec<(&str, &str, serde_json::Value)>) -> Response {
    let tool_calls = calls
        .into_iter()
        .map(|(call_id, name, arguments)| tool_call(call_id, name, arguments))
        .collect();
    Response {
        id: id.to_string(),
        model: MODEL.to_string(),
        provider: PROVIDER.to_string(),
        message: Message::assistant_with_tool_calls("", tool_calls),
        finish_reason: FinishReason {
            reason: "tool_calls".to_string(),
            raw: None,
        },
        usage: usage(),
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
        raw_arguments: None,
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        model: MODEL.to_string(),
        max_tool_rounds_per_step: 4,
        ..SessionConfig::default()
    }
}

pub fn dispatcher_for(root: &Path, session: ChangeSession) -> ToolDispatcher {
    dispatcher_with_events(root, session, EventSink::disabled())
}

pub fn dispatcher_with_events(
    root: &Path,
    session: ChangeSession,
    events: EventSink,
) -> ToolDispatcher {
    let env = LocalExecutionEnvironment::new(root).expect("environment should initialize");
    ToolDispatcher::new(
        ToolContext::new(Arc::new(env), session, Arc::new(test_config())),
        events,
    )
}

pub async fn call(dispatcher: &ToolDispatcher, name: &str, arguments: serde_json::Value) -> ToolResult {
    dispatcher
        .dispatch_single(tool_call("call", name, arguments))
        .await
}

pub async fn call_ok(dispatcher: &ToolDispatcher, name: &str, arguments: serde_json::Value) -> ToolResult {
    let result = call(dispatcher, name, arguments).await;
    assert!(!result.is_error, "{name} failed: {}", result.content);
    result
}

pub fn drain_events(receiver: &mut EventReceiver) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// Every regular file under `root`, keyed by relative path.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("entry under root")
                .to_path_buf();
            let content = std::fs::read_to_string(entry.path()).expect("read snapshot file");
            (relative, content)
        })
        .collect()
}

/// Every directory under `root`, excluding `root` itself.
pub fn directories(root: &Path) -> BTreeSet<PathBuf> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .expect("entry under root")
                .to_path_buf()
        })
        .collect()
}

pub fn files(entries: &[(&str, &str)]) -> BTreeMap<PathBuf, String> {
    entries
        .iter()
        .map(|(path, content)| (PathBuf::from(path), content.to_string()))
        .collect()
}
