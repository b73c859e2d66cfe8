//! Adapter for OpenAI-compatible chat-completions endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::{ConfigurationError, SDKError};
use crate::provider::ProviderAdapter;
use crate::types::{FinishReason, Message, Request, Response, Role, ToolCall, Usage};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER_NAME: &str = "openai";

#[derive(Clone)]
pub struct OpenAiCompatibleAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleAdapter {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, SDKError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|error| {
            SDKError::Configuration(ConfigurationError::new(format!(
                "failed to build http client: {}",
                error
            )))
        })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        Self::new(base_url, api_key, None).ok()
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(&self, request: Request) -> Result<Response, SDKError> {
        let body = build_request_body(&request);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| SDKError::Network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SDKError::Provider {
                provider: PROVIDER_NAME.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|error| SDKError::InvalidResponse(error.to_string()))?;
        convert_response(wire, &request.model)
    }
}

#[derive(Serialize)]
struct WireMessage {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Deserialize)]
struct WireResponse {
    id: String,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

fn build_request_body(request: &Request) -> Value {
    let messages: Vec<WireMessage> = request.messages.iter().map(to_wire_message).collect();
    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });

    if let Some(tools) = request.tools.as_ref().filter(|tools| !tools.is_empty()) {
        body["tools"] = Value::Array(
            tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect(),
        );
        body["tool_choice"] = Value::String("auto".to_string());
        body["parallel_tool_calls"] = Value::Bool(false);
    }
    if let Some(format) = &request.response_format {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": format.name,
                "schema": format.schema,
                "strict": format.strict,
            }
        });
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

fn to_wire_message(message: &Message) -> WireMessage {
    WireMessage {
        role: message.role,
        content: if message.content.is_empty() && !message.tool_calls.is_empty() {
            None
        } else {
            Some(message.content.clone())
        },
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                kind: function_kind(),
                function: WireFunction {
                    name: call.name.clone(),
                    arguments: call
                        .raw_arguments
                        .clone()
                        .unwrap_or_else(|| call.arguments.to_string()),
                },
            })
            .collect(),
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn convert_response(wire: WireResponse, requested_model: &str) -> Result<Response, SDKError> {
    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| SDKError::InvalidResponse("response contained no choices".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            // Unparseable arguments are kept raw so dispatch can report them.
            arguments: serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null),
            raw_arguments: Some(call.function.arguments),
        })
        .collect();

    let usage = wire
        .usage
        .map(|usage| Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    let reason = choice.finish_reason.unwrap_or_else(|| "stop".to_string());
    Ok(Response {
        id: wire.id,
        model: wire.model.unwrap_or_else(|| requested_model.to_string()),
        provider: PROVIDER_NAME.to_string(),
        message: Message::assistant_with_tool_calls(
            choice.message.content.unwrap_or_default(),
            tool_calls,
        ),
        finish_reason: FinishReason {
            raw: Some(reason.clone()),
            reason,
        },
        usage,
    })
}
