//! Request routing and structured-object generation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::errors::{ConfigurationError, SDKError};
use crate::openai::OpenAiCompatibleAdapter;
use crate::provider::ProviderAdapter;
use crate::stream::StreamEventStream;
use crate::types::{Request, ResponseFormat, Response};

/// Bounded retry for transient backend failures (see
/// [`SDKError::is_retryable`]). The delay doubles after every attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(1 << attempt.min(16))
    }
}

#[derive(Clone, Default)]
pub struct Client {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
    default_provider: Option<String>,
    retry: RetryPolicy,
}

impl Client {
    pub fn new(
        providers: HashMap<String, Arc<dyn ProviderAdapter>>,
        default_provider: Option<String>,
    ) -> Self {
        Self {
            providers,
            default_provider,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Client with a single adapter that also becomes the default.
    pub fn with_provider(provider: Arc<dyn ProviderAdapter>) -> Self {
        let mut client = Self::default();
        client.register_provider(provider);
        client
    }

    pub fn register_provider(&mut self, provider: Arc<dyn ProviderAdapter>) {
        let name = provider.name().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    pub fn set_default_provider(&mut self, provider: impl Into<String>) {
        self.default_provider = Some(provider.into());
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Builds a client from `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`).
    pub fn from_env() -> Result<Self, SDKError> {
        let adapter = OpenAiCompatibleAdapter::from_env().ok_or_else(|| {
            SDKError::Configuration(ConfigurationError::new(
                "OPENAI_API_KEY is not set; no provider available",
            ))
        })?;
        Ok(Self::with_provider(Arc::new(adapter)))
    }

    pub async fn complete(&self, mut request: Request) -> Result<Response, SDKError> {
        let adapter = self.resolve_adapter(&mut request)?;
        debug!(
            provider = adapter.name(),
            model = %request.model,
            messages = request.messages.len(),
            "sending completion request"
        );
        self.with_retries(adapter.name(), || adapter.complete(request.clone()))
            .await
    }

    pub async fn stream(&self, mut request: Request) -> Result<StreamEventStream, SDKError> {
        let adapter = self.resolve_adapter(&mut request)?;
        debug!(
            provider = adapter.name(),
            model = %request.model,
            "opening response stream"
        );
        self.with_retries(adapter.name(), || adapter.stream(request.clone()))
            .await
    }

    /// Single-shot structured generation: the reply must be a JSON document
    /// that deserializes into `T`.
    pub async fn generate_object<T: DeserializeOwned>(
        &self,
        mut request: Request,
        format: ResponseFormat,
    ) -> Result<T, SDKError> {
        request.tools = None;
        request.response_format = Some(format);
        let response = self.complete(request).await?;
        parse_object(&response.text())
    }

    async fn with_retries<T, F, Fut>(&self, provider: &str, mut call: F) -> Result<T, SDKError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SDKError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(provider, attempt, "backend recovered after retries");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    attempt += 1;
                    warn!(
                        provider,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient backend failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn resolve_adapter(
        &self,
        request: &mut Request,
    ) -> Result<Arc<dyn ProviderAdapter>, SDKError> {
        let provider_name = match (&request.provider, &self.default_provider) {
            (Some(provider), _) => provider.clone(),
            (None, Some(provider)) => provider.clone(),
            (None, None) => {
                return Err(SDKError::Configuration(ConfigurationError::new(
                    "no provider configured",
                )));
            }
        };
        let adapter = self.providers.get(&provider_name).cloned().ok_or_else(|| {
            SDKError::Configuration(ConfigurationError::new(format!(
                "provider '{}' not registered",
                provider_name
            )))
        })?;
        request.provider = Some(provider_name);
        Ok(adapter)
    }
}

/// Parses model output as JSON, tolerating a surrounding markdown code fence.
pub fn parse_object<T: DeserializeOwned>(text: &str) -> Result<T, SDKError> {
    let trimmed = strip_code_fence(text.trim());
    if trimmed.is_empty() {
        return Err(SDKError::NoObjectGenerated(
            "model returned an empty response".to_string(),
        ));
    }
    serde_json::from_str(trimmed).map_err(|error| {
        SDKError::NoObjectGenerated(format!("response did not match schema: {}", error))
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Message, Usage};
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    /// Fails with the queued errors first, then answers.
    struct FlakyAdapter {
        failures: Mutex<Vec<SDKError>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ProviderAdapter for FlakyAdapter {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _request: Request) -> Result<Response, SDKError> {
            *self.calls.lock().expect("calls mutex") += 1;
            if let Some(error) = self.failures.lock().expect("failures mutex").pop() {
                return Err(error);
            }
            Ok(Response {
                id: "r".to_string(),
                model: "m".to_string(),
                provider: "flaky".to_string(),
                message: Message::assistant("ok"),
                finish_reason: FinishReason::stop(),
                usage: Usage::default(),
            })
        }
    }

    fn flaky(failures: Vec<SDKError>) -> Arc<FlakyAdapter> {
        Arc::new(FlakyAdapter {
            failures: Mutex::new(failures),
            calls: Mutex::new(0),
        })
    }

    fn fast_retries(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_backoff: Duration::ZERO,
        }
    }

    struct EchoAdapter {
        reply: String,
        seen: Mutex<Vec<Request>>,
    }

    #[async_trait]
    impl ProviderAdapter for EchoAdapter {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: Request) -> Result<Response, SDKError> {
            self.seen.lock().expect("seen mutex").push(request);
            Ok(Response {
                id: "r".to_string(),
                model: "m".to_string(),
                provider: "echo".to_string(),
                message: Message::assistant(self.reply.clone()),
                finish_reason: FinishReason::stop(),
                usage: Usage::default(),
            })
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        success: bool,
    }

    #[test]
    fn parse_object_accepts_fenced_json() {
        let verdict: Verdict =
            parse_object("```json\n{\"success\": true}\n```").expect("fenced json should parse");
        assert!(verdict.success);
    }

    #[test]
    fn parse_object_rejects_prose() {
        let error = parse_object::<Verdict>("looks good to me").expect_err("prose is not json");
        assert!(matches!(error, SDKError::NoObjectGenerated(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn transient_failures_are_retried_until_the_budget_runs_out() {
        let adapter = flaky(vec![
            SDKError::Network("reset".to_string()),
            SDKError::Provider {
                provider: "flaky".to_string(),
                status: 503,
                message: "busy".to_string(),
            },
        ]);
        let client = Client::with_provider(adapter.clone()).with_retry_policy(fast_retries(2));
        let response = client
            .complete(Request::new("m", vec![Message::user("hi")]))
            .await
            .expect("third attempt should succeed");
        assert_eq!(response.text(), "ok");
        assert_eq!(*adapter.calls.lock().expect("calls mutex"), 3);

        let adapter = flaky(vec![
            SDKError::Network("reset".to_string()),
            SDKError::Network("reset".to_string()),
        ]);
        let client = Client::with_provider(adapter.clone()).with_retry_policy(fast_retries(1));
        let error = client
            .complete(Request::new("m", vec![Message::user("hi")]))
            .await
            .expect_err("budget of one retry is exhausted");
        assert!(matches!(error, SDKError::Network(_)));
        assert_eq!(*adapter.calls.lock().expect("calls mutex"), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn client_errors_are_not_retried() {
        let adapter = flaky(vec![SDKError::Provider {
            provider: "flaky".to_string(),
            status: 400,
            message: "bad request".to_string(),
        }]);
        let client = Client::with_provider(adapter.clone()).with_retry_policy(fast_retries(3));
        let error = client
            .stream(Request::new("m", vec![Message::user("hi")]))
            .await
            .err()
            .expect("bad request should fail");
        assert!(matches!(error, SDKError::Provider { status: 400, .. }));
        assert_eq!(*adapter.calls.lock().expect("calls mutex"), 1);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn complete_without_providers_is_a_configuration_error() {
        let client = Client::default();
        let error = client
            .complete(Request::new("m", vec![Message::user("hi")]))
            .await
            .expect_err("no provider should fail");
        assert!(matches!(error, SDKError::Configuration(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn generate_object_sets_response_format_and_drops_tools() {
        let adapter = Arc::new(EchoAdapter {
            reply: "{\"success\": false}".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let client = Client::with_provider(adapter.clone());
        let mut request = Request::new("m", vec![Message::user("verify")]);
        request.tools = Some(Vec::new());

        let verdict: Verdict = client
            .generate_object(
                request,
                ResponseFormat {
                    name: "verdict".to_string(),
                    schema: json!({"type": "object"}),
                    strict: true,
                },
            )
            .await
            .expect("object should be generated");

        assert!(!verdict.success);
        let seen = adapter.seen.lock().expect("seen mutex");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].tools.is_none());
        assert_eq!(
            seen[0].response_format.as_ref().map(|f| f.name.as_str()),
            Some("verdict")
        );
        assert_eq!(seen[0].provider.as_deref(), Some("echo"));
    }
}
