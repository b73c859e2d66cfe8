use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;
use weft_llm::{Client, Message, Request, ResponseFormat};

use crate::{AgentError, Plan, SessionConfig, Verdict, prompts};

/// Classifies a finished step from its transcript.
#[derive(Clone)]
pub struct StepVerifier {
    client: Arc<Client>,
    config: Arc<SessionConfig>,
}

impl StepVerifier {
    pub fn new(client: Arc<Client>, config: Arc<SessionConfig>) -> Self {
        Self { client, config }
    }

    pub async fn verify(
        &self,
        plan: &Plan,
        index: usize,
        transcript: &str,
    ) -> Result<Verdict, AgentError> {
        let step = plan.steps.get(index).ok_or_else(|| {
            AgentError::Verification(format!("plan has no step at index {index}"))
        })?;
        let request = Request::new(
            self.config.model.clone(),
            vec![
                Message::system(prompts::verifier_prompt(&self.config)),
                Message::user(prompts::verification_prompt(plan, index, step, transcript)),
            ],
        );
        let verdict: Verdict = self
            .client
            .generate_object(request, verdict_response_format())
            .await
            .map_err(|error| AgentError::Verification(error.to_string()))?;
        info!(
            step = %step.id,
            success = verdict.success,
            action = ?verdict.resolved_action(),
            "step verified"
        );
        Ok(verdict)
    }
}

pub fn verdict_response_format() -> ResponseFormat {
    ResponseFormat {
        name: "verdict".to_string(),
        schema: verdict_schema(),
        strict: true,
    }
}

fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "required": ["success", "feedback", "nextAction"],
        "additionalProperties": false,
        "properties": {
            "success": { "type": "boolean" },
            "feedback": { "type": "string" },
            "nextAction": { "type": "string", "enum": ["proceed", "retry", "abort"] }
        }
    })
}
