use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use weft_llm::{Client, Message, Request, ResponseFormat};

use crate::{AgentError, Plan, SessionConfig, Step, StepType, prompts};

#[derive(Debug, Deserialize)]
struct PlanDraft {
    steps: Vec<StepDraft>,
}

#[derive(Debug, Deserialize)]
struct StepDraft {
    #[serde(default)]
    id: String,
    description: String,
    #[serde(default)]
    reasoning: String,
    #[serde(rename = "type")]
    step_type: StepType,
}

/// Turns a goal into a [`Plan`] with one structured generation call.
#[derive(Clone)]
pub struct PlanCoordinator {
    client: Arc<Client>,
    config: Arc<SessionConfig>,
}

impl PlanCoordinator {
    pub fn new(client: Arc<Client>, config: Arc<SessionConfig>) -> Self {
        Self { client, config }
    }

    pub async fn plan(&self, goal: &str) -> Result<Plan, AgentError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(AgentError::Planning("goal must not be empty".to_string()));
        }

        let request = Request::new(
            self.config.model.clone(),
            vec![
                Message::system(prompts::planner_prompt(&self.config)),
                Message::user(goal),
            ],
        );
        let draft: PlanDraft = self
            .client
            .generate_object(request, plan_response_format())
            .await
            .map_err(|error| AgentError::Planning(error.to_string()))?;

        let plan = finalize_plan(goal, draft)?;
        info!(goal, steps = plan.steps.len(), "plan ready");
        Ok(plan)
    }
}

fn finalize_plan(goal: &str, draft: PlanDraft) -> Result<Plan, AgentError> {
    if draft.steps.is_empty() {
        return Err(AgentError::Planning("planner returned no steps".to_string()));
    }

    let mut seen = HashSet::new();
    let mut steps = Vec::with_capacity(draft.steps.len());
    for (index, draft_step) in draft.steps.into_iter().enumerate() {
        let description = draft_step.description.trim().to_string();
        if description.is_empty() {
            return Err(AgentError::Planning(format!(
                "step {} has an empty description",
                index + 1
            )));
        }
        let mut id = draft_step.id.trim().to_string();
        if id.is_empty() || seen.contains(&id) {
            id = generated_step_id(&seen, index + 1);
        }
        seen.insert(id.clone());
        steps.push(Step {
            id,
            description,
            reasoning: draft_step.reasoning.trim().to_string(),
            step_type: draft_step.step_type,
        });
    }

    Ok(Plan {
        goal: goal.to_string(),
        steps,
    })
}

/// `step-N`, suffixed until it collides with no id already taken.
fn generated_step_id(seen: &HashSet<String>, position: usize) -> String {
    let base = format!("step-{position}");
    let mut id = base.clone();
    let mut suffix = 2;
    while seen.contains(&id) {
        id = format!("{base}-{suffix}");
        suffix += 1;
    }
    id
}

pub fn plan_response_format() -> ResponseFormat {
    ResponseFormat {
        name: "plan".to_string(),
        schema: plan_schema(),
        strict: true,
    }
}

fn plan_schema() -> Value {
    json!({
        "type": "object",
        "required": ["steps"],
        "additionalProperties": false,
        "properties": {
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["id", "description", "reasoning", "type"],
                    "additionalProperties": false,
                    "properties": {
                        "id": { "type": "string" },
                        "description": { "type": "string" },
                        "reasoning": { "type": "string" },
                        "type": {
                            "type": "string",
                            "enum": ["command", "code_change", "verification", "analysis"]
                        }
                    }
                }
            }
        }
    })
}
