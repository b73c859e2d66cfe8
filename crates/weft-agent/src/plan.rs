use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Command,
    CodeChange,
    Verification,
    Analysis,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub reasoning: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
}

/// Ordered, immutable list of steps produced for one goal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<Step>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Proceed,
    Retry,
    Abort,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub success: bool,
    pub feedback: String,
    #[serde(rename = "nextAction", default)]
    pub next_action: Option<NextAction>,
}

impl Verdict {
    /// The action to take when the verifier left `nextAction` implicit:
    /// success proceeds, failure suggests a retry.
    pub fn resolved_action(&self) -> NextAction {
        match self.next_action {
            Some(action) => action,
            None if self.success => NextAction::Proceed,
            None => NextAction::Retry,
        }
    }
}
