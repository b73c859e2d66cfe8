//! Plan → execute → verify loop.
//!
//! Steps run strictly in order. A step is never re-entered: a retry verdict
//! is surfaced as a suggestion and the loop moves on, an abort verdict stops
//! the plan. Every run ends with exactly one terminal event followed by
//! `Done`.

use serde::Serialize;
use std::fmt::{self, Display};
use std::sync::Arc;
use tracing::{info, warn};
use weft_llm::{Client, Message};

use crate::{
    AgentError, AgentEvent, ChangeSession, EventSink, ExecutionEnvironment, NextAction,
    NoticeLevel, Plan, PlanCoordinator, SessionConfig, Step, StepExecutor, StepVerifier,
    ToolContext, ToolDispatcher, Verdict, VerificationFailurePolicy, prompts,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Planning,
    Executing(usize),
    Verifying(usize),
    Completed,
    Aborted,
    Failed,
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }

    pub fn can_transition_to(&self, next: &OrchestratorState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Planning) => true,
            (Self::Planning, Self::Executing(0) | Self::Failed) => true,
            (Self::Executing(current), Self::Verifying(next)) => current == next,
            (Self::Executing(_), Self::Failed) => true,
            (Self::Verifying(current), Self::Executing(next)) => *next == current + 1,
            (Self::Verifying(_), Self::Completed | Self::Aborted) => true,
            (state, Self::Planning) if state.is_terminal() => true,
            _ => false,
        }
    }
}

impl Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Planning => f.write_str("planning"),
            Self::Executing(index) => write!(f, "executing({index})"),
            Self::Verifying(index) => write!(f, "verifying({index})"),
            Self::Completed => f.write_str("completed"),
            Self::Aborted => f.write_str("aborted"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Aborted,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: Step,
    pub transcript: String,
    /// `None` when the verifier could not produce a verdict.
    pub verdict: Option<Verdict>,
    pub tool_calls: usize,
    pub tool_errors: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub plan: Option<Plan>,
    pub steps: Vec<StepReport>,
    pub reason: Option<String>,
}

pub struct Orchestrator {
    client: Arc<Client>,
    env: Arc<dyn ExecutionEnvironment>,
    config: Arc<SessionConfig>,
    session: ChangeSession,
    events: EventSink,
    state: OrchestratorState,
}

impl Orchestrator {
    pub fn new(
        client: Arc<Client>,
        env: Arc<dyn ExecutionEnvironment>,
        config: SessionConfig,
        events: EventSink,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self {
            client,
            env,
            config: Arc::new(config),
            session: ChangeSession::new(),
            events,
            state: OrchestratorState::Idle,
        })
    }

    /// Records changes into an existing session instead of a fresh one.
    pub fn with_session(mut self, session: ChangeSession) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> &ChangeSession {
        &self.session
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn run(&mut self, goal: &str) -> Result<RunReport, AgentError> {
        self.transition_to(OrchestratorState::Planning)?;
        let coordinator = PlanCoordinator::new(self.client.clone(), self.config.clone());
        let plan = match coordinator.plan(goal).await {
            Ok(plan) => plan,
            Err(error) => {
                let reason = error.to_string();
                return self
                    .finish(RunStatus::Failed, None, Vec::new(), None, reason)
                    .await;
            }
        };
        self.events
            .emit(AgentEvent::Plan { plan: plan.clone() })
            .await;

        let dispatcher = ToolDispatcher::new(
            ToolContext::new(self.env.clone(), self.session.clone(), self.config.clone()),
            self.events.clone(),
        );
        let executor = StepExecutor::new(self.client.clone(), dispatcher, self.events.clone());
        let verifier = StepVerifier::new(self.client.clone(), self.config.clone());

        let mut history: Vec<Message> = Vec::new();
        let mut reports: Vec<StepReport> = Vec::with_capacity(plan.steps.len());

        for index in 0..plan.steps.len() {
            let step = plan.steps[index].clone();
            self.transition_to(OrchestratorState::Executing(index))?;
            self.events
                .emit(AgentEvent::StepStarted {
                    index,
                    step: step.clone(),
                })
                .await;

            let execution = match executor.execute(&plan, index, &history).await {
                Ok(execution) => execution,
                Err(error) => {
                    let reason = format!("step {} failed: {}", index + 1, error);
                    return self
                        .finish(RunStatus::Failed, Some(plan), reports, None, reason)
                        .await;
                }
            };

            self.transition_to(OrchestratorState::Verifying(index))?;
            let verdict = match verifier.verify(&plan, index, &execution.transcript).await {
                Ok(verdict) => Some(verdict),
                Err(error) => match self.config.verification_failure_policy {
                    VerificationFailurePolicy::FailOpen => {
                        warn!(step = %step.id, error = %error, "verification unavailable; continuing");
                        self.events
                            .emit(AgentEvent::notice(
                                NoticeLevel::Warning,
                                format!(
                                    "could not verify step {}: {}; continuing",
                                    index + 1,
                                    error
                                ),
                            ))
                            .await;
                        None
                    }
                    VerificationFailurePolicy::FailClosed => {
                        reports.push(step_report(index, &step, &execution, None));
                        let reason = format!("could not verify step {}: {}", index + 1, error);
                        return self
                            .finish(RunStatus::Aborted, Some(plan), reports, Some(index), reason)
                            .await;
                    }
                },
            };

            if let Some(verdict) = verdict.as_ref() {
                self.events
                    .emit(AgentEvent::StepVerified {
                        index,
                        verdict: verdict.clone(),
                    })
                    .await;
            }
            history.push(Message::user(prompts::step_prompt(&plan, index, &step)));
            history.push(Message::assistant(execution.transcript.clone()));
            reports.push(step_report(index, &step, &execution, verdict.clone()));

            let action = verdict
                .as_ref()
                .map(Verdict::resolved_action)
                .unwrap_or(NextAction::Proceed);
            match action {
                NextAction::Proceed => {}
                NextAction::Retry => {
                    let feedback = verdict
                        .as_ref()
                        .map(|verdict| verdict.feedback.as_str())
                        .unwrap_or_default();
                    self.events
                        .emit(AgentEvent::notice(
                            NoticeLevel::Info,
                            format!(
                                "verifier suggests retrying step {}: {}",
                                index + 1,
                                feedback
                            ),
                        ))
                        .await;
                }
                NextAction::Abort => {
                    let reason = verdict
                        .map(|verdict| verdict.feedback)
                        .unwrap_or_default();
                    return self
                        .finish(RunStatus::Aborted, Some(plan), reports, Some(index), reason)
                        .await;
                }
            }
        }

        self.finish(RunStatus::Completed, Some(plan), reports, None, String::new())
            .await
    }

    async fn finish(
        &mut self,
        status: RunStatus,
        plan: Option<Plan>,
        steps: Vec<StepReport>,
        step_index: Option<usize>,
        reason: String,
    ) -> Result<RunReport, AgentError> {
        let (state, event) = match status {
            RunStatus::Completed => (
                OrchestratorState::Completed,
                AgentEvent::Completed {
                    steps_completed: steps.len(),
                },
            ),
            RunStatus::Aborted => (
                OrchestratorState::Aborted,
                AgentEvent::Aborted {
                    step_index: step_index.unwrap_or_default(),
                    reason: reason.clone(),
                },
            ),
            RunStatus::Failed => (
                OrchestratorState::Failed,
                AgentEvent::Failed {
                    reason: reason.clone(),
                },
            ),
        };
        self.transition_to(state)?;
        self.events.emit(event).await;
        self.events.emit(AgentEvent::Done).await;

        Ok(RunReport {
            status,
            plan,
            steps,
            reason: (!reason.is_empty()).then_some(reason),
        })
    }

    fn transition_to(&mut self, next: OrchestratorState) -> Result<(), AgentError> {
        if !self.state.can_transition_to(&next) {
            return Err(AgentError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        info!(session = self.session.id(), from = %self.state, to = %next, "orchestrator transition");
        self.state = next;
        Ok(())
    }
}

fn step_report(
    index: usize,
    step: &Step,
    execution: &crate::StepExecution,
    verdict: Option<Verdict>,
) -> StepReport {
    StepReport {
        index,
        step: step.clone(),
        transcript: execution.transcript.clone(),
        verdict,
        tool_calls: execution.tool_calls,
        tool_errors: execution.tool_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_loop() {
        use OrchestratorState::*;
        assert!(Idle.can_transition_to(&Planning));
        assert!(Planning.can_transition_to(&Executing(0)));
        assert!(Planning.can_transition_to(&Failed));
        assert!(Executing(2).can_transition_to(&Verifying(2)));
        assert!(Verifying(2).can_transition_to(&Executing(3)));
        assert!(Verifying(2).can_transition_to(&Aborted));
        assert!(Completed.can_transition_to(&Planning));
    }

    #[test]
    fn steps_are_never_reentered() {
        use OrchestratorState::*;
        assert!(!Verifying(1).can_transition_to(&Executing(1)));
        assert!(!Executing(1).can_transition_to(&Verifying(0)));
        assert!(!Aborted.can_transition_to(&Executing(2)));
        assert!(!Completed.can_transition_to(&Completed));
        assert!(!Idle.can_transition_to(&Executing(0)));
    }

    #[test]
    fn state_display_includes_step_index() {
        assert_eq!(OrchestratorState::Verifying(4).to_string(), "verifying(4)");
    }
}
