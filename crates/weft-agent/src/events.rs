use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Plan, Step, Verdict};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Running,
    Completed,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub id: String,
    pub name: String,
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub status: ToolCallStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// One entry of the append-only stream a session narrates to its consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    Text {
        content: String,
    },
    ToolCall {
        tool_call: ToolCallEvent,
    },
    ToolResult {
        tool_call: ToolCallEvent,
    },
    Plan {
        plan: Plan,
    },
    StepStarted {
        index: usize,
        step: Step,
    },
    StepVerified {
        index: usize,
        verdict: Verdict,
    },
    Notice {
        level: NoticeLevel,
        message: String,
    },
    Completed {
        steps_completed: usize,
    },
    Aborted {
        step_index: usize,
        reason: String,
    },
    Failed {
        reason: String,
    },
    Done,
}

impl AgentEvent {
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self::Notice {
            level,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Aborted { .. } | Self::Failed { .. }
        )
    }
}

pub type EventReceiver = mpsc::Receiver<AgentEvent>;

/// Producer side of the event stream. Sending waits for channel capacity, so
/// a slow consumer slows the session down instead of losing events.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    sender: Option<mpsc::Sender<AgentEvent>>,
}

impl EventSink {
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn new(sender: mpsc::Sender<AgentEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub async fn emit(&self, event: AgentEvent) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        if sender.send(event).await.is_err() {
            debug!("event consumer disconnected; dropping event");
        }
    }
}

pub fn event_channel(capacity: usize) -> (EventSink, EventReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (EventSink::new(sender), receiver)
}
