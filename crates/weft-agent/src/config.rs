use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::AgentError;

/// What the orchestrator does when the verifier itself cannot produce a verdict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFailurePolicy {
    /// Trust the execution and move on.
    #[default]
    FailOpen,
    /// Treat the step as failed and abort the plan.
    FailClosed,
}

/// Runtime configuration for an editing session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub model: String,
    pub max_tool_rounds_per_step: usize,
    pub default_command_timeout_ms: u64,
    pub max_command_timeout_ms: u64,
    pub verification_failure_policy: VerificationFailurePolicy,
    pub event_channel_capacity: usize,
    pub planner_prompt_override: Option<String>,
    pub executor_prompt_override: Option<String>,
    pub verifier_prompt_override: Option<String>,
    pub tool_output_limits: HashMap<String, usize>,
    pub tool_line_limits: HashMap<String, usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".to_string(),
            max_tool_rounds_per_step: 25,
            default_command_timeout_ms: 10_000,
            max_command_timeout_ms: 600_000,
            verification_failure_policy: VerificationFailurePolicy::FailOpen,
            event_channel_capacity: 256,
            planner_prompt_override: None,
            executor_prompt_override: None,
            verifier_prompt_override: None,
            tool_output_limits: default_tool_output_limits(),
            tool_line_limits: default_tool_line_limits(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.model.trim().is_empty() {
            return Err(AgentError::InvalidConfiguration(
                "model must not be empty".to_string(),
            ));
        }
        if self.max_tool_rounds_per_step == 0 {
            return Err(AgentError::InvalidConfiguration(
                "max_tool_rounds_per_step must be > 0".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(AgentError::InvalidConfiguration(
                "event_channel_capacity must be > 0".to_string(),
            ));
        }
        if self.default_command_timeout_ms > self.max_command_timeout_ms {
            return Err(AgentError::InvalidConfiguration(format!(
                "default_command_timeout_ms ({}) exceeds max_command_timeout_ms ({})",
                self.default_command_timeout_ms, self.max_command_timeout_ms
            )));
        }
        Ok(())
    }

    /// Clamps a requested command timeout into the configured window.
    pub fn effective_command_timeout_ms(&self, requested: Option<u64>) -> u64 {
        match requested {
            Some(0) | None => self.default_command_timeout_ms,
            Some(value) => value.min(self.max_command_timeout_ms),
        }
    }
}

/// Loads a TOML config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<SessionConfig, AgentError> {
    if !path.exists() {
        let config = SessionConfig::default();
        config.validate()?;
        return Ok(config);
    }
    let contents = std::fs::read_to_string(path).map_err(|error| {
        AgentError::InvalidConfiguration(format!("read {}: {}", path.display(), error))
    })?;
    let config: SessionConfig = toml::from_str(&contents).map_err(|error| {
        AgentError::InvalidConfiguration(format!("parse {}: {}", path.display(), error))
    })?;
    config.validate()?;
    Ok(config)
}

pub fn default_tool_output_limits() -> HashMap<String, usize> {
    HashMap::from([
        ("read_file".to_string(), 50_000),
        ("read_file_range".to_string(), 50_000),
        ("run_command".to_string(), 30_000),
        ("search_text".to_string(), 20_000),
        ("glob".to_string(), 20_000),
        ("tree".to_string(), 20_000),
    ])
}

pub fn default_tool_line_limits() -> HashMap<String, usize> {
    HashMap::from([
        ("run_command".to_string(), 256),
        ("search_text".to_string(), 200),
        ("glob".to_string(), 500),
        ("tree".to_string(), 500),
    ])
}
