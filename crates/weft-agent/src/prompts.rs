//! System prompts for the planner, executor and verifier call sites. Each can
//! be replaced wholesale through `SessionConfig`.

use crate::{ExecutionEnvironment, Plan, SessionConfig, Step};

pub const PLANNER_SYSTEM_PROMPT: &str = "You plan work for a coding agent that edits files in a local project.
Break the user's goal into a short ordered list of concrete steps. Each step has:
- id: a short unique identifier
- description: what to do, specific enough to execute without further planning
- reasoning: why the step is needed
- type: one of command, code_change, verification, analysis
Prefer few, meaningful steps. Start with analysis when the project layout is unknown.
Reply with a JSON object {\"steps\": [...]} and nothing else.";

pub const EXECUTOR_SYSTEM_PROMPT: &str = "You are a coding agent executing one step of a larger plan.
Use the tools to inspect and change files. Every file change you make is tracked and can be reviewed by the user afterwards.
Rules:
- Read a file before patching it. If patch_file reports that the code block was not found, re-read the file and retry with its current content.
- Keep changes minimal and focused on the current step.
- Paths are relative to the working directory.
- Do not touch files ending in .backup, .deleted-backup or .modified.
When the step is done, reply with a short summary of what you did and stop calling tools.";

pub const VERIFIER_SYSTEM_PROMPT: &str = "You verify whether a coding agent completed one step of a plan.
You receive the step and the agent's transcript, including each tool call and whether it failed.
Reply with a JSON object {\"success\": bool, \"feedback\": string, \"nextAction\": \"proceed\" | \"retry\" | \"abort\"}.
Use abort only when continuing the plan would be harmful or pointless.";

pub fn planner_prompt(config: &SessionConfig) -> String {
    config
        .planner_prompt_override
        .clone()
        .unwrap_or_else(|| PLANNER_SYSTEM_PROMPT.to_string())
}

pub fn executor_prompt(config: &SessionConfig, env: &dyn ExecutionEnvironment) -> String {
    let base = config
        .executor_prompt_override
        .as_deref()
        .unwrap_or(EXECUTOR_SYSTEM_PROMPT);
    format!(
        "{base}\n\nWorking directory: {}\nPlatform: {}",
        env.working_directory().display(),
        env.platform()
    )
}

pub fn verifier_prompt(config: &SessionConfig) -> String {
    config
        .verifier_prompt_override
        .clone()
        .unwrap_or_else(|| VERIFIER_SYSTEM_PROMPT.to_string())
}

pub fn step_prompt(plan: &Plan, index: usize, step: &Step) -> String {
    format!(
        "Goal: {}\nStep {} of {} [{}]: {}\nReasoning: {}",
        plan.goal,
        index + 1,
        plan.steps.len(),
        step_type_label(step),
        step.description,
        step.reasoning
    )
}

pub fn verification_prompt(plan: &Plan, index: usize, step: &Step, transcript: &str) -> String {
    let transcript = if transcript.trim().is_empty() {
        "(the agent produced no output)"
    } else {
        transcript
    };
    format!(
        "{}\n\nTranscript:\n{}",
        step_prompt(plan, index, step),
        transcript
    )
}

fn step_type_label(step: &Step) -> &'static str {
    match step.step_type {
        crate::StepType::Command => "command",
        crate::StepType::CodeChange => "code_change",
        crate::StepType::Verification => "verification",
        crate::StepType::Analysis => "analysis",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StepType;

    #[test]
    fn step_prompt_numbers_from_one() {
        let step = Step {
            id: "s1".to_string(),
            description: "add a test".to_string(),
            reasoning: "coverage".to_string(),
            step_type: StepType::CodeChange,
        };
        let plan = Plan {
            goal: "improve tests".to_string(),
            steps: vec![step.clone()],
        };
        let prompt = step_prompt(&plan, 0, &step);
        assert!(prompt.contains("Step 1 of 1 [code_change]: add a test"));
    }

    #[test]
    fn overrides_replace_default_prompts() {
        let config = SessionConfig {
            planner_prompt_override: Some("plan tersely".to_string()),
            ..SessionConfig::default()
        };
        assert_eq!(planner_prompt(&config), "plan tersely");
        assert_eq!(verifier_prompt(&config), VERIFIER_SYSTEM_PROMPT);
    }
}
