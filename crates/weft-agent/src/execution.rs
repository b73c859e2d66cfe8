use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::AgentError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u128,
}

/// Where an agent session's commands run and its paths resolve.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    async fn exec_command(
        &self,
        command: &str,
        timeout_ms: u64,
        working_dir: Option<&Path>,
    ) -> Result<ExecResult, AgentError>;

    fn working_directory(&self) -> &Path;
    fn platform(&self) -> &str;
}

#[derive(Clone, Debug)]
pub struct LocalExecutionEnvironment {
    working_directory: PathBuf,
    platform: String,
}

impl LocalExecutionEnvironment {
    pub fn new(working_directory: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let working_directory = std::path::absolute(working_directory.into()).map_err(|error| {
            AgentError::Execution(format!("resolve working directory: {error}"))
        })?;
        Ok(Self {
            working_directory,
            platform: std::env::consts::OS.to_string(),
        })
    }
}

#[async_trait]
impl ExecutionEnvironment for LocalExecutionEnvironment {
    async fn exec_command(
        &self,
        command: &str,
        timeout_ms: u64,
        working_dir: Option<&Path>,
    ) -> Result<ExecResult, AgentError> {
        let cwd = working_dir.unwrap_or(&self.working_directory);
        let mut process = shell_command(command);
        process
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command, cwd = %cwd.display(), timeout_ms, "spawning command");
        let started = Instant::now();
        let child = process
            .spawn()
            .map_err(|error| AgentError::Execution(format!("spawn '{command}': {error}")))?;

        match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
            .await
        {
            Ok(Ok(output)) => Ok(ExecResult {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
                timed_out: false,
                duration_ms: started.elapsed().as_millis(),
            }),
            Ok(Err(error)) => Err(AgentError::Execution(format!(
                "wait for '{command}': {error}"
            ))),
            // Dropping the future drops the child, and kill_on_drop reaps it.
            Err(_) => Ok(ExecResult {
                stdout: String::new(),
                stderr: format!("command timed out after {timeout_ms} ms"),
                exit_code: -1,
                timed_out: true,
                duration_ms: started.elapsed().as_millis(),
            }),
        }
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    fn platform(&self) -> &str {
        &self.platform
    }
}

#[cfg(windows)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut process = tokio::process::Command::new("cmd");
    process.arg("/C").arg(command);
    process
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut process = tokio::process::Command::new("sh");
    process.arg("-c").arg(command);
    process
}
