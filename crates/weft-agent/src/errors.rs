use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the weft-agent crate.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("planning failed: {0}")]
    Planning(String),
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("execution environment error: {0}")]
    Execution(String),
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Llm(#[from] weft_llm::SDKError),
}

/// Failures a tool reports back to the model as a structured result. None of
/// these cross the tool boundary as a hard error.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("{0}")]
    Validation(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file already exists: {0}")]
    AlreadyExists(String),
    #[error(
        "Code block not found in {0}. Re-read the file to get its current content before retrying."
    )]
    SearchTextNotFound(String),
    #[error("path escapes the working directory: {0}")]
    OutsideWorkingDirectory(String),
    #[error("path names a change-tracking sidecar file: {0}")]
    SidecarPath(String),
    #[error(
        "stale change-tracking file {0} exists; validate or reject the previous session first"
    )]
    StaleSidecar(PathBuf),
    #[error("changes are currently hidden; show them before editing {0}")]
    ChangesHidden(String),
    #[error("command rejected: contains forbidden pattern '{0}'")]
    CommandDenied(String),
    #[error("{operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<AgentError> for ToolError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::Tool(inner) => inner,
            other => ToolError::Execution(other.to_string()),
        }
    }
}

/// Per-record failure while walking the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("record {0} has no backup")]
    MissingBackup(String),
}

impl LedgerError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
