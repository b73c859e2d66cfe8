//! The agent's tool set: a closed enum of typed invocations.
//!
//! Arguments are validated exactly once, when a raw tool call is parsed into
//! a [`ToolInvocation`]. Read tools never touch the ledger; mutating tools
//! back up, mutate and register one pending change per path.

mod analyze;
mod dispatch;
mod edit;
mod files;
mod paths;
mod read;
mod search;
mod shell;
mod tracking;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use weft_llm::ToolDefinition;

use crate::{ChangeSession, ExecutionEnvironment, SessionConfig, ToolError};

pub use analyze::{AnalyzeProjectArgs, ProjectAnalysis, SKIPPED_DIRECTORIES, analyze_project};
pub use dispatch::ToolDispatcher;
pub use edit::{ContentArgs, InsertLinesArgs, PatchFileArgs};
pub use files::{PathArgs, TransferArgs};
pub use read::{ListDirectoryArgs, ReadFileRangeArgs, TreeArgs};
pub use search::{GlobArgs, SearchTextArgs};
pub use shell::{DENIED_COMMAND_PATTERNS, RunCommandArgs};

pub const READ_FILE_TOOL: &str = "read_file";
pub const READ_FILE_RANGE_TOOL: &str = "read_file_range";
pub const FILE_INFO_TOOL: &str = "file_info";
pub const LIST_DIRECTORY_TOOL: &str = "list_directory";
pub const TREE_TOOL: &str = "tree";
pub const SEARCH_TEXT_TOOL: &str = "search_text";
pub const GLOB_TOOL: &str = "glob";
pub const ANALYZE_PROJECT_TOOL: &str = "analyze_project";
pub const CREATE_FILE_TOOL: &str = "create_file";
pub const WRITE_FILE_TOOL: &str = "write_file";
pub const PATCH_FILE_TOOL: &str = "patch_file";
pub const INSERT_LINES_TOOL: &str = "insert_lines";
pub const APPEND_FILE_TOOL: &str = "append_file";
pub const DELETE_FILE_TOOL: &str = "delete_file";
pub const COPY_FILE_TOOL: &str = "copy_file";
pub const MOVE_FILE_TOOL: &str = "move_file";
pub const RUN_COMMAND_TOOL: &str = "run_command";

/// Everything a tool needs: where it runs, which ledger it records into, and
/// the limits it honours.
#[derive(Clone)]
pub struct ToolContext {
    pub env: Arc<dyn ExecutionEnvironment>,
    pub session: ChangeSession,
    pub config: Arc<SessionConfig>,
}

impl ToolContext {
    pub fn new(
        env: Arc<dyn ExecutionEnvironment>,
        session: ChangeSession,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            env,
            session,
            config,
        }
    }

    pub fn working_directory(&self) -> &Path {
        self.env.working_directory()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolInvocation {
    ReadFile(PathArgs),
    ReadFileRange(ReadFileRangeArgs),
    FileInfo(PathArgs),
    ListDirectory(ListDirectoryArgs),
    Tree(TreeArgs),
    SearchText(SearchTextArgs),
    Glob(GlobArgs),
    AnalyzeProject(AnalyzeProjectArgs),
    CreateFile(ContentArgs),
    WriteFile(ContentArgs),
    PatchFile(PatchFileArgs),
    InsertLines(InsertLinesArgs),
    AppendFile(ContentArgs),
    DeleteFile(PathArgs),
    CopyFile(TransferArgs),
    MoveFile(TransferArgs),
    RunCommand(RunCommandArgs),
}

impl ToolInvocation {
    pub fn parse(name: &str, arguments: Value) -> Result<Self, ToolError> {
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let invocation = match name {
            READ_FILE_TOOL => Self::ReadFile(typed_arguments(name, arguments)?),
            READ_FILE_RANGE_TOOL => Self::ReadFileRange(typed_arguments(name, arguments)?),
            FILE_INFO_TOOL => Self::FileInfo(typed_arguments(name, arguments)?),
            LIST_DIRECTORY_TOOL => Self::ListDirectory(typed_arguments(name, arguments)?),
            TREE_TOOL => Self::Tree(typed_arguments(name, arguments)?),
            SEARCH_TEXT_TOOL => Self::SearchText(typed_arguments(name, arguments)?),
            GLOB_TOOL => Self::Glob(typed_arguments(name, arguments)?),
            ANALYZE_PROJECT_TOOL => Self::AnalyzeProject(typed_arguments(name, arguments)?),
            CREATE_FILE_TOOL => Self::CreateFile(typed_arguments(name, arguments)?),
            WRITE_FILE_TOOL => Self::WriteFile(typed_arguments(name, arguments)?),
            PATCH_FILE_TOOL => Self::PatchFile(typed_arguments(name, arguments)?),
            INSERT_LINES_TOOL => Self::InsertLines(typed_arguments(name, arguments)?),
            APPEND_FILE_TOOL => Self::AppendFile(typed_arguments(name, arguments)?),
            DELETE_FILE_TOOL => Self::DeleteFile(typed_arguments(name, arguments)?),
            COPY_FILE_TOOL => Self::CopyFile(typed_arguments(name, arguments)?),
            MOVE_FILE_TOOL => Self::MoveFile(typed_arguments(name, arguments)?),
            RUN_COMMAND_TOOL => Self::RunCommand(typed_arguments(name, arguments)?),
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };
        Ok(invocation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadFile(_) => READ_FILE_TOOL,
            Self::ReadFileRange(_) => READ_FILE_RANGE_TOOL,
            Self::FileInfo(_) => FILE_INFO_TOOL,
            Self::ListDirectory(_) => LIST_DIRECTORY_TOOL,
            Self::Tree(_) => TREE_TOOL,
            Self::SearchText(_) => SEARCH_TEXT_TOOL,
            Self::Glob(_) => GLOB_TOOL,
            Self::AnalyzeProject(_) => ANALYZE_PROJECT_TOOL,
            Self::CreateFile(_) => CREATE_FILE_TOOL,
            Self::WriteFile(_) => WRITE_FILE_TOOL,
            Self::PatchFile(_) => PATCH_FILE_TOOL,
            Self::InsertLines(_) => INSERT_LINES_TOOL,
            Self::AppendFile(_) => APPEND_FILE_TOOL,
            Self::DeleteFile(_) => DELETE_FILE_TOOL,
            Self::CopyFile(_) => COPY_FILE_TOOL,
            Self::MoveFile(_) => MOVE_FILE_TOOL,
            Self::RunCommand(_) => RUN_COMMAND_TOOL,
        }
    }

    /// Whether the invocation goes through the ledger.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::CreateFile(_)
                | Self::WriteFile(_)
                | Self::PatchFile(_)
                | Self::InsertLines(_)
                | Self::AppendFile(_)
                | Self::DeleteFile(_)
                | Self::CopyFile(_)
                | Self::MoveFile(_)
        )
    }

    pub async fn execute(&self, ctx: &ToolContext) -> Result<Value, ToolError> {
        match self {
            Self::ReadFile(args) => read::read_file(ctx, args).await,
            Self::ReadFileRange(args) => read::read_file_range(ctx, args).await,
            Self::FileInfo(args) => read::file_info(ctx, args).await,
            Self::ListDirectory(args) => read::list_directory(ctx, args).await,
            Self::Tree(args) => read::tree(ctx, args).await,
            Self::SearchText(args) => search::search_text(ctx, args).await,
            Self::Glob(args) => search::glob_files(ctx, args).await,
            Self::AnalyzeProject(args) => analyze::analyze(ctx, args).await,
            Self::CreateFile(args) => edit::create_file(ctx, args).await,
            Self::WriteFile(args) => edit::write_file(ctx, args).await,
            Self::PatchFile(args) => edit::patch_file(ctx, args).await,
            Self::InsertLines(args) => edit::insert_lines(ctx, args).await,
            Self::AppendFile(args) => edit::append_file(ctx, args).await,
            Self::DeleteFile(args) => files::delete_file(ctx, args).await,
            Self::CopyFile(args) => files::copy_file(ctx, args).await,
            Self::MoveFile(args) => files::move_file(ctx, args).await,
            Self::RunCommand(args) => shell::run_command(ctx, args).await,
        }
    }
}

/// The full catalog offered to the model, read tools first.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        read::read_file_definition(),
        read::read_file_range_definition(),
        read::file_info_definition(),
        read::list_directory_definition(),
        read::tree_definition(),
        search::search_text_definition(),
        search::glob_definition(),
        analyze::analyze_project_definition(),
        edit::create_file_definition(),
        edit::write_file_definition(),
        edit::patch_file_definition(),
        edit::insert_lines_definition(),
        edit::append_file_definition(),
        files::delete_file_definition(),
        files::copy_file_definition(),
        files::move_file_definition(),
        shell::run_command_definition(),
    ]
}

fn typed_arguments<T: DeserializeOwned>(name: &str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|error| {
        ToolError::Validation(format!("invalid arguments for tool '{name}': {error}"))
    })
}

fn format_line_numbered_content(content: &str, start_line: usize) -> String {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| format!("{} | {}", start_line + idx, line))
        .collect::<Vec<String>>()
        .join("\n")
}
