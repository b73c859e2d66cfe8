mod logging;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use weft_agent::{
    AgentEvent, ChangeSession, EventSink, LedgerReport, LocalExecutionEnvironment, Orchestrator,
    PendingChange, RunReport, RunStatus, SessionConfig, ToolCallStatus, analyze_project,
    event_channel, load_config, tool_definitions,
};
use weft_llm::Client;

const DEFAULT_CONFIG_FILE: &str = "weft.toml";

#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(about = "Plan, execute and verify file edits you can preview, keep or roll back")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a goal against a project directory.
    Run(RunArgs),
    /// Print the tool catalog offered to the model.
    Tools(ToolsArgs),
    /// Summarize a project directory.
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[arg(long)]
    goal: String,
    #[arg(long, default_value = ".")]
    dir: PathBuf,
    /// TOML session config. Defaults to `weft.toml` in the project directory
    /// when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, value_enum, default_value_t = FinishMode::Prompt)]
    finish: FinishMode,
    #[arg(long = "no-stream-events", action = ArgAction::SetTrue)]
    no_stream_events: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    event_json: bool,
}

#[derive(clap::Args, Debug)]
struct ToolsArgs {
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct AnalyzeArgs {
    #[arg(long, default_value = ".")]
    dir: PathBuf,
}

/// What happens to pending changes once the run is over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FinishMode {
    /// Ask on the console; keeps changes pending when stdin is not a terminal.
    Prompt,
    Validate,
    Reject,
    /// Leave changes and their backups on disk.
    Keep,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    logging::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::Tools(args) => tools_command(args),
        Commands::Analyze(args) => analyze_command(args),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}

async fn run_command(args: RunArgs) -> anyhow::Result<ExitCode> {
    let mut config = resolve_config(&args.dir, args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model = model;
    }
    let client = Client::from_env().context("no reasoning backend configured")?;
    let env = LocalExecutionEnvironment::new(&args.dir)?;

    let (events, event_task) = event_stream(
        !args.no_stream_events,
        args.event_json,
        config.event_channel_capacity,
    );
    let mut orchestrator = Orchestrator::new(Arc::new(client), Arc::new(env), config, events)?;
    let report = orchestrator.run(&args.goal).await?;
    let session = orchestrator.session().clone();
    drop(orchestrator);

    if let Some(task) = event_task {
        task.await.context("event printer stopped unexpectedly")?;
    }

    print_run_summary(&report, &session).await;
    finish_session(&session, args.finish).await?;
    Ok(exit_code_for_status(report.status))
}

fn tools_command(args: ToolsArgs) -> anyhow::Result<ExitCode> {
    let definitions = tool_definitions();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&definitions)?);
    } else {
        for definition in definitions {
            println!("{:<18} {}", definition.name, definition.description);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn analyze_command(args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    let analysis = analyze_project(&args.dir)?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(ExitCode::SUCCESS)
}

fn resolve_config(dir: &Path, explicit: Option<&Path>) -> anyhow::Result<SessionConfig> {
    match explicit {
        Some(path) if !path.exists() => bail!("config file '{}' does not exist", path.display()),
        Some(path) => Ok(load_config(path)?),
        None => Ok(load_config(&dir.join(DEFAULT_CONFIG_FILE))?),
    }
}

fn event_stream(
    stream_events: bool,
    event_json: bool,
    capacity: usize,
) -> (EventSink, Option<tokio::task::JoinHandle<()>>) {
    if !stream_events {
        return (EventSink::disabled(), None);
    }

    let (sink, mut receiver) = event_channel(capacity);
    let task = tokio::spawn(async move {
        let mut printer = EventPrinter::default();
        while let Some(event) = receiver.recv().await {
            if event_json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(_) => printer.print(&event),
                }
            } else {
                printer.print(&event);
            }
        }
        printer.end_text();
    });
    (sink, Some(task))
}

/// Human-readable event rendering. Text deltas are printed as they arrive and
/// closed with a newline before the next structured line.
#[derive(Default)]
struct EventPrinter {
    in_text: bool,
}

impl EventPrinter {
    fn print(&mut self, event: &AgentEvent) {
        if let AgentEvent::Text { content } = event {
            print!("{content}");
            let _ = std::io::stdout().flush();
            self.in_text = true;
            return;
        }
        self.end_text();

        match event {
            AgentEvent::Text { .. } | AgentEvent::Done => {}
            AgentEvent::ToolCall { tool_call } => {
                println!("[tool] {} {}", tool_call.name, tool_call.args);
            }
            AgentEvent::ToolResult { tool_call } => {
                let status = match tool_call.status {
                    ToolCallStatus::Running => "running",
                    ToolCallStatus::Completed => "completed",
                    ToolCallStatus::Error => "error",
                };
                println!("[tool] {} {}", tool_call.name, status);
            }
            AgentEvent::Plan { plan } => {
                println!("[plan] {} step(s) for: {}", plan.steps.len(), plan.goal);
                for (index, step) in plan.steps.iter().enumerate() {
                    println!("  {}. {}", index + 1, step.description);
                }
            }
            AgentEvent::StepStarted { index, step } => {
                println!("[step {}] {}", index + 1, step.description);
            }
            AgentEvent::StepVerified { index, verdict } => {
                println!(
                    "[verify {}] success={} next={:?} {}",
                    index + 1,
                    verdict.success,
                    verdict.resolved_action(),
                    verdict.feedback
                );
            }
            AgentEvent::Notice { level, message } => {
                println!("[{level:?}] {message}");
            }
            AgentEvent::Completed { steps_completed } => {
                println!("[completed] {steps_completed} step(s)");
            }
            AgentEvent::Aborted { step_index, reason } => {
                println!("[aborted] at step {}: {reason}", step_index + 1);
            }
            AgentEvent::Failed { reason } => {
                println!("[failed] {reason}");
            }
        }
    }

    fn end_text(&mut self) {
        if self.in_text {
            println!();
            self.in_text = false;
        }
    }
}

async fn print_run_summary(report: &RunReport, session: &ChangeSession) {
    println!(
        "status: {}",
        match report.status {
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
            RunStatus::Failed => "failed",
        }
    );
    println!("steps_run: {}", report.steps.len());
    if let Some(reason) = report.reason.as_deref() {
        println!("reason: {reason}");
    }
    print_pending_changes(&session.list().await);
}

fn print_pending_changes(changes: &[PendingChange]) {
    println!("pending_changes: {}", changes.len());
    for change in changes {
        println!("  {:?} {}", change.kind, change.file_path.display());
    }
}

async fn finish_session(session: &ChangeSession, mode: FinishMode) -> anyhow::Result<()> {
    if session.list().await.is_empty() {
        return Ok(());
    }

    match mode {
        FinishMode::Validate => print_ledger_report("validate", &session.validate().await),
        FinishMode::Reject => print_ledger_report("reject", &session.reject().await),
        FinishMode::Keep => keep_pending(session).await,
        FinishMode::Prompt if !is_interactive_terminal() => keep_pending(session).await,
        FinishMode::Prompt => review_loop(session).await?,
    }
    Ok(())
}

async fn keep_pending(session: &ChangeSession) {
    if !session.is_visible().await {
        print_ledger_report("show", &session.toggle(true).await);
    }
    println!("changes kept; originals remain in .backup / .deleted-backup files");
    println!("files with leftover backups stay off-limits to later runs until the backups are removed");
}

async fn review_loop(session: &ChangeSession) -> anyhow::Result<()> {
    loop {
        let view = if session.is_visible().await {
            "modified"
        } else {
            "original"
        };
        let prompt = format!("[{view}] (s)how (h)ide (l)ist (v)alidate (r)eject (q)uit > ");
        let Some(line) = read_console_line(prompt).await? else {
            keep_pending(session).await;
            return Ok(());
        };

        match line.trim() {
            "s" | "show" => print_ledger_report("show", &session.toggle(true).await),
            "h" | "hide" => print_ledger_report("hide", &session.toggle(false).await),
            "l" | "list" => print_pending_changes(&session.list().await),
            "v" | "validate" => {
                print_ledger_report("validate", &session.validate().await);
                return Ok(());
            }
            "r" | "reject" => {
                print_ledger_report("reject", &session.reject().await);
                return Ok(());
            }
            "q" | "quit" => {
                keep_pending(session).await;
                return Ok(());
            }
            "" => {}
            other => println!("unknown command '{other}'"),
        }
    }
}

async fn read_console_line(prompt: String) -> anyhow::Result<Option<String>> {
    let line = tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
        print!("{prompt}");
        std::io::stdout().flush()?;
        let mut line = String::new();
        let read = std::io::stdin().read_line(&mut line)?;
        Ok((read > 0).then_some(line))
    })
    .await
    .context("console reader stopped unexpectedly")??;
    Ok(line)
}

fn print_ledger_report(operation: &str, report: &LedgerReport) {
    info!(operation, records = report.records, "ledger operation finished");
    println!("{operation}: {} record(s)", report.records);
    for failure in &report.failures {
        println!(
            "  failed {}: {}",
            failure.file_path.display(),
            failure.message
        );
    }
}

fn exit_code_for_status(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Completed => ExitCode::SUCCESS,
        RunStatus::Aborted | RunStatus::Failed => ExitCode::from(2),
    }
}

fn is_interactive_terminal() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}
