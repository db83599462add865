//! CLI command definitions for clawpm
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands;
//! [`run`] dispatches a parsed command and writes its result to `out`.

pub mod log;
pub mod projects;
pub mod research;
pub mod tasks;

use crate::config::{ConfigPaths, ProjectSettings, ProjectSource, resolve_project};
use crate::error::PmError;
use crate::format::{OutputFormat, success_json, to_json};
use crate::portfolio::Portfolio;
use crate::types::TaskState;
use anyhow::Result;
use clap::{Parser, Subcommand};
use self::log::LogCommand;
use projects::{ProjectCommand, ProjectsCommand};
use research::ResearchCommand;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use tasks::{AddArgs, ShortcutStateArgs, TasksCommand};

/// Default bind address of `serve`.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port of `serve`.
pub const DEFAULT_PORT: u16 = 8080;

/// Filesystem-first project and task tracker
#[derive(Parser, Debug)]
#[command(name = "clawpm", author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "json", global = true)]
    pub format: OutputFormat,

    /// Project to operate on (overrides cwd and `use` context)
    #[arg(short = 'p', long = "project", global = true)]
    pub project: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Set, show or clear the current project context
    Use {
        /// Project to use from now on
        project_id: Option<String>,

        /// Forget the current context
        #[arg(long)]
        clear: bool,
    },

    /// Work with all projects in the portfolio
    #[command(subcommand)]
    Projects(ProjectsCommand),

    /// Manage a single project
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage tasks (bare `tasks` lists open, progress and blocked)
    Tasks {
        #[command(subcommand)]
        command: Option<TasksCommand>,
    },

    /// Add a task (shortcut for `tasks add`)
    Add(AddArgs),

    /// Mark a task done
    Done(ShortcutStateArgs),

    /// Mark a task in progress
    Start {
        task_id: String,
    },

    /// Mark a task blocked
    Block {
        task_id: String,

        /// What the task is waiting on
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Next task in the current project, or across projects when none is set
    Next,

    /// In-progress work, blockers and what comes next
    Status,

    /// Everything an agent needs to resume work on a project
    Context {
        /// Number of recent work log entries
        #[arg(short = 'n', long, default_value_t = crate::portfolio::CONTEXT_LOG_LIMIT)]
        log_limit: usize,
    },

    /// Work log
    #[command(subcommand)]
    Log(LogCommand),

    /// Research notes under `.project/research/`
    #[command(subcommand)]
    Research(ResearchCommand),

    /// Start the HTTP API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        /// Port to bind to
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

/// Per-invocation state shared by every command handler.
#[derive(Debug, Clone)]
pub struct App {
    pub format: OutputFormat,
    /// The global `--project` flag.
    pub project: Option<String>,
    pub paths: ConfigPaths,
    pub cwd: PathBuf,
}

impl App {
    pub fn new(format: OutputFormat, project: Option<String>, paths: ConfigPaths, cwd: PathBuf) -> Self {
        Self {
            format,
            project,
            paths,
            cwd,
        }
    }

    /// Application state for a parsed command line in the current process.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        Ok(Self::new(
            cli.format,
            cli.project.clone(),
            ConfigPaths::discover(),
            std::env::current_dir()?,
        ))
    }

    pub fn portfolio(&self) -> Result<Portfolio> {
        Portfolio::load(self.paths.clone())
    }

    /// Project id from the global flag, the working directory or the
    /// `use` context, if any.
    pub fn project_id(&self) -> Option<(String, ProjectSource)> {
        resolve_project(
            None,
            self.project.as_deref(),
            &self.cwd,
            self.paths.context_file.as_deref(),
        )
    }

    /// Resolved project, or `NO_PROJECT` when nothing names one.
    pub fn require_project(&self, portfolio: &Portfolio) -> Result<(ProjectSettings, ProjectSource)> {
        let (id, source) = self.project_id().ok_or_else(PmError::no_project)?;
        Ok((portfolio.project(&id)?, source))
    }

    /// Write `value` as JSON, or `text()` in text mode.
    pub fn emit<W: Write, T: Serialize>(
        &self,
        out: &mut W,
        value: &T,
        text: impl FnOnce() -> String,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Json => writeln!(out, "{}", to_json(value))?,
            OutputFormat::Text => writeln!(out, "{}", text())?,
        }
        Ok(())
    }

    /// `{"status": "ok", ...}` in JSON mode, `✓ message` in text mode.
    pub fn success<W: Write>(&self, out: &mut W, message: &str, data: Option<Value>) -> Result<()> {
        match self.format {
            OutputFormat::Json => writeln!(out, "{}", to_json(&success_json(message, data)))?,
            OutputFormat::Text => writeln!(out, "✓ {}", message)?,
        }
        Ok(())
    }
}

/// Run a parsed command.
pub async fn run<W: Write>(app: &App, command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Use { project_id, clear } => projects::run_use(app, project_id, clear, out),
        Command::Projects(cmd) => projects::run_projects(app, cmd, out),
        Command::Project(cmd) => projects::run_project(app, cmd, out),
        Command::Tasks { command } => tasks::run(app, command.unwrap_or_default(), out),
        Command::Add(args) => tasks::run(app, TasksCommand::Add(args.shortcut()), out),
        Command::Done(args) => tasks::run(app, args.into_command(TaskState::Done), out),
        Command::Start { task_id } => tasks::run(
            app,
            ShortcutStateArgs::new(task_id, None).into_command(TaskState::Progress),
            out,
        ),
        Command::Block { task_id, note } => tasks::run(
            app,
            ShortcutStateArgs::new(task_id, note).into_command(TaskState::Blocked),
            out,
        ),
        Command::Next => projects::run_next(app, out),
        Command::Status => projects::run_status(app, out),
        Command::Context { log_limit } => projects::run_context(app, log_limit, out),
        Command::Log(cmd) => log::run(app, cmd, out).await,
        Command::Research(cmd) => research::run(app, cmd, out),
        Command::Serve { host, port } => crate::dashboard::serve(app.paths.clone(), &host, port).await,
    }
}
