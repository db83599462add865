//! Task subcommands and the top-level shortcuts built on them.

use super::App;
use crate::error::PmError;
use crate::format::{format_task_detail, format_tasks_text};
use crate::store::ids::expand;
use crate::types::{Complexity, DEFAULT_PRIORITY, NewTask, Priority, Task, TaskEdit, TaskState, TaskView};
use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use std::io::{Read, Write};
use std::path::PathBuf;

/// `tasks` subcommands
#[derive(Subcommand, Debug)]
pub enum TasksCommand {
    /// List tasks (default: open, progress and blocked)
    List(ListArgs),

    /// Show one task
    Show {
        task_id: String,
    },

    /// Add a task, or a subtask with `--parent`
    Add(TaskAddArgs),

    /// Edit title, priority, complexity or body in place
    Edit(EditArgs),

    /// Move a task to another state
    State(StateArgs),

    /// Turn a task into a directory so it can hold subtasks
    Split {
        task_id: String,
    },
}

impl Default for TasksCommand {
    fn default() -> Self {
        TasksCommand::List(ListArgs::default())
    }
}

/// State filter of `tasks list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateFilter {
    Open,
    Progress,
    Done,
    Blocked,
    All,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only tasks in this state (`all` includes done)
    #[arg(short, long, value_enum)]
    pub state: Option<StateFilter>,

    /// No subtask nesting in text output
    #[arg(long)]
    pub flat: bool,
}

#[derive(Args, Debug, Default)]
pub struct TaskAddArgs {
    /// Task title
    #[arg(short, long)]
    pub title: String,

    /// Task id (allocated when omitted)
    #[arg(long = "id")]
    pub task_id: Option<String>,

    /// Priority (lower is more urgent)
    #[arg(long, default_value_t = DEFAULT_PRIORITY)]
    pub priority: Priority,

    #[arg(short, long, value_enum)]
    pub complexity: Option<Complexity>,

    /// Tasks that must be done first (repeatable)
    #[arg(short, long)]
    pub depends: Vec<String>,

    /// Create a subtask of this task
    #[arg(long = "parent")]
    pub parent_id: Option<String>,

    /// Task body
    #[arg(short, long)]
    pub body: Option<String>,

    /// Read the body from a file
    #[arg(long, value_name = "FILE")]
    pub body_file: Option<PathBuf>,

    /// Read the body from stdin
    #[arg(long = "stdin")]
    pub read_stdin: bool,
}

impl TaskAddArgs {
    fn body_text(&self) -> Result<String> {
        if let Some(body) = &self.body {
            return Ok(body.clone());
        }
        if let Some(path) = &self.body_file {
            return std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()));
        }
        if self.read_stdin {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            return Ok(body);
        }
        Ok(String::new())
    }
}

/// Arguments of the top-level `add` shortcut.
#[derive(Args, Debug)]
pub struct AddArgs {
    pub title: String,

    #[arg(long, default_value_t = DEFAULT_PRIORITY)]
    pub priority: Priority,

    #[arg(short, long, value_enum, default_value = "m")]
    pub complexity: Complexity,

    /// Create a subtask of this task
    #[arg(long = "parent")]
    pub parent_id: Option<String>,

    #[arg(short, long)]
    pub body: Option<String>,
}

impl AddArgs {
    pub fn shortcut(self) -> TaskAddArgs {
        TaskAddArgs {
            title: self.title,
            priority: self.priority,
            complexity: Some(self.complexity),
            parent_id: self.parent_id,
            body: self.body,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub task_id: String,

    #[arg(short, long)]
    pub title: Option<String>,

    #[arg(long)]
    pub priority: Option<Priority>,

    #[arg(short, long, value_enum)]
    pub complexity: Option<Complexity>,

    /// New body (replaces the description, keeps `##` sections)
    #[arg(short, long)]
    pub body: Option<String>,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    pub task_id: String,

    #[arg(value_enum)]
    pub state: TaskState,

    /// Note recorded in the work log
    #[arg(short, long)]
    pub note: Option<String>,

    /// Complete even when subtasks are not done
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments of `done`.
#[derive(Args, Debug)]
pub struct ShortcutStateArgs {
    pub task_id: String,

    /// Note recorded in the work log
    #[arg(short, long)]
    pub note: Option<String>,

    /// Complete even when subtasks are not done
    #[arg(short, long)]
    pub force: bool,
}

impl ShortcutStateArgs {
    pub fn new(task_id: String, note: Option<String>) -> Self {
        Self {
            task_id,
            note,
            force: false,
        }
    }

    pub fn into_command(self, state: TaskState) -> TasksCommand {
        TasksCommand::State(StateArgs {
            task_id: self.task_id,
            state,
            note: self.note,
            force: self.force,
        })
    }
}

fn view_json(task: &Task) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(task.view())?)
}

pub fn run<W: Write>(app: &App, command: TasksCommand, out: &mut W) -> Result<()> {
    let portfolio = app.portfolio()?;
    let (project, _) = app.require_project(&portfolio)?;
    let store = crate::store::TaskStore::for_project(&project)?;
    let expand_id = |reference: &str| expand(reference, &project.id);

    match command {
        TasksCommand::List(args) => {
            let tasks = match args.state {
                None => store.list_states(&[TaskState::Open, TaskState::Progress, TaskState::Blocked])?,
                Some(StateFilter::All) => store.list(None)?,
                Some(StateFilter::Open) => store.list(Some(TaskState::Open))?,
                Some(StateFilter::Progress) => store.list(Some(TaskState::Progress))?,
                Some(StateFilter::Done) => store.list(Some(TaskState::Done))?,
                Some(StateFilter::Blocked) => store.list(Some(TaskState::Blocked))?,
            };
            let views: Vec<TaskView> = tasks.iter().map(Task::view).collect();
            app.emit(out, &views, || format_tasks_text(&tasks, args.flat))
        }
        TasksCommand::Show { task_id } => {
            let id = expand_id(&task_id);
            let task = store.get(&id)?.ok_or_else(|| PmError::task_not_found(&id))?;
            app.emit(out, &task.view(), || format_task_detail(&task))
        }
        TasksCommand::Add(args) => {
            let new = NewTask {
                title: args.title.clone(),
                id: args.task_id.as_deref().map(&expand_id),
                priority: Some(args.priority),
                complexity: args.complexity,
                depends: args.depends.iter().map(|d| expand_id(d)).collect(),
                description: args.body_text()?,
            };
            let task = match &args.parent_id {
                Some(parent) => store.add_subtask(&expand_id(parent), &new)?,
                None => store.add(&new)?,
            };
            app.success(out, &format!("Task {} created", task.id), Some(view_json(&task)?))
        }
        TasksCommand::Edit(args) => {
            let id = expand_id(&args.task_id);
            let edit = TaskEdit {
                title: args.title,
                priority: args.priority,
                complexity: args.complexity,
                body: args.body,
            };
            let task = store.edit(&id, &edit)?;
            app.success(out, &format!("Task {} updated", task.id), Some(view_json(&task)?))
        }
        TasksCommand::State(args) => {
            let task = portfolio.change_state(
                &project.id,
                &args.task_id,
                args.state,
                args.note.as_deref(),
                args.force,
            )?;
            app.success(
                out,
                &format!("Task {} moved to {}", task.id, args.state),
                Some(view_json(&task)?),
            )
        }
        TasksCommand::Split { task_id } => {
            let task = store.split(&expand_id(&task_id))?;
            app.success(
                out,
                &format!("Task {} converted to directory", task.id),
                Some(view_json(&task)?),
            )
        }
    }
}
