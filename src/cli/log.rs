//! Work log subcommands.

use super::App;
use crate::format::{OutputFormat, format_worklog_entry, format_worklog_text};
use crate::store::ids::expand;
use crate::worklog::{DEFAULT_AGENT, WorkLogAction, WorkLogEntry};
use anyhow::Result;
use clap::Subcommand;
use std::io::Write;
use tracing::warn;

/// Default number of entries shown by `log tail`.
pub const DEFAULT_TAIL_LIMIT: usize = 20;

/// `log` subcommands
#[derive(Subcommand, Debug)]
pub enum LogCommand {
    /// Record a work log entry
    Add {
        /// Task the work belongs to
        #[arg(short, long = "task")]
        task_id: Option<String>,

        #[arg(short, long, value_enum)]
        action: WorkLogAction,

        /// What was done
        #[arg(short, long)]
        summary: String,

        /// What comes next
        #[arg(long = "next")]
        next_steps: Option<String>,

        /// Files changed (repeatable)
        #[arg(short, long = "files")]
        files: Vec<String>,

        /// What is blocking progress
        #[arg(short, long)]
        blocker: Option<String>,

        #[arg(long, default_value = DEFAULT_AGENT)]
        agent: String,

        #[arg(long)]
        session_key: Option<String>,
    },

    /// Recent entries, oldest first
    Tail {
        #[arg(short = 'n', long, default_value_t = DEFAULT_TAIL_LIMIT)]
        limit: usize,

        /// Keep printing new entries until interrupted
        #[arg(short, long)]
        follow: bool,

        /// Every project, ignoring the current one
        #[arg(short, long)]
        all: bool,
    },

    /// The most recent entry
    Last {
        /// Every project, ignoring the current one
        #[arg(short, long)]
        all: bool,
    },
}

pub async fn run<W: Write>(app: &App, command: LogCommand, out: &mut W) -> Result<()> {
    let portfolio = app.portfolio()?;
    match command {
        LogCommand::Add {
            task_id,
            action,
            summary,
            next_steps,
            files,
            blocker,
            agent,
            session_key,
        } => {
            let (project, _) = app.require_project(&portfolio)?;
            let mut entry = WorkLogEntry::new(project.id.clone(), action)
                .summary(summary)
                .agent(agent);
            if let Some(task) = task_id {
                entry = entry.task(expand(&task, &project.id));
            }
            if let Some(next) = next_steps {
                entry = entry.next(next);
            }
            if let Some(blocker) = blocker {
                entry = entry.blockers(blocker);
            }
            if !files.is_empty() {
                entry = entry.files_changed(files);
            }
            entry.session_key = session_key;
            let entry = portfolio.log(entry)?;
            app.success(out, "Entry added", Some(serde_json::to_value(&entry)?))
        }
        LogCommand::Tail { limit, follow, all } => {
            let project = scoped_project(app, all);
            let entries = portfolio.worklog().tail(project.as_deref(), limit)?;
            app.emit(out, &entries, || format_worklog_text(&entries))?;
            if !follow {
                return Ok(());
            }
            out.flush()?;

            let format = app.format;
            let following = portfolio.worklog().follow(project.as_deref(), |entry| {
                if let Err(e) = write_followed(out, format, &entry) {
                    warn!(error = %e, "Failed to write followed entry");
                }
            });
            tokio::select! {
                result = following => result,
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
        LogCommand::Last { all } => {
            let project = scoped_project(app, all);
            match portfolio.worklog().last(project.as_deref())? {
                Some(entry) => app.emit(out, &vec![&entry], || format_worklog_entry(&entry)),
                None => app.emit(out, &serde_json::Value::Null, || "No entries found".to_string()),
            }
        }
    }
}

/// Current project for filtering, unless `all` asks for every project.
fn scoped_project(app: &App, all: bool) -> Option<String> {
    if all {
        return None;
    }
    app.project_id().map(|(id, _)| id)
}

/// One line of JSON per entry, or a text block.
fn write_followed<W: Write>(out: &mut W, format: OutputFormat, entry: &WorkLogEntry) -> Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(entry)?)?,
        OutputFormat::Text => writeln!(out, "{}\n", format_worklog_entry(entry))?,
    }
    out.flush()?;
    Ok(())
}
