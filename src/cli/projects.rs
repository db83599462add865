//! Portfolio and project subcommands: `use`, `projects`, `project`, plus
//! the `next`, `status` and `context` views.

use super::App;
use crate::config::context::{detect_project_from, read_context, write_context};
use crate::config::{
    Issue, IssueLevel, ProjectStatus, check_project, get_project, init_project, validate_portfolio,
};
use crate::error::PmError;
use crate::format::{
    OutputFormat, format_issues_text, format_projects_text, format_task_detail, format_task_line,
    format_worklog_text,
};
use crate::portfolio::{AgentContext, NextPick, Portfolio, PortfolioStatus, ProjectStatusReport};
use crate::store::TaskStore;
use anyhow::Result;
use clap::Subcommand;
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

/// `projects` subcommands
#[derive(Subcommand, Debug)]
pub enum ProjectsCommand {
    /// List projects in the portfolio
    List {
        /// Only projects with this status
        #[arg(short, long = "filter", value_enum)]
        filter: Option<ProjectStatus>,
    },

    /// Next task across all active projects
    Next,
}

/// `project` subcommands
#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create `.project/` in a repository
    Init {
        /// Repository directory
        #[arg(short = 'r', long = "in-repo", default_value = ".")]
        repo: PathBuf,

        /// Project id (default: kebab-cased directory name)
        #[arg(long = "id")]
        project_id: Option<String>,

        /// Display name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Check the portfolio and projects for problems
    Doctor,
}

// =============================================================================
// use
// =============================================================================

pub fn run_use<W: Write>(
    app: &App,
    project_id: Option<String>,
    clear: bool,
    out: &mut W,
) -> Result<()> {
    let context_file = app
        .paths
        .context_file
        .clone()
        .ok_or_else(|| PmError::internal("no location for the context file"))?;

    if clear {
        write_context(&context_file, None)?;
        return app.success(out, "Context cleared", None);
    }

    if let Some(id) = project_id {
        let project = app.portfolio()?.project(&id)?;
        write_context(&context_file, Some(&project.id))?;
        return app.success(
            out,
            &format!("Now using project: {} ({})", project.name, project.id),
            None,
        );
    }

    let current = read_context(&context_file);
    let cwd_project = detect_project_from(&app.cwd);
    let effective = cwd_project
        .as_ref()
        .map(|p| p.id.clone())
        .or_else(|| current.clone());
    let value = json!({
        "context_project": current,
        "cwd_project": cwd_project.as_ref().map(|p| p.id.clone()),
        "effective": effective,
    });
    app.emit(out, &value, || match (&cwd_project, &current) {
        (Some(p), _) => format!("Current directory: {} ({})", p.name, p.id),
        (None, Some(id)) => format!("Context: {}", id),
        (None, None) => {
            "No project context set. Use 'clawpm use <project>' or cd into a project.".to_string()
        }
    })
}

// =============================================================================
// projects / project
// =============================================================================

pub fn run_projects<W: Write>(app: &App, command: ProjectsCommand, out: &mut W) -> Result<()> {
    match command {
        ProjectsCommand::List { filter } => {
            let portfolio = app.portfolio()?;
            let projects = portfolio.projects(filter)?;
            let counts: HashMap<_, _> = match app.format {
                OutputFormat::Text => portfolio.task_counts(&projects)?.into_iter().collect(),
                OutputFormat::Json => HashMap::new(),
            };
            app.emit(out, &json!({ "projects": projects }), || {
                format_projects_text(&projects, &counts)
            })
        }
        ProjectsCommand::Next => run_next_across(app, out),
    }
}

pub fn run_project<W: Write>(app: &App, command: ProjectCommand, out: &mut W) -> Result<()> {
    match command {
        ProjectCommand::Init {
            repo,
            project_id,
            name,
        } => {
            let repo = if repo.is_absolute() {
                repo
            } else {
                app.cwd.join(repo)
            };
            let project = init_project(&repo, project_id.as_deref(), name.as_deref())?;
            let meta = project.meta_dir().unwrap_or_default();
            app.success(
                out,
                &format!("Project initialized at {}", meta.display()),
                Some(serde_json::to_value(&project)?),
            )
        }
        ProjectCommand::Doctor => {
            let portfolio = app.portfolio()?;
            let mut issues = validate_portfolio(portfolio.config());
            match app.project.as_deref() {
                Some(id) => match get_project(portfolio.config(), id)? {
                    Some(project) => issues.extend(check_project(&project)),
                    None => issues.push(Issue::project(
                        IssueLevel::Error,
                        id,
                        format!("Project not found: {}", id),
                    )),
                },
                None => {
                    for project in portfolio.projects(None)? {
                        issues.extend(check_project(&project));
                    }
                }
            }
            let value = json!({ "issues": issues, "count": issues.len() });
            app.emit(out, &value, || format_issues_text(&issues))
        }
    }
}

// =============================================================================
// next / status / context
// =============================================================================

fn run_next_across<W: Write>(app: &App, out: &mut W) -> Result<()> {
    let portfolio = app.portfolio()?;
    match portfolio.next_across()? {
        Some(pick) => app.emit(out, &pick, || next_pick_text(&pick, &portfolio)),
        None => app.emit(
            out,
            &json!({ "project": null, "task": null, "message": "No tasks available" }),
            || "No tasks available across active projects.".to_string(),
        ),
    }
}

fn next_pick_text(pick: &NextPick, portfolio: &Portfolio) -> String {
    let detail = portfolio
        .store(&pick.project.id)
        .and_then(|store| store.require(&pick.task.id))
        .map(|task| format_task_detail(&task))
        .unwrap_or_else(|_| format!("{} - {}", pick.task.id, pick.task.title));
    format!("{}\n\nProject: {} ({})", detail, pick.project.name, pick.project.id)
}

/// `next`: the explicit project's next task, else the best across projects.
pub fn run_next<W: Write>(app: &App, out: &mut W) -> Result<()> {
    let Some(project_id) = app.project.as_deref() else {
        return run_next_across(app, out);
    };
    let portfolio = app.portfolio()?;
    let store = portfolio.store(project_id)?;
    match store.next_task()? {
        Some(task) => app.emit(out, &task.view(), || format_task_detail(&task)),
        None => app.emit(
            out,
            &json!({ "task": null, "message": "No tasks available" }),
            || "No tasks available.".to_string(),
        ),
    }
}

pub fn run_status<W: Write>(app: &App, out: &mut W) -> Result<()> {
    let portfolio = app.portfolio()?;
    let Some((id, source)) = app.project_id() else {
        let status = portfolio.status()?;
        return app.emit(out, &status, || portfolio_status_text(&status));
    };
    let project = portfolio.project(&id)?;
    let report = portfolio.project_status(&project, source)?;
    app.emit(out, &report, || project_status_text(&report))
}

fn portfolio_status_text(status: &PortfolioStatus) -> String {
    let mut lines = vec![format!(
        "Active: {} tasks in progress, {} blocked\n",
        status.total_active, status.total_blocked
    )];
    for project in &status.projects {
        let mut parts = Vec::new();
        if project.in_progress > 0 {
            parts.push(format!("{} active", project.in_progress));
        }
        if project.blocked > 0 {
            parts.push(format!("{} blocked", project.blocked));
        }
        let summary = if parts.is_empty() {
            "idle".to_string()
        } else {
            parts.join(", ")
        };
        lines.push(format!("  {}: {}", project.name, summary));
    }
    lines.join("\n")
}

fn project_status_text(report: &ProjectStatusReport) -> String {
    let mut out = format!(
        "Project: {} ({})\nOpen: {} | In Progress: {} | Blocked: {}",
        report.name,
        report.source.as_str(),
        report.open_count,
        report.in_progress.len(),
        report.blocked.len()
    );
    if !report.in_progress.is_empty() {
        out.push_str("\n\nIn Progress:");
        for task in &report.in_progress {
            out.push_str(&format!("\n  → {}: {}", task.id, task.title));
        }
    }
    if !report.blocked.is_empty() {
        out.push_str("\n\nBlocked:");
        for task in &report.blocked {
            out.push_str(&format!("\n  ✗ {}: {}", task.id, task.title));
        }
    }
    if let Some(next) = &report.next
        && !report.in_progress.iter().any(|t| t.id == next.id)
    {
        out.push_str(&format!("\n\nNext up: {}: {}", next.id, next.title));
    }
    out
}

pub fn run_context<W: Write>(app: &App, log_limit: usize, out: &mut W) -> Result<()> {
    let portfolio = app.portfolio()?;
    let (project, source) = app.require_project(&portfolio)?;
    let context = portfolio.agent_context(&project, source, log_limit)?;
    let store = TaskStore::for_project(&project)?;
    app.emit(out, &context, || context_text(&context, &store))
}

fn context_text(context: &AgentContext, store: &TaskStore) -> String {
    let line = |id: &str| {
        store
            .get(id)
            .ok()
            .flatten()
            .map(|t| format_task_line(&t))
            .unwrap_or_else(|| id.to_string())
    };
    let mut out = format!(
        "{} ({})\nStatus: {} | Priority: {} | Open tasks: {}",
        context.project.name,
        context.source.as_str(),
        context.project.status,
        context.project.priority,
        context.open_count
    );
    if !context.in_progress.is_empty() {
        out.push_str("\n\nIn progress:");
        for task in &context.in_progress {
            out.push_str(&format!("\n  {}", line(&task.id)));
        }
    }
    if let Some(next) = &context.next_task {
        out.push_str(&format!("\n\nNext: {}", line(&next.id)));
    }
    if !context.blockers.is_empty() {
        out.push_str("\n\nBlocked:");
        for task in &context.blockers {
            out.push_str(&format!("\n  {}", line(&task.id)));
        }
    }
    if !context.recent_work.is_empty() {
        out.push_str("\n\nRecent work:\n");
        out.push_str(&format_worklog_text(&context.recent_work));
    }
    out
}
