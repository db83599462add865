//! Operations spanning the portfolio: project lookup, state changes that
//! record work, and the cross-project views shared by the CLI and the
//! HTTP API.

use crate::config::{
    ConfigLoader, ConfigPaths, PortfolioConfig, ProjectSettings, ProjectSource, ProjectStatus,
    discover_projects, require_project, set_project_status,
};
use crate::format::TaskCounts;
use crate::store::TaskStore;
use crate::store::ids::expand;
use crate::types::{Task, TaskState, TaskView};
use crate::worklog::{WorkLog, WorkLogAction, WorkLogEntry};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use tracing::debug;

/// Maximum characters of `SPEC.md` included in an agent context.
pub const SPEC_EXCERPT_LEN: usize = 2000;

/// Default number of work log entries included in an agent context.
pub const CONTEXT_LOG_LIMIT: usize = 5;

/// A task together with the project it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectTask {
    pub project: String,
    pub project_name: String,
    pub task: TaskView,
}

/// Project picked by [`Portfolio::next_across`] and its next task.
#[derive(Debug, Clone, Serialize)]
pub struct NextPick {
    pub project: ProjectRef,
    pub task: TaskView,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRef {
    pub id: String,
    pub name: String,
    pub priority: i32,
}

impl From<&ProjectSettings> for ProjectRef {
    fn from(project: &ProjectSettings) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            priority: project.priority,
        }
    }
}

/// One row of the portfolio-wide status.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectActivity {
    pub id: String,
    pub name: String,
    pub in_progress: usize,
    pub blocked: usize,
}

/// In-progress and blocked counts of every active project.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioStatus {
    pub projects: Vec<ProjectActivity>,
    pub total_active: usize,
    pub total_blocked: usize,
}

/// Status of a single project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatusReport {
    pub project: String,
    pub name: String,
    pub source: ProjectSource,
    pub in_progress: Vec<TaskView>,
    pub blocked: Vec<TaskView>,
    pub open_count: usize,
    pub next: Option<TaskView>,
}

/// Everything an agent needs to resume work on a project.
#[derive(Debug, Clone, Serialize)]
pub struct AgentContext {
    pub project: ProjectSummary,
    pub source: ProjectSource,
    pub spec: Option<String>,
    pub in_progress: Vec<TaskView>,
    /// Only filled when nothing is in progress.
    pub next_task: Option<TaskView>,
    pub blockers: Vec<TaskView>,
    pub open_count: usize,
    pub recent_work: Vec<WorkLogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub priority: i32,
    pub labels: Vec<String>,
    pub repo_path: Option<String>,
}

impl From<&ProjectSettings> for ProjectSummary {
    fn from(project: &ProjectSettings) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            status: project.status,
            priority: project.priority,
            labels: project.labels.clone(),
            repo_path: project
                .repo_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        }
    }
}

/// A loaded portfolio and its work log.
#[derive(Debug, Clone)]
pub struct Portfolio {
    config: PortfolioConfig,
    worklog: WorkLog,
}

impl Portfolio {
    pub fn new(config: PortfolioConfig) -> Self {
        let worklog = WorkLog::new(config.work_log_path());
        Self { config, worklog }
    }

    /// Discover and load through `paths`.
    pub fn load(paths: ConfigPaths) -> Result<Self> {
        let loader = ConfigLoader::load_with_paths(paths)?;
        Ok(Self::new(loader.portfolio().clone()))
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    pub fn worklog(&self) -> &WorkLog {
        &self.worklog
    }

    // =========================================================================
    // Projects
    // =========================================================================

    pub fn projects(&self, status: Option<ProjectStatus>) -> Result<Vec<ProjectSettings>> {
        discover_projects(&self.config, status)
    }

    /// Project by id, or `PROJECT_NOT_FOUND`.
    pub fn project(&self, project_id: &str) -> Result<ProjectSettings> {
        require_project(&self.config, project_id)
    }

    pub fn store(&self, project_id: &str) -> Result<TaskStore> {
        TaskStore::for_project(&self.project(project_id)?)
    }

    pub fn set_status(&self, project_id: &str, status: ProjectStatus) -> Result<ProjectSettings> {
        set_project_status(&self.project(project_id)?, status)
    }

    /// Open, progress and blocked counts for each project.
    pub fn task_counts(&self, projects: &[ProjectSettings]) -> Result<Vec<(String, TaskCounts)>> {
        let mut out = Vec::with_capacity(projects.len());
        for project in projects {
            let mut counts = TaskCounts::new();
            if let Ok(store) = TaskStore::for_project(project) {
                for task in store.scan()?.tasks() {
                    if task.state != TaskState::Done {
                        *counts.entry(task.state).or_default() += 1;
                    }
                }
            }
            out.push((project.id.clone(), counts));
        }
        Ok(out)
    }

    // =========================================================================
    // Task mutations
    // =========================================================================

    /// Move a task and record the change in the work log.
    ///
    /// `task_ref` may be shorthand (`7`, `1-2`). The log summary is `note`,
    /// or `Task marked <state>`.
    pub fn change_state(
        &self,
        project_id: &str,
        task_ref: &str,
        state: TaskState,
        note: Option<&str>,
        force: bool,
    ) -> Result<Task> {
        let store = self.store(project_id)?;
        let id = expand(task_ref, project_id);
        let task = store.transition(&id, state, force)?;

        let summary = note
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Task marked {}", state));
        let entry = WorkLogEntry::new(project_id, WorkLogAction::for_state(state))
            .task(task.id.clone())
            .summary(summary);
        self.worklog.append(&entry)?;
        Ok(task)
    }

    /// Append a response to a task; when `unblock` is set a BLOCKED task
    /// moves to PROGRESS. Returns the timestamp written.
    pub fn respond(
        &self,
        project_id: &str,
        task_ref: &str,
        response: &str,
        unblock: bool,
    ) -> Result<String> {
        let store = self.store(project_id)?;
        let id = expand(task_ref, project_id);
        let task = store.require(&id)?;
        let timestamp = store.respond(&task.id, response)?;
        if unblock && task.state == TaskState::Blocked {
            self.change_state(project_id, &task.id, TaskState::Progress, None, false)?;
        }
        Ok(timestamp)
    }

    /// Append an entry after checking the project exists.
    pub fn log(&self, entry: WorkLogEntry) -> Result<WorkLogEntry> {
        self.project(&entry.project)?;
        self.worklog.append(&entry)?;
        Ok(entry)
    }

    // =========================================================================
    // Cross-project views
    // =========================================================================

    /// Tasks in any of `states` across every project, in project order.
    pub fn tasks_in_states(&self, states: &[TaskState]) -> Result<Vec<ProjectTask>> {
        let mut out = Vec::new();
        for project in self.projects(None)? {
            let Ok(store) = TaskStore::for_project(&project) else {
                continue;
            };
            for task in store.list_states(states)? {
                out.push(ProjectTask {
                    project: project.id.clone(),
                    project_name: project.name.clone(),
                    task: task.view(),
                });
            }
        }
        Ok(out)
    }

    /// Best next task over all active projects, ranked by
    /// `(project priority, task priority)`.
    pub fn next_across(&self) -> Result<Option<NextPick>> {
        let mut best: Option<(ProjectSettings, Task)> = None;
        for project in self.projects(Some(ProjectStatus::Active))? {
            let Ok(store) = TaskStore::for_project(&project) else {
                continue;
            };
            let Some(task) = store.next_task()? else {
                continue;
            };
            let better = best.as_ref().is_none_or(|(p, t)| {
                (project.priority, task.priority) < (p.priority, t.priority)
            });
            if better {
                best = Some((project, task));
            }
        }
        Ok(best.map(|(project, task)| NextPick {
            project: ProjectRef::from(&project),
            task: task.view(),
        }))
    }

    /// In-progress and blocked counts across active projects.
    pub fn status(&self) -> Result<PortfolioStatus> {
        let active = self.projects(Some(ProjectStatus::Active))?;
        let projects: Vec<ProjectActivity> = self
            .task_counts(&active)?
            .into_iter()
            .zip(&active)
            .map(|((_, counts), project)| ProjectActivity {
                id: project.id.clone(),
                name: project.name.clone(),
                in_progress: counts.get(&TaskState::Progress).copied().unwrap_or(0),
                blocked: counts.get(&TaskState::Blocked).copied().unwrap_or(0),
            })
            .collect();
        Ok(PortfolioStatus {
            total_active: projects.iter().map(|p| p.in_progress).sum(),
            total_blocked: projects.iter().map(|p| p.blocked).sum(),
            projects,
        })
    }

    /// Status of one project.
    pub fn project_status(
        &self,
        project: &ProjectSettings,
        source: ProjectSource,
    ) -> Result<ProjectStatusReport> {
        let store = TaskStore::for_project(project)?;
        let graph = store.scan()?;
        let views = |state: TaskState| -> Vec<TaskView> {
            graph
                .tasks()
                .iter()
                .filter(|t| t.state == state)
                .map(Task::view)
                .collect()
        };
        Ok(ProjectStatusReport {
            project: project.id.clone(),
            name: project.name.clone(),
            source,
            in_progress: views(TaskState::Progress),
            blocked: views(TaskState::Blocked),
            open_count: graph
                .tasks()
                .iter()
                .filter(|t| t.state == TaskState::Open)
                .count(),
            next: crate::store::next::select_next(graph.tasks()).map(Task::view),
        })
    }

    /// Spec excerpt, current work, blockers and recent log for a project.
    pub fn agent_context(
        &self,
        project: &ProjectSettings,
        source: ProjectSource,
        log_limit: usize,
    ) -> Result<AgentContext> {
        let report = self.project_status(project, source)?;
        let spec = match project.meta_dir().map(|d| d.join("SPEC.md")) {
            Some(path) if path.is_file() => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Some(spec_excerpt(&content))
            }
            _ => None,
        };
        let recent_work = self.worklog.tail(Some(&project.id), log_limit)?;
        debug!(project = %project.id, entries = recent_work.len(), "Built agent context");

        let next_task = if report.in_progress.is_empty() {
            report.next
        } else {
            None
        };
        Ok(AgentContext {
            project: ProjectSummary::from(project),
            source,
            spec,
            in_progress: report.in_progress,
            next_task,
            blockers: report.blocked,
            open_count: report.open_count,
            recent_work,
        })
    }
}

fn spec_excerpt(content: &str) -> String {
    if content.chars().count() <= SPEC_EXCERPT_LEN {
        return content.to_string();
    }
    let head: String = content.chars().take(SPEC_EXCERPT_LEN).collect();
    format!("{}\n\n[...truncated...]", head)
}
