//! Project discovery, initialization and status changes.

use super::types::{
    NewSettings, PROJECT_DIR, PortfolioConfig, ProjectSettings, ProjectStatus, SETTINGS_FILE,
    TASKS_DIR,
};
use crate::error::PmError;
use crate::paths::{BLOCKED_DIR, DONE_DIR};
use crate::types::DEFAULT_PRIORITY;
use anyhow::{Context, Result};
use heck::ToKebabCase;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn settings_file_in(repo: &Path) -> PathBuf {
    repo.join(PROJECT_DIR).join(SETTINGS_FILE)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Roots to scan: existing, and never the agent workspace.
fn scan_roots(config: &PortfolioConfig) -> impl Iterator<Item = &PathBuf> {
    config.project_roots.iter().filter(move |root| {
        if !root.is_dir() {
            return false;
        }
        if let Some(ws) = &config.openclaw_workspace
            && same_dir(root, ws)
        {
            debug!(root = %root.display(), "Skipping agent workspace root");
            return false;
        }
        true
    })
}

/// Load every project settings file found one level below `root`, sorted
/// by path. Malformed settings are skipped with a warning.
fn projects_in(root: &Path) -> Result<Vec<ProjectSettings>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)
        .with_context(|| format!("listing {}", root.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();

    let mut projects = Vec::new();
    for repo in entries {
        let settings = settings_file_in(&repo);
        if !settings.is_file() {
            continue;
        }
        match ProjectSettings::load(&settings) {
            Ok(project) => projects.push(project),
            Err(e) => warn!(path = %settings.display(), error = %format!("{:#}", e), "Skipping malformed project settings"),
        }
    }
    Ok(projects)
}

/// All projects under the portfolio's roots, sorted by `(priority, name)`.
pub fn discover_projects(
    config: &PortfolioConfig,
    status: Option<ProjectStatus>,
) -> Result<Vec<ProjectSettings>> {
    let mut projects = Vec::new();
    for root in scan_roots(config) {
        projects.extend(
            projects_in(root)?
                .into_iter()
                .filter(|p| status.is_none_or(|s| p.status == s)),
        );
    }
    projects.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
    Ok(projects)
}

/// Find a project by id: `root/<id>` first, then every project in the root.
pub fn get_project(config: &PortfolioConfig, project_id: &str) -> Result<Option<ProjectSettings>> {
    for root in scan_roots(config) {
        let direct = settings_file_in(&root.join(project_id));
        if direct.is_file()
            && let Ok(project) = ProjectSettings::load(&direct)
            && project.id == project_id
        {
            return Ok(Some(project));
        }
        if let Some(project) = projects_in(root)?.into_iter().find(|p| p.id == project_id) {
            return Ok(Some(project));
        }
    }
    Ok(None)
}

/// Like [`get_project`], but a missing project is `PROJECT_NOT_FOUND`.
pub fn require_project(config: &PortfolioConfig, project_id: &str) -> Result<ProjectSettings> {
    get_project(config, project_id)?.ok_or_else(|| PmError::project_not_found(project_id).into())
}

/// Severity of a doctor finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warning,
}

/// A problem found by [`validate_portfolio`] or [`check_project`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub level: IssueLevel,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub message: String,
}

impl Issue {
    fn portfolio(message: String) -> Self {
        Self {
            level: IssueLevel::Error,
            scope: "portfolio".into(),
            project: None,
            message,
        }
    }

    pub(crate) fn project(level: IssueLevel, project: &str, message: String) -> Self {
        Self {
            level,
            scope: "project".into(),
            project: Some(project.to_string()),
            message,
        }
    }
}

/// Portfolio-level problems: missing roots, workspace overlap, missing log.
pub fn validate_portfolio(config: &PortfolioConfig) -> Vec<Issue> {
    let mut issues = Vec::new();

    if !config.portfolio_root.exists() {
        issues.push(Issue::portfolio(format!(
            "Portfolio root does not exist: {}",
            config.portfolio_root.display()
        )));
    }

    for root in &config.project_roots {
        if !root.exists() {
            issues.push(Issue::portfolio(format!(
                "Project root does not exist: {}",
                root.display()
            )));
        }
    }

    if let Some(ws) = &config.openclaw_workspace
        && let Ok(ws) = ws.canonicalize()
    {
        for root in &config.project_roots {
            let Ok(resolved) = root.canonicalize() else {
                continue;
            };
            if resolved == ws {
                issues.push(Issue::portfolio(format!(
                    "Project root overlaps with OpenClaw workspace: {}",
                    root.display()
                )));
            } else if resolved.starts_with(&ws) {
                issues.push(Issue::portfolio(format!(
                    "Project root is inside OpenClaw workspace: {}",
                    root.display()
                )));
            }
        }
    }

    let log = config.work_log_path();
    if !log.exists() {
        issues.push(Issue::portfolio(format!(
            "Work log does not exist: {}",
            log.display()
        )));
    }

    issues
}

/// Project-level problems: missing settings or task root, dangling repo path.
pub fn check_project(project: &ProjectSettings) -> Vec<Issue> {
    let mut issues = Vec::new();
    if project.settings_path().is_none_or(|p| !p.is_file()) {
        issues.push(Issue::project(
            IssueLevel::Error,
            &project.id,
            "Missing settings.toml".into(),
        ));
    }
    if project.tasks_dir().is_none_or(|p| !p.is_dir()) {
        issues.push(Issue::project(
            IssueLevel::Warning,
            &project.id,
            "Missing tasks directory".into(),
        ));
    }
    if let Some(repo) = &project.repo_path
        && !repo.exists()
    {
        issues.push(Issue::project(
            IssueLevel::Warning,
            &project.id,
            format!("repo_path does not exist: {}", repo.display()),
        ));
    }
    issues
}

/// Create `.project/` in `repo` and return the new project's settings.
///
/// The id defaults to the kebab-cased directory name, the name to the
/// directory name.
pub fn init_project(
    repo: &Path,
    id: Option<&str>,
    name: Option<&str>,
) -> Result<ProjectSettings> {
    let repo = repo
        .canonicalize()
        .with_context(|| format!("resolving {}", repo.display()))?;
    let meta = repo.join(PROJECT_DIR);
    if meta.exists() {
        return Err(PmError::already_exists(&format!(
            "project at {} (repo: {})",
            meta.display(),
            repo.display()
        ))
        .into());
    }

    let dir_name = repo
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let id = match id {
        Some(id) => id.to_string(),
        None => dir_name.to_kebab_case(),
    };
    if id.is_empty() {
        return Err(PmError::missing_field("id").into());
    }
    let name = name.map(str::to_string).unwrap_or(dir_name);

    let tasks = meta.join(TASKS_DIR);
    for dir in [
        tasks.join(DONE_DIR),
        tasks.join(BLOCKED_DIR),
        meta.join(crate::research::RESEARCH_DIR),
        meta.join("notes"),
    ] {
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let settings = toml::to_string(&NewSettings {
        id: &id,
        name: &name,
        status: ProjectStatus::Active,
        priority: DEFAULT_PRIORITY,
        repo_path: repo.to_string_lossy().to_string(),
        labels: Vec::new(),
    })?;
    fs::write(meta.join(SETTINGS_FILE), settings)?;
    fs::write(meta.join("SPEC.md"), spec_template(&name))?;
    fs::write(meta.join("learnings.md"), format!("# {} Learnings\n\n", name))?;

    debug!(project = %id, repo = %repo.display(), "Initialized project");
    ProjectSettings::load(&meta.join(SETTINGS_FILE))
}

fn spec_template(name: &str) -> String {
    format!(
        "# {name}\n\n## Overview\n\n(Describe the project here)\n\n## Goals\n\n- Goal 1\n- Goal 2\n\n## Non-Goals\n\n- Non-goal 1\n\n## Technical Notes\n\n...\n"
    )
}

/// Rewrite the `status` key of a project's settings, keeping every other key.
pub fn set_project_status(project: &ProjectSettings, status: ProjectStatus) -> Result<ProjectSettings> {
    let path = project
        .settings_path()
        .ok_or_else(|| PmError::project_not_found(&project.id))?;
    let content =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let mut table: toml::Table =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    table.insert("status".into(), toml::Value::String(status.as_str().into()));
    fs::write(&path, toml::to_string(&table)?)
        .with_context(|| format!("writing {}", path.display()))?;
    debug!(project = %project.id, status = %status, "Updated project status");
    ProjectSettings::load(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn portfolio(root: &Path, roots: Vec<PathBuf>) -> PortfolioConfig {
        PortfolioConfig {
            portfolio_root: root.to_path_buf(),
            project_roots: roots,
            default_status: ProjectStatus::Active,
            openclaw_workspace: None,
        }
    }

    fn write_settings(repo: &Path, body: &str) {
        let meta = repo.join(PROJECT_DIR);
        fs::create_dir_all(&meta).unwrap();
        fs::write(meta.join(SETTINGS_FILE), body).unwrap();
    }

    #[test]
    fn discovery_sorts_and_skips_malformed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repos");
        write_settings(&root.join("b"), "id = \"b\"\nname = \"Beta\"\npriority = 1\n");
        write_settings(&root.join("a"), "id = \"a\"\nname = \"Alpha\"\npriority = 3\n");
        write_settings(&root.join("broken"), "name = \"no id\"\n");
        fs::create_dir_all(root.join("plain")).unwrap();

        let config = portfolio(dir.path(), vec![root, dir.path().join("missing")]);
        let ids: Vec<_> = discover_projects(&config, None)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn discovery_skips_workspace_root() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path().join("ws");
        write_settings(&ws.join("agent"), "id = \"agent\"\n");
        let mut config = portfolio(dir.path(), vec![ws.clone()]);
        config.openclaw_workspace = Some(ws);
        assert!(discover_projects(&config, None).unwrap().is_empty());
    }

    #[test]
    fn get_project_falls_back_to_scan() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repos");
        write_settings(&root.join("checkout"), "id = \"real-id\"\n");
        let config = portfolio(dir.path(), vec![root]);

        let project = get_project(&config, "real-id").unwrap().unwrap();
        assert!(project.project_dir.unwrap().ends_with("checkout"));
        assert!(get_project(&config, "nope").unwrap().is_none());
    }

    #[test]
    fn init_creates_layout_with_kebab_id() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("My_Repo");
        fs::create_dir_all(&repo).unwrap();

        let project = init_project(&repo, None, None).unwrap();
        assert_eq!(project.id, "my-repo");
        assert_eq!(project.name, "My_Repo");
        let meta = repo.join(PROJECT_DIR);
        assert!(meta.join("tasks/done").is_dir());
        assert!(meta.join("tasks/blocked").is_dir());
        assert!(meta.join("SPEC.md").is_file());

        let err = PmError::from(init_project(&repo, None, None).unwrap_err());
        assert_eq!(err.code, crate::error::ErrorCode::AlreadyExists);
    }

    #[test]
    fn status_change_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("proj");
        write_settings(&repo, "id = \"proj\"\nlabels = [\"x\"]\ncustom = 1\n");
        let project = ProjectSettings::load(&repo.join(PROJECT_DIR).join(SETTINGS_FILE)).unwrap();

        let paused = set_project_status(&project, ProjectStatus::Paused).unwrap();
        assert_eq!(paused.status, ProjectStatus::Paused);
        assert_eq!(paused.labels, vec!["x"]);
        let raw = fs::read_to_string(repo.join(PROJECT_DIR).join(SETTINGS_FILE)).unwrap();
        assert!(raw.contains("custom = 1"));
    }

    #[test]
    fn validate_reports_missing_pieces() {
        let dir = TempDir::new().unwrap();
        let config = portfolio(dir.path(), vec![dir.path().join("gone")]);
        let issues = validate_portfolio(&config);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.level == IssueLevel::Error));
    }
}
