//! Configuration types: the portfolio file and per-project settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::types::{DEFAULT_PRIORITY, Priority};

/// Name of the portfolio config file.
pub const PORTFOLIO_FILE: &str = "portfolio.toml";
/// Name of the shared work log inside the portfolio root.
pub const WORK_LOG_FILE: &str = "work_log.jsonl";
/// Per-repository metadata directory.
pub const PROJECT_DIR: &str = ".project";
/// Project settings file inside [`PROJECT_DIR`].
pub const SETTINGS_FILE: &str = "settings.toml";
/// Task root inside [`PROJECT_DIR`].
pub const TASKS_DIR: &str = "tasks";

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

/// Lifecycle status of a project.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Paused,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ProjectStatus::Active),
            "paused" => Ok(ProjectStatus::Paused),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(format!("unknown project status '{}'", other)),
        }
    }
}

// =============================================================================
// portfolio.toml
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct PortfolioFile {
    portfolio_root: Option<PathBuf>,
    #[serde(default)]
    project_roots: Vec<PathBuf>,
    #[serde(default)]
    defaults: PortfolioDefaults,
    #[serde(default)]
    openclaw: OpenclawSection,
}

#[derive(Debug, Default, Deserialize)]
struct PortfolioDefaults {
    #[serde(default)]
    status: ProjectStatus,
}

#[derive(Debug, Default, Deserialize)]
struct OpenclawSection {
    workspace: Option<PathBuf>,
}

/// Loaded portfolio configuration.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioConfig {
    /// Directory holding `portfolio.toml` and the work log.
    pub portfolio_root: PathBuf,
    /// Directories whose immediate subdirectories are project repositories.
    pub project_roots: Vec<PathBuf>,
    pub default_status: ProjectStatus,
    /// Agent workspace that must never be treated as a project root.
    pub openclaw_workspace: Option<PathBuf>,
}

impl PortfolioConfig {
    /// Load from a `portfolio.toml` file. `portfolio_root` defaults to the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: PortfolioFile =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

        let portfolio_root = match file.portfolio_root {
            Some(root) => expand_tilde(root),
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };

        Ok(Self {
            portfolio_root,
            project_roots: file.project_roots.into_iter().map(expand_tilde).collect(),
            default_status: file.defaults.status,
            openclaw_workspace: file.openclaw.workspace.map(expand_tilde),
        })
    }

    pub fn work_log_path(&self) -> PathBuf {
        self.portfolio_root.join(WORK_LOG_FILE)
    }
}

// =============================================================================
// .project/settings.toml
// =============================================================================

#[derive(Debug, Deserialize)]
struct SettingsFile {
    id: String,
    name: Option<String>,
    #[serde(default)]
    status: ProjectStatus,
    priority: Option<Priority>,
    repo_path: Option<PathBuf>,
    #[serde(default)]
    labels: Vec<String>,
}

/// Settings written by `project init`.
#[derive(Debug, Serialize)]
pub(crate) struct NewSettings<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub repo_path: String,
    pub labels: Vec<String>,
}

/// A project's settings plus the repository it was loaded from.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectSettings {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub repo_path: Option<PathBuf>,
    pub labels: Vec<String>,
    /// Repository directory (parent of `.project/`).
    pub project_dir: Option<PathBuf>,
}

impl ProjectSettings {
    /// Load from `<repo>/.project/settings.toml`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: SettingsFile =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

        Ok(Self {
            name: file.name.unwrap_or_else(|| file.id.clone()),
            id: file.id,
            status: file.status,
            priority: file.priority.unwrap_or(DEFAULT_PRIORITY),
            repo_path: file.repo_path.map(expand_tilde),
            labels: file.labels,
            project_dir: path
                .parent()
                .and_then(Path::parent)
                .map(Path::to_path_buf),
        })
    }

    /// `<repo>/.project`
    pub fn meta_dir(&self) -> Option<PathBuf> {
        self.project_dir.as_ref().map(|d| d.join(PROJECT_DIR))
    }

    /// `<repo>/.project/settings.toml`
    pub fn settings_path(&self) -> Option<PathBuf> {
        self.meta_dir().map(|d| d.join(SETTINGS_FILE))
    }

    /// `<repo>/.project/tasks`
    pub fn tasks_dir(&self) -> Option<PathBuf> {
        self.meta_dir().map(|d| d.join(TASKS_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn portfolio_root_defaults_to_file_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PORTFOLIO_FILE);
        fs::write(&path, "project_roots = [\"/srv/repos\"]\n").unwrap();

        let config = PortfolioConfig::load(&path).unwrap();
        assert_eq!(config.portfolio_root, dir.path());
        assert_eq!(config.project_roots, vec![PathBuf::from("/srv/repos")]);
        assert_eq!(config.default_status, ProjectStatus::Active);
        assert_eq!(config.work_log_path(), dir.path().join(WORK_LOG_FILE));
    }

    #[test]
    fn portfolio_reads_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PORTFOLIO_FILE);
        fs::write(
            &path,
            "portfolio_root = \"/srv/pm\"\n\n[defaults]\nstatus = \"paused\"\n\n[openclaw]\nworkspace = \"/srv/ws\"\n",
        )
        .unwrap();

        let config = PortfolioConfig::load(&path).unwrap();
        assert_eq!(config.portfolio_root, PathBuf::from("/srv/pm"));
        assert_eq!(config.default_status, ProjectStatus::Paused);
        assert_eq!(config.openclaw_workspace, Some(PathBuf::from("/srv/ws")));
    }

    #[test]
    fn settings_fill_defaults() {
        let dir = TempDir::new().unwrap();
        let meta = dir.path().join("repo").join(PROJECT_DIR);
        fs::create_dir_all(&meta).unwrap();
        let path = meta.join(SETTINGS_FILE);
        fs::write(&path, "id = \"demo\"\n").unwrap();

        let settings = ProjectSettings::load(&path).unwrap();
        assert_eq!(settings.name, "demo");
        assert_eq!(settings.priority, DEFAULT_PRIORITY);
        assert_eq!(settings.status, ProjectStatus::Active);
        assert_eq!(settings.tasks_dir(), Some(meta.join(TASKS_DIR)));
    }

    #[test]
    fn settings_without_id_fail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "name = \"nameless\"\n").unwrap();
        assert!(ProjectSettings::load(&path).is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/clawpm"), home.join("clawpm"));
        }
        assert_eq!(expand_tilde("/abs"), PathBuf::from("/abs"));
    }
}
