//! Which project a command applies to.
//!
//! Resolution order: explicit argument, the global `--project` flag, the
//! nearest `.project/settings.toml` above the working directory, then the
//! id saved by `clawpm use`.

use super::types::{PROJECT_DIR, ProjectSettings, SETTINGS_FILE};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Where a resolved project id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectSource {
    Explicit,
    Global,
    Cwd,
    Context,
}

impl ProjectSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectSource::Explicit => "explicit",
            ProjectSource::Global => "global",
            ProjectSource::Cwd => "cwd",
            ProjectSource::Context => "context",
        }
    }
}

/// Walk up from `dir` to the first directory with `.project/settings.toml`.
pub fn detect_project_from(dir: &Path) -> Option<ProjectSettings> {
    for candidate in dir.ancestors() {
        let settings = candidate.join(PROJECT_DIR).join(SETTINGS_FILE);
        if settings.is_file() {
            match ProjectSettings::load(&settings) {
                Ok(project) => return Some(project),
                Err(e) => debug!(path = %settings.display(), error = %e, "Unreadable settings while walking up"),
            }
        }
    }
    None
}

/// Project id saved in the context file, if any.
pub fn read_context(file: &Path) -> Option<String> {
    let content = fs::read_to_string(file).ok()?;
    let id = content.trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Save (`Some`) or clear (`None`) the context project.
pub fn write_context(file: &Path, project_id: Option<&str>) -> Result<()> {
    match project_id {
        Some(id) => {
            fs::write(file, id).with_context(|| format!("writing {}", file.display()))?;
        }
        None => {
            if file.exists() {
                fs::remove_file(file).with_context(|| format!("removing {}", file.display()))?;
            }
        }
    }
    Ok(())
}

/// Resolve the project id for a command.
pub fn resolve_project(
    explicit: Option<&str>,
    global: Option<&str>,
    cwd: &Path,
    context_file: Option<&Path>,
) -> Option<(String, ProjectSource)> {
    if let Some(id) = explicit.filter(|s| !s.is_empty()) {
        return Some((id.to_string(), ProjectSource::Explicit));
    }
    if let Some(id) = global.filter(|s| !s.is_empty()) {
        return Some((id.to_string(), ProjectSource::Global));
    }
    if let Some(project) = detect_project_from(cwd) {
        return Some((project.id, ProjectSource::Cwd));
    }
    context_file
        .and_then(read_context)
        .map(|id| (id, ProjectSource::Context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_settings(repo: &Path, id: &str) {
        let meta = repo.join(PROJECT_DIR);
        fs::create_dir_all(&meta).unwrap();
        fs::write(meta.join(SETTINGS_FILE), format!("id = \"{}\"\n", id)).unwrap();
    }

    #[test]
    fn explicit_beats_everything() {
        let dir = TempDir::new().unwrap();
        write_settings(dir.path(), "from-cwd");
        let resolved = resolve_project(Some("mine"), Some("global"), dir.path(), None);
        assert_eq!(resolved, Some(("mine".into(), ProjectSource::Explicit)));
        let resolved = resolve_project(None, Some("global"), dir.path(), None);
        assert_eq!(resolved, Some(("global".into(), ProjectSource::Global)));
    }

    #[test]
    fn cwd_walks_up_to_settings() {
        let dir = TempDir::new().unwrap();
        write_settings(dir.path(), "walked");
        let nested = dir.path().join("src/deep");
        fs::create_dir_all(&nested).unwrap();
        let resolved = resolve_project(None, None, &nested, None);
        assert_eq!(resolved, Some(("walked".into(), ProjectSource::Cwd)));
    }

    #[test]
    fn context_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("ctx");
        let cwd = dir.path().join("elsewhere");
        fs::create_dir_all(&cwd).unwrap();

        assert_eq!(resolve_project(None, None, &cwd, Some(&file)), None);
        write_context(&file, Some("saved")).unwrap();
        assert_eq!(
            resolve_project(None, None, &cwd, Some(&file)),
            Some(("saved".into(), ProjectSource::Context))
        );
        write_context(&file, None).unwrap();
        assert!(!file.exists());
    }
}
