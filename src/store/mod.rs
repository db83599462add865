//! Filesystem task store.
//!
//! A project's task root is the database: `TaskStore` scans it into a
//! [`TaskGraph`], and every mutation is a file write or a file/directory
//! move followed by a rescan.

pub mod codec;
pub mod ids;
pub mod next;
pub mod scan;
pub mod tasks;
pub mod transitions;

pub use scan::{ScanReport, SkippedRecord, TaskGraph};

use crate::config::ProjectSettings;
use crate::error::PmError;
use crate::paths::TaskLayout;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Handle on one project's task storage.
#[derive(Debug, Clone)]
pub struct TaskStore {
    project_id: String,
    layout: TaskLayout,
}

impl TaskStore {
    /// Open a store on an explicit task root. The root does not need to
    /// exist yet; a missing root reads as zero tasks.
    pub fn new(project_id: impl Into<String>, tasks_root: impl Into<PathBuf>) -> Self {
        Self {
            project_id: project_id.into(),
            layout: TaskLayout::new(tasks_root),
        }
    }

    /// Open the store of a loaded project.
    pub fn for_project(project: &ProjectSettings) -> Result<Self> {
        let root = project
            .tasks_dir()
            .ok_or_else(|| PmError::project_not_found(&project.id))?;
        Ok(Self::new(project.id.clone(), root))
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn layout(&self) -> &TaskLayout {
        &self.layout
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Task id prefix for this project.
    pub fn prefix(&self) -> String {
        ids::project_prefix(&self.project_id)
    }
}

/// Today's date as written into `created`.
pub fn today() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}
