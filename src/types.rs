//! Core types for the task tracker.

use crate::paths::CONTAINER_FILE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Task priority as an integer (lower = more urgent).
pub type Priority = i32;

/// Priority assigned when a record does not specify one.
pub const DEFAULT_PRIORITY: Priority = 5;

/// Lifecycle state of a task. Never stored in a record; derived from where
/// the record lives.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Open,
    Progress,
    Done,
    Blocked,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Open => "open",
            TaskState::Progress => "progress",
            TaskState::Done => "done",
            TaskState::Blocked => "blocked",
        }
    }

    /// States a worker can pick up.
    pub fn is_actionable(&self) -> bool {
        matches!(self, TaskState::Open | TaskState::Progress)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(TaskState::Open),
            "progress" => Ok(TaskState::Progress),
            "done" => Ok(TaskState::Done),
            "blocked" => Ok(TaskState::Blocked),
            other => Err(format!(
                "unknown state '{}' (expected open, progress, done or blocked)",
                other
            )),
        }
    }
}

/// Rough size estimate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    S,
    M,
    L,
    Xl,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::S => "s",
            Complexity::M => "m",
            Complexity::L => "l",
            Complexity::Xl => "xl",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "s" => Some(Complexity::S),
            "m" => Some(Complexity::M),
            "l" => Some(Complexity::L),
            "xl" => Some(Complexity::Xl),
            _ => None,
        }
    }
}

/// How a task is laid out on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStorage {
    /// A single record file.
    Flat { path: PathBuf },
    /// A directory named after the task holding `_task.md` plus subtask files.
    Directory { dir: PathBuf, subtasks: Vec<PathBuf> },
}

impl TaskStorage {
    /// The file holding this task's own record.
    pub fn record_path(&self) -> PathBuf {
        match self {
            TaskStorage::Flat { path } => path.clone(),
            TaskStorage::Directory { dir, .. } => dir.join(CONTAINER_FILE),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, TaskStorage::Directory { .. })
    }
}

/// A task materialized from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub state: TaskState,
    pub priority: Priority,
    pub complexity: Option<Complexity>,
    pub depends: Vec<String>,
    pub parent: Option<String>,
    /// Computed on every scan, never persisted.
    pub children: Vec<String>,
    pub created: Option<String>,
    pub content: String,
    pub storage: TaskStorage,
}

impl Task {
    pub fn file_path(&self) -> PathBuf {
        self.storage.record_path()
    }

    /// True if this task has subtasks or is stored as a directory.
    pub fn is_parent(&self) -> bool {
        !self.children.is_empty() || self.storage.is_directory()
    }

    /// Directory holding the record file.
    pub fn record_dir(&self) -> Option<PathBuf> {
        self.file_path().parent().map(Path::to_path_buf)
    }

    /// The shape handed to every consumer (CLI output, HTTP API).
    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            title: self.title.clone(),
            state: self.state,
            priority: self.priority,
            complexity: self.complexity,
            depends: self.depends.clone(),
            parent: self.parent.clone(),
            children: self.children.clone(),
            is_parent: self.is_parent(),
            created: self.created.clone(),
            file_path: self.file_path().to_string_lossy().to_string(),
        }
    }
}

/// Serializable task summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskView {
    pub id: String,
    pub title: String,
    pub state: TaskState,
    pub priority: Priority,
    pub complexity: Option<Complexity>,
    pub depends: Vec<String>,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub is_parent: bool,
    pub created: Option<String>,
    pub file_path: String,
}

/// Fields for a new task or subtask record.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    /// Explicit id; allocated when absent.
    pub id: Option<String>,
    pub priority: Option<Priority>,
    pub complexity: Option<Complexity>,
    pub depends: Vec<String>,
    pub description: String,
}

/// Metadata and content edits applied in place.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub complexity: Option<Complexity>,
    pub body: Option<String>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.priority.is_none()
            && self.complexity.is_none()
            && self.body.is_none()
    }
}
