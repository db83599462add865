//! On-disk layout of a project's task storage.
//!
//! ```text
//! tasks/{ID}.md                 open
//! tasks/{ID}.progress.md        progress
//! tasks/done/{ID}.md            done
//! tasks/blocked/{ID}.md         blocked
//! tasks/{ID}/_task.md           directory-based task (under any of the above)
//! tasks/{ID}/{ID}-NNN.md        subtask
//! ```
//!
//! Everything here is path arithmetic; the only filesystem probe is
//! [`RecordLocation::infer`].

use crate::types::TaskState;
use std::path::{Path, PathBuf};

/// Record file of a directory-based task.
pub const CONTAINER_FILE: &str = "_task.md";
/// Folder holding completed tasks.
pub const DONE_DIR: &str = "done";
/// Folder holding blocked tasks.
pub const BLOCKED_DIR: &str = "blocked";
/// Filename token marking an in-progress flat task.
pub const PROGRESS_MARKER: &str = ".progress";
/// Extension of every record file.
pub const RECORD_EXT: &str = "md";

/// What kind of record a file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Flat,
    Container,
    Subtask,
}

/// A record file plus the folder that decides its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    pub file: PathBuf,
    /// Folder holding the task: the file's parent for flat records, the
    /// task directory's parent for containers and subtasks.
    pub holder: PathBuf,
    pub kind: RecordKind,
}

impl RecordLocation {
    pub fn flat(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let holder = parent_or_empty(&file);
        Self {
            file,
            holder,
            kind: RecordKind::Flat,
        }
    }

    pub fn container(task_dir: &Path) -> Self {
        Self {
            file: task_dir.join(CONTAINER_FILE),
            holder: parent_or_empty(task_dir),
            kind: RecordKind::Container,
        }
    }

    pub fn subtask(task_dir: &Path, file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            holder: parent_or_empty(task_dir),
            kind: RecordKind::Subtask,
        }
    }

    /// Classify an existing file by looking at its name and its siblings.
    pub fn infer(file: &Path) -> Self {
        let dir = parent_or_empty(file);
        if file_name(file) == CONTAINER_FILE {
            Self::container(&dir)
        } else if dir.join(CONTAINER_FILE).is_file() {
            Self::subtask(&dir, file)
        } else {
            Self::flat(file)
        }
    }

    /// Name of the record file.
    pub fn file_name(&self) -> String {
        file_name(&self.file)
    }

    /// Name of the folder deciding state.
    pub fn holder_name(&self) -> String {
        file_name(&self.holder)
    }
}

/// Path calculator for one project's task root.
#[derive(Debug, Clone)]
pub struct TaskLayout {
    root: PathBuf,
}

impl TaskLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn done_dir(&self) -> PathBuf {
        self.root.join(DONE_DIR)
    }

    pub fn blocked_dir(&self) -> PathBuf {
        self.root.join(BLOCKED_DIR)
    }

    /// The three scan roots: open/progress, done, blocked.
    pub fn state_roots(&self) -> [PathBuf; 3] {
        [self.root.clone(), self.done_dir(), self.blocked_dir()]
    }

    /// Folder that holds tasks of the given state.
    pub fn state_dir(&self, state: TaskState) -> PathBuf {
        match state {
            TaskState::Open | TaskState::Progress => self.root.clone(),
            TaskState::Done => self.done_dir(),
            TaskState::Blocked => self.blocked_dir(),
        }
    }

    /// Canonical location of a flat record in the given state.
    pub fn flat_target(&self, id: &str, state: TaskState) -> PathBuf {
        match state {
            TaskState::Progress => self.root.join(progress_file_name(id)),
            other => self.state_dir(other).join(record_file_name(id)),
        }
    }

    /// Canonical location of a task directory in the given state.
    ///
    /// Returns `None` for progress: directory tasks have no progress folder
    /// and stay where they are.
    pub fn directory_target(&self, id: &str, state: TaskState) -> Option<PathBuf> {
        match state {
            TaskState::Progress => None,
            other => Some(self.state_dir(other).join(id)),
        }
    }

    /// Every path a task with this id may live at, in lookup order.
    pub fn candidates(&self, id: &str) -> Vec<PathBuf> {
        let mut paths = vec![
            self.root.join(record_file_name(id)),
            self.root.join(progress_file_name(id)),
            self.done_dir().join(record_file_name(id)),
            self.blocked_dir().join(record_file_name(id)),
            self.root.join(id).join(CONTAINER_FILE),
            self.done_dir().join(id).join(CONTAINER_FILE),
            self.blocked_dir().join(id).join(CONTAINER_FILE),
        ];

        if let Some(parent_id) = subtask_parent(id) {
            paths.extend([
                self.root.join(parent_id).join(record_file_name(id)),
                self.root.join(parent_id).join(progress_file_name(id)),
                self.done_dir().join(parent_id).join(record_file_name(id)),
                self.blocked_dir().join(parent_id).join(record_file_name(id)),
            ]);
        }

        paths
    }
}

/// `{id}.md`
pub fn record_file_name(id: &str) -> String {
    format!("{}.{}", id, RECORD_EXT)
}

/// `{id}.progress.md`
pub fn progress_file_name(id: &str) -> String {
    format!("{}{}.{}", id, PROGRESS_MARKER, RECORD_EXT)
}

/// Id implied by a record filename: stem without the progress marker.
pub fn id_from_file_name(name: &str) -> String {
    let stem = name
        .strip_suffix(&format!(".{}", RECORD_EXT))
        .unwrap_or(name);
    stem.replace(PROGRESS_MARKER, "")
}

/// Parent id of a subtask-shaped id (`PARENT-NNN`).
pub fn subtask_parent(id: &str) -> Option<&str> {
    let (parent, suffix) = id.rsplit_once('-')?;
    if !parent.is_empty() && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
        Some(parent)
    } else {
        None
    }
}

/// True for `*.md` files.
pub fn is_record_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == RECORD_EXT)
}

/// True for `done`/`blocked` folders and hidden entries, which are never
/// task directories.
pub fn is_reserved_dir_name(name: &str) -> bool {
    name.starts_with('.') || name == DONE_DIR || name == BLOCKED_DIR
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn parent_or_empty(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_targets_follow_state() {
        let layout = TaskLayout::new("/p/tasks");
        assert_eq!(
            layout.flat_target("T-001", TaskState::Open),
            PathBuf::from("/p/tasks/T-001.md")
        );
        assert_eq!(
            layout.flat_target("T-001", TaskState::Progress),
            PathBuf::from("/p/tasks/T-001.progress.md")
        );
        assert_eq!(
            layout.flat_target("T-001", TaskState::Done),
            PathBuf::from("/p/tasks/done/T-001.md")
        );
        assert_eq!(
            layout.flat_target("T-001", TaskState::Blocked),
            PathBuf::from("/p/tasks/blocked/T-001.md")
        );
    }

    #[test]
    fn directory_has_no_progress_target() {
        let layout = TaskLayout::new("/p/tasks");
        assert_eq!(layout.directory_target("T-001", TaskState::Progress), None);
        assert_eq!(
            layout.directory_target("T-001", TaskState::Done),
            Some(PathBuf::from("/p/tasks/done/T-001"))
        );
    }

    #[test]
    fn candidates_include_parent_dirs_for_subtask_ids() {
        let layout = TaskLayout::new("/p/tasks");
        let candidates = layout.candidates("T-001-002");
        assert_eq!(candidates.len(), 11);
        assert!(candidates.contains(&PathBuf::from("/p/tasks/done/T-001/T-001-002.md")));
    }

    #[test]
    fn subtask_parent_requires_numeric_suffix() {
        assert_eq!(subtask_parent("CLAWP-000-001"), Some("CLAWP-000"));
        assert_eq!(subtask_parent("CLAWP-TEST-001"), Some("CLAWP-TEST"));
        assert_eq!(subtask_parent("CLAWP-TEST"), None);
        assert_eq!(subtask_parent("plain"), None);
    }

    #[test]
    fn id_from_file_name_strips_marker() {
        assert_eq!(id_from_file_name("T-001.progress.md"), "T-001");
        assert_eq!(id_from_file_name("T-001.md"), "T-001");
    }

    #[test]
    fn container_location_is_held_by_grandparent() {
        let loc = RecordLocation::container(Path::new("/p/tasks/done/T-001"));
        assert_eq!(loc.holder_name(), "done");
        assert_eq!(loc.file_name(), "_task.md");
        assert_eq!(loc.kind, RecordKind::Container);
    }
}
