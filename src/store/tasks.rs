//! Task lookup, creation, splitting and in-place edits.

use super::codec::{self, RecordDraft, Scaffold};
use super::ids::validate_id;
use super::scan::read_record;
use super::{TaskGraph, TaskStore, today};
use crate::error::PmError;
use crate::paths::{CONTAINER_FILE, RecordKind, RecordLocation, record_file_name};
use crate::types::{DEFAULT_PRIORITY, NewTask, Task, TaskEdit, TaskState};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

impl TaskStore {
    // =========================================================================
    // Queries
    // =========================================================================

    /// All tasks, sorted by `(priority, id)`, optionally restricted to one
    /// state. Children are reconciled over the whole project before the
    /// filter applies.
    pub fn list(&self, state: Option<TaskState>) -> Result<Vec<Task>> {
        let tasks = self.scan()?.into_tasks();
        Ok(match state {
            Some(state) => tasks.into_iter().filter(|t| t.state == state).collect(),
            None => tasks,
        })
    }

    /// Tasks whose state is in `states`.
    pub fn list_states(&self, states: &[TaskState]) -> Result<Vec<Task>> {
        let tasks = self.scan()?.into_tasks();
        Ok(tasks
            .into_iter()
            .filter(|t| states.contains(&t.state))
            .collect())
    }

    /// Resolve one id through the fixed candidate path list.
    ///
    /// The first candidate that exists and decodes wins. Children are
    /// populated by the same reconciliation `list` uses.
    pub fn get(&self, id: &str) -> Result<Option<Task>> {
        if validate_id(id).is_err() || !self.candidates_exist(id) {
            return Ok(None);
        }
        let graph = self.scan()?;
        Ok(self.resolve_in(&graph, id))
    }

    fn candidates_exist(&self, id: &str) -> bool {
        self.layout().candidates(id).iter().any(|p| p.is_file())
    }

    /// [`get`](Self::get) against a graph that was already scanned.
    pub(crate) fn resolve_in(&self, graph: &TaskGraph, id: &str) -> Option<Task> {
        if validate_id(id).is_err() {
            return None;
        }
        for path in self.layout().candidates(id) {
            if !path.is_file() {
                continue;
            }
            if let Some(task) = graph.find_by_path(&path) {
                return Some(task.clone());
            }
            // Not picked up by the scan (e.g. a container whose directory is
            // itself nested oddly); decode it directly.
            if let Ok(task) = read_record(&RecordLocation::infer(&path)) {
                return Some(task);
            }
        }
        None
    }

    /// Like [`get`](Self::get), but a missing task is a `TASK_NOT_FOUND` error.
    pub fn require(&self, id: &str) -> Result<Task> {
        self.get(id)?
            .ok_or_else(|| PmError::task_not_found(id).into())
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Write a new flat OPEN task, allocating an id when none is given.
    pub fn add(&self, new: &NewTask) -> Result<Task> {
        if new.title.trim().is_empty() {
            return Err(PmError::missing_field("title").into());
        }
        if let Some(id) = &new.id {
            validate_id(id)?;
        }
        fs::create_dir_all(self.root())
            .with_context(|| format!("creating {}", self.root().display()))?;

        let id = match &new.id {
            Some(id) => id.clone(),
            None => self.next_task_id()?,
        };
        if self.get(&id)?.is_some() {
            return Err(PmError::already_exists(&format!("task {}", id)).into());
        }

        let created = today();
        let raw = codec::encode(&RecordDraft {
            id: &id,
            title: new.title.trim(),
            priority: new.priority.unwrap_or(DEFAULT_PRIORITY),
            complexity: new.complexity,
            depends: &new.depends,
            parent: None,
            created: &created,
            description: &new.description,
            scaffold: Scaffold::Task,
        })?;

        let path = self.root().join(record_file_name(&id));
        fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
        debug!(project = %self.project_id(), task = %id, "Added task");
        self.load_at(&path)
    }

    /// Turn `X.md` into `X/_task.md` in the same folder. A task that is
    /// already a directory comes back unchanged.
    ///
    /// Subtasks still inside their parent's directory cannot be split:
    /// task directories only nest one level deep.
    pub fn split(&self, id: &str) -> Result<Task> {
        let task = self.require(id)?;
        if task.storage.is_directory() {
            return Ok(task);
        }

        let current = task.file_path();
        if RecordLocation::infer(&current).kind == RecordKind::Subtask {
            let reason = format!(
                "{} is a subtask of {}; subtasks cannot have subtasks",
                task.id,
                task.parent.as_deref().unwrap_or("another task")
            );
            return Err(PmError::invalid_value("parent", &reason).into());
        }
        let holder = current
            .parent()
            .ok_or_else(|| PmError::internal(format!("{} has no parent", current.display())))?;
        let task_dir = holder.join(&task.id);
        fs::create_dir_all(&task_dir)
            .with_context(|| format!("creating {}", task_dir.display()))?;
        let container = task_dir.join(CONTAINER_FILE);
        if container.exists() {
            return Err(PmError::already_exists(&container.display().to_string()).into());
        }
        fs::rename(&current, &container).with_context(|| {
            format!("moving {} to {}", current.display(), container.display())
        })?;
        debug!(task = %task.id, dir = %task_dir.display(), "Split task into directory");
        self.load_at(&container)
    }

    /// Add a subtask under `parent_id`, splitting the parent first if it is
    /// still a flat file.
    pub fn add_subtask(&self, parent_id: &str, new: &NewTask) -> Result<Task> {
        if new.title.trim().is_empty() {
            return Err(PmError::missing_field("title").into());
        }
        if let Some(id) = &new.id {
            validate_id(id)?;
        }
        let parent = self.split(parent_id)?;
        let parent_dir = parent
            .record_dir()
            .ok_or_else(|| PmError::internal("parent task has no directory"))?;

        let id = match &new.id {
            Some(id) => id.clone(),
            None => self.next_subtask_id(&parent.id, &parent_dir)?,
        };
        if self.get(&id)?.is_some() {
            return Err(PmError::already_exists(&format!("task {}", id)).into());
        }

        let created = today();
        let raw = codec::encode(&RecordDraft {
            id: &id,
            title: new.title.trim(),
            priority: new.priority.unwrap_or(DEFAULT_PRIORITY),
            complexity: new.complexity,
            depends: &new.depends,
            parent: Some(&parent.id),
            created: &created,
            description: &new.description,
            scaffold: Scaffold::Subtask,
        })?;

        let path = parent_dir.join(record_file_name(&id));
        fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
        debug!(parent = %parent.id, task = %id, "Added subtask");
        self.load_at(&path)
    }

    // =========================================================================
    // In-place edits
    // =========================================================================

    /// Rewrite title, priority, complexity or description without moving
    /// the record.
    pub fn edit(&self, id: &str, edit: &TaskEdit) -> Result<Task> {
        if edit.is_empty() {
            return Err(PmError::no_changes().into());
        }
        let task = self.require(id)?;
        let path = task.file_path();
        let raw = read_raw(&path)?;
        let updated = codec::rewrite(&raw, edit)?;
        fs::write(&path, updated).with_context(|| format!("writing {}", path.display()))?;
        debug!(task = %task.id, "Edited task");
        self.load_at(&path)
    }

    /// Append a timestamped response line to a task. Returns the timestamp
    /// written.
    pub fn respond(&self, id: &str, response: &str) -> Result<String> {
        if response.trim().is_empty() {
            return Err(PmError::missing_field("response").into());
        }
        let task = self.require(id)?;
        let path = task.file_path();
        let raw = read_raw(&path)?;
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();
        let line = format!("- {} [Web UI]: {}", timestamp, response.trim());
        fs::write(&path, codec::append_response(&raw, &line))
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(timestamp)
    }
}

fn read_raw(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    fn store() -> (TempDir, TaskStore) {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new("clawpm", dir.path().join("tasks"));
        (dir, store)
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn add_creates_root_and_allocates_from_zero() {
        let (_dir, store) = store();
        let first = store.add(&new_task("First")).unwrap();
        let second = store.add(&new_task("Second")).unwrap();
        assert_eq!(first.id, "CLAWP-000");
        assert_eq!(second.id, "CLAWP-001");
        assert_eq!(first.state, TaskState::Open);
        assert_eq!(first.priority, DEFAULT_PRIORITY);
        assert!(first.created.is_some());
    }

    #[test]
    fn add_rejects_duplicate_explicit_id() {
        let (_dir, store) = store();
        let mut task = new_task("One");
        task.id = Some("CLAWP-010".into());
        store.add(&task).unwrap();
        let err = PmError::from(store.add(&task).unwrap_err());
        assert_eq!(err.code, ErrorCode::AlreadyExists);
    }

    #[test]
    fn add_rejects_ids_that_leave_the_task_root() {
        let (dir, store) = store();
        for id in ["../escaped", "nested/id", ".."] {
            let mut task = new_task("Escape");
            task.id = Some(id.into());
            let err = PmError::from(store.add(&task).unwrap_err());
            assert_eq!(err.code, ErrorCode::InvalidFieldValue);
        }
        assert!(!dir.path().join("escaped.md").exists());
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn add_requires_title() {
        let (_dir, store) = store();
        let err = PmError::from(store.add(&new_task("  ")).unwrap_err());
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
    }

    #[test]
    fn get_unknown_is_none() {
        let (_dir, store) = store();
        assert!(store.get("CLAWP-404").unwrap().is_none());
        let err = PmError::from(store.require("CLAWP-404").unwrap_err());
        assert_eq!(err.code, ErrorCode::TaskNotFound);
    }

    #[test]
    fn split_is_idempotent() {
        let (_dir, store) = store();
        store.add(&new_task("Parent")).unwrap();
        let split = store.split("CLAWP-000").unwrap();
        assert!(split.storage.is_directory());
        assert!(store.root().join("CLAWP-000").join(CONTAINER_FILE).is_file());
        let again = store.split("CLAWP-000").unwrap();
        assert_eq!(again.file_path(), split.file_path());
    }

    #[test]
    fn subtasks_are_numbered_from_one_and_linked() {
        let (_dir, store) = store();
        store.add(&new_task("Parent")).unwrap();
        let a = store.add_subtask("CLAWP-000", &new_task("A")).unwrap();
        let b = store.add_subtask("CLAWP-000", &new_task("B")).unwrap();
        assert_eq!(a.id, "CLAWP-000-001");
        assert_eq!(b.id, "CLAWP-000-002");
        assert_eq!(a.parent.as_deref(), Some("CLAWP-000"));

        let parent = store.require("CLAWP-000").unwrap();
        assert_eq!(parent.children, vec!["CLAWP-000-001", "CLAWP-000-002"]);
        assert!(parent.is_parent());
    }

    #[test]
    fn edit_rewrites_in_place() {
        let (_dir, store) = store();
        let task = store.add(&new_task("Old title")).unwrap();
        let edited = store
            .edit(
                &task.id,
                &TaskEdit {
                    title: Some("New title".into()),
                    priority: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(edited.title, "New title");
        assert_eq!(edited.priority, 1);
        assert_eq!(edited.file_path(), task.file_path());
    }

    #[test]
    fn edit_without_changes_fails() {
        let (_dir, store) = store();
        let task = store.add(&new_task("Task")).unwrap();
        let err = PmError::from(store.edit(&task.id, &TaskEdit::default()).unwrap_err());
        assert_eq!(err.code, ErrorCode::NoChanges);
    }

    #[test]
    fn respond_appends_line() {
        let (_dir, store) = store();
        let task = store.add(&new_task("Question")).unwrap();
        store.respond(&task.id, "Use option B").unwrap();
        let raw = fs::read_to_string(task.file_path()).unwrap();
        assert!(raw.contains("## Responses"));
        let line = raw.lines().last().unwrap();
        assert!(line.starts_with("- "), "{line}");
        assert!(line.ends_with(" [Web UI]: Use option B"), "{line}");
    }
}
