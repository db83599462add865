//! State transitions as file and directory moves.
//!
//! All four states are reachable from any other. The only guard is the
//! completion gate: a task with children cannot become DONE while any child
//! is not DONE, unless forced.

use super::TaskStore;
use super::codec::state_from_location;
use super::scan::read_record;
use crate::error::PmError;
use crate::paths::{
    CONTAINER_FILE, RecordKind, RecordLocation, progress_file_name, record_file_name,
};
use crate::types::{Task, TaskState, TaskStorage};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

impl TaskStore {
    /// Move a task to `new_state` and return it reloaded from its new home.
    ///
    /// Errors with `TASK_NOT_FOUND` for unknown ids and `INCOMPLETE_CHILDREN`
    /// when the completion gate refuses; neither touches the filesystem.
    /// Moving to the state the task is already stored in is a no-op.
    pub fn transition(&self, id: &str, new_state: TaskState, force: bool) -> Result<Task> {
        let graph = self.scan()?;
        let task = self
            .resolve_in(&graph, id)
            .ok_or_else(|| PmError::task_not_found(id))?;

        if new_state == TaskState::Done && !force && !task.children.is_empty() {
            let blocking: Vec<String> = task
                .children
                .iter()
                .filter(|child| {
                    graph
                        .get(child)
                        .is_some_and(|c| c.state != TaskState::Done)
                })
                .cloned()
                .collect();
            if !blocking.is_empty() {
                return Err(PmError::incomplete_children(&task.id, &blocking).into());
            }
        }

        let destination = match &task.storage {
            TaskStorage::Directory { dir, .. } => self.move_directory(&task, dir, new_state)?,
            TaskStorage::Flat { path } => self.move_flat(&task, path, new_state)?,
        };

        match destination {
            Some(path) => relocated(&task, &path),
            None => Ok(task),
        }
    }

    /// Move a whole task directory. Returns the new record path, or `None`
    /// when nothing moved.
    fn move_directory(
        &self,
        task: &Task,
        dir: &Path,
        new_state: TaskState,
    ) -> Result<Option<PathBuf>> {
        let Some(target) = self.layout().directory_target(&task.id, new_state) else {
            debug!(task = %task.id, "Directory task stays in place for progress");
            return Ok(None);
        };
        if same_path(dir, &target) {
            return Ok(None);
        }
        ensure_parent(&target)?;
        move_path(dir, &target)?;
        debug!(
            task = %task.id,
            from = %dir.display(),
            to = %target.display(),
            state = %new_state,
            "Moved task directory"
        );
        Ok(Some(target.join(CONTAINER_FILE)))
    }

    /// Move a single record file. Returns the new path, or `None` when
    /// nothing moved.
    fn move_flat(&self, task: &Task, path: &Path, new_state: TaskState) -> Result<Option<PathBuf>> {
        let target = self.flat_destination(task, path, new_state);
        if same_path(path, &target) {
            return Ok(None);
        }
        ensure_parent(&target)?;
        move_path(path, &target)?;
        debug!(
            task = %task.id,
            from = %path.display(),
            to = %target.display(),
            state = %new_state,
            "Moved task record"
        );
        Ok(Some(target))
    }

    /// Where a flat record goes for `new_state`.
    ///
    /// Subtask files stay inside their parent directory when the renamed
    /// file there already reads as `new_state`; everything else goes to the
    /// canonical flat location.
    fn flat_destination(&self, task: &Task, path: &Path, new_state: TaskState) -> PathBuf {
        let location = RecordLocation::infer(path);
        if location.kind == RecordKind::Subtask
            && let Some(task_dir) = path.parent()
        {
            let name = match new_state {
                TaskState::Progress => progress_file_name(&task.id),
                _ => record_file_name(&task.id),
            };
            let in_place = task_dir.join(name);
            if state_from_location(&RecordLocation::subtask(task_dir, &in_place)) == new_state {
                return in_place;
            }
        }
        self.layout().flat_target(&task.id, new_state)
    }
}

/// Re-read a moved record, keeping the links reconciled before the move.
///
/// A move changes where a task lives, never which tasks it is linked to.
fn relocated(before: &Task, record: &Path) -> Result<Task> {
    let mut task = read_record(&RecordLocation::infer(record))?;
    if task.parent.is_none() {
        task.parent = before.parent.clone();
    }
    task.children = before.children.clone();
    if let (
        TaskStorage::Directory { dir, subtasks },
        TaskStorage::Directory {
            subtasks: old_subtasks,
            ..
        },
    ) = (&mut task.storage, &before.storage)
    {
        *subtasks = old_subtasks
            .iter()
            .filter_map(|old| old.file_name().map(|name| dir.join(name)))
            .collect();
    }
    Ok(task)
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn ensure_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Rename `from` to `to`, falling back to copy and remove across devices.
/// An existing `to` is never overwritten.
pub(crate) fn move_path(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        return Err(PmError::already_exists(&to.display().to_string()).into());
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    debug!(from = %from.display(), to = %to.display(), "Rename failed, copying instead");
    if from.is_dir() {
        copy_dir(from, to)?;
        fs::remove_dir_all(from).with_context(|| format!("removing {}", from.display()))?;
    } else {
        fs::copy(from, to)
            .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
        fs::remove_file(from).with_context(|| format!("removing {}", from.display()))?;
    }
    Ok(())
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).with_context(|| format!("creating {}", to.display()))?;
    for entry in fs::read_dir(from).with_context(|| format!("listing {}", from.display()))? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("copying {}", entry.path().display()))?;
        }
    }
    Ok(())
}
