//! Dependency-gated next-task selection.

use super::TaskStore;
use crate::types::{Task, TaskState};
use anyhow::Result;
use std::collections::HashSet;

/// First actionable task whose dependencies are all DONE.
///
/// `tasks` must already be in `(priority, id)` order. A dependency on an id
/// that does not exist counts as unsatisfied.
pub fn select_next(tasks: &[Task]) -> Option<&Task> {
    let done: HashSet<&str> = tasks
        .iter()
        .filter(|t| t.state == TaskState::Done)
        .map(|t| t.id.as_str())
        .collect();

    tasks.iter().find(|task| {
        task.state.is_actionable() && task.depends.iter().all(|dep| done.contains(dep.as_str()))
    })
}

impl TaskStore {
    /// The task to work on next in this project, if any.
    pub fn next_task(&self) -> Result<Option<Task>> {
        let graph = self.scan()?;
        Ok(select_next(graph.tasks()).cloned())
    }
}
