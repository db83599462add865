//! Discovery: scan the task root into an indexed task graph.
//!
//! Both bulk listing and single lookups go through [`TaskGraph`], so the
//! parent/child reconciliation rule lives in exactly one place
//! ([`reconcile`]).

use super::TaskStore;
use super::codec;
use crate::paths::{CONTAINER_FILE, RecordLocation, is_record_file, is_reserved_dir_name};
use crate::types::{Task, TaskStorage};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A record the scan could not decode.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedRecord {
    pub path: PathBuf,
    pub reason: String,
}

/// Diagnostics collected during a scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub skipped: Vec<SkippedRecord>,
}

impl ScanReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    fn skip(&mut self, path: &Path, reason: impl ToString) {
        let reason = reason.to_string();
        warn!(path = %path.display(), reason = %reason, "Skipping unreadable task record");
        self.skipped.push(SkippedRecord {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// All tasks of a project, sorted by `(priority, id)` and indexed by id.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    report: ScanReport,
}

impl TaskGraph {
    /// Build a graph from decoded tasks: reconcile, sort, index.
    pub fn from_tasks(mut tasks: Vec<Task>, report: ScanReport) -> Self {
        reconcile(&mut tasks);
        tasks.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            index.entry(task.id.clone()).or_insert(i);
        }
        Self {
            tasks,
            index,
            report,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn report(&self) -> &ScanReport {
        &self.report
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index_of(id).map(|i| &self.tasks[i])
    }

    /// Task whose record file is `path`.
    pub fn find_by_path(&self, path: &Path) -> Option<&Task> {
        self.tasks.iter().find(|t| t.file_path() == path)
    }
}

/// Link children to parents.
///
/// A task's effective parent is its `parent` field, or, when that is empty,
/// the directory task it physically lives in. The child's `parent` is set to
/// the effective parent and its id is appended (once) to the parent's
/// `children` if the parent was scanned.
pub fn reconcile(tasks: &mut [Task]) {
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut container_of: HashMap<PathBuf, String> = HashMap::new();
    for (i, task) in tasks.iter().enumerate() {
        by_id.entry(task.id.clone()).or_insert(i);
        if let TaskStorage::Directory { subtasks, .. } = &task.storage {
            for sub in subtasks {
                container_of.insert(sub.clone(), task.id.clone());
            }
        }
    }

    let mut links: Vec<(usize, String)> = Vec::new();
    for task in tasks.iter_mut() {
        if task.parent.is_none()
            && let Some(container) = container_of.get(&task.file_path())
            && container != &task.id
        {
            task.parent = Some(container.clone());
        }
        if let Some(parent_id) = &task.parent
            && parent_id != &task.id
            && let Some(&parent_idx) = by_id.get(parent_id)
        {
            links.push((parent_idx, task.id.clone()));
        }
    }

    for task in tasks.iter_mut() {
        task.children.clear();
    }
    for (parent_idx, child_id) in links {
        let children = &mut tasks[parent_idx].children;
        if !children.contains(&child_id) {
            children.push(child_id);
        }
    }
    for task in tasks.iter_mut() {
        task.children.sort();
    }
}

/// Read and decode one record.
pub fn read_record(location: &RecordLocation) -> Result<Task> {
    let raw = fs::read_to_string(&location.file)
        .with_context(|| format!("reading {}", location.file.display()))?;
    codec::decode(&raw, location)
}

/// Sorted entries of a directory; a missing directory has none.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Scan one state root: flat records and task directories.
fn scan_location(location: &Path, tasks: &mut Vec<Task>, report: &mut ScanReport) -> Result<()> {
    for entry in sorted_entries(location)? {
        if entry.is_file() {
            if !is_record_file(&entry) {
                continue;
            }
            match read_record(&RecordLocation::flat(&entry)) {
                Ok(task) => tasks.push(task),
                Err(e) => report.skip(&entry, format!("{:#}", e)),
            }
        } else if entry.is_dir() && !is_reserved_dir_name(&entry_name(&entry)) {
            scan_task_dir(&entry, tasks, report)?;
        }
    }
    Ok(())
}

/// Scan a task directory: its container plus every sibling subtask file.
fn scan_task_dir(dir: &Path, tasks: &mut Vec<Task>, report: &mut ScanReport) -> Result<()> {
    let container = dir.join(CONTAINER_FILE);
    if !container.is_file() {
        debug!(dir = %dir.display(), "Ignoring directory without a container record");
        return Ok(());
    }

    let mut subtasks = Vec::new();
    for entry in sorted_entries(dir)? {
        if !entry.is_file() || !is_record_file(&entry) || entry_name(&entry) == CONTAINER_FILE {
            continue;
        }
        match read_record(&RecordLocation::subtask(dir, &entry)) {
            Ok(task) => {
                subtasks.push(entry.clone());
                tasks.push(task);
            }
            Err(e) => report.skip(&entry, format!("{:#}", e)),
        }
    }

    match read_record(&RecordLocation::container(dir)) {
        Ok(mut parent) => {
            if let TaskStorage::Directory { subtasks: slots, .. } = &mut parent.storage {
                *slots = subtasks;
            }
            tasks.push(parent);
        }
        Err(e) => report.skip(&container, format!("{:#}", e)),
    }
    Ok(())
}

impl TaskStore {
    /// Scan the open, done and blocked roots into a reconciled graph.
    pub fn scan(&self) -> Result<TaskGraph> {
        let mut tasks = Vec::new();
        let mut report = ScanReport::default();
        for location in self.layout().state_roots() {
            scan_location(&location, &mut tasks, &mut report)?;
        }
        debug!(
            project = %self.project_id(),
            tasks = tasks.len(),
            skipped = report.skipped_count(),
            "Scanned task root"
        );
        Ok(TaskGraph::from_tasks(tasks, report))
    }

    /// Load the task stored at `record_path`, with children reconciled
    /// against a fresh scan.
    pub(crate) fn load_at(&self, record_path: &Path) -> Result<Task> {
        let graph = self.scan()?;
        if let Some(task) = graph.find_by_path(record_path) {
            return Ok(task.clone());
        }
        read_record(&RecordLocation::infer(record_path))
    }
}
