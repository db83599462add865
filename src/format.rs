//! Output formatting for JSON and plain text.

use crate::config::{Issue, ProjectSettings};
use crate::error::PmError;
use crate::research::Research;
use crate::types::{Task, TaskState};
use crate::worklog::WorkLogEntry;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

/// Pretty JSON, falling back to `null` for values that cannot serialize.
pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// `{"status": "ok", "message": ..., "data": ...}`
pub fn success_json(message: &str, data: Option<Value>) -> Value {
    let mut out = json!({ "status": "ok", "message": message });
    if let Some(data) = data {
        out["data"] = data;
    }
    out
}

/// `{"error": CODE, "message": ...}` plus blocking ids when present.
pub fn error_json(err: &PmError) -> Value {
    let mut out = json!({ "error": err.code, "message": err.message });
    if let Some(field) = &err.field {
        out["field"] = json!(field);
    }
    if !err.blocking.is_empty() {
        out["details"] = json!({ "blocking": err.blocking });
    }
    out
}

/// Single-line plain-text error.
pub fn error_text(err: &PmError) -> String {
    let mut out = format!("Error: {}", err.message);
    for id in &err.blocking {
        out.push_str(&format!("\n  blocking: {}", id));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

/// `CLAWP-001 [open] P2 [m] Title`
pub fn format_task_line(task: &Task) -> String {
    let complexity = task
        .complexity
        .map(|c| format!(" [{}]", c.as_str()))
        .unwrap_or_default();
    let parent_marker = if task.parent.is_some() { " ↳" } else { "" };
    format!(
        "{}{} [{}] P{}{} {}",
        task.id,
        parent_marker,
        task.state,
        task.priority,
        complexity,
        truncate(&task.title, 45)
    )
}

/// Task list, children nested under their parents unless `flat`.
pub fn format_tasks_text(tasks: &[Task], flat: bool) -> String {
    if tasks.is_empty() {
        return "No tasks found".to_string();
    }
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut lines = Vec::new();
    for task in tasks {
        let nested = !flat
            && task
                .parent
                .as_deref()
                .is_some_and(|p| by_id.contains_key(p));
        if nested {
            continue;
        }
        lines.push(format_task_line(task));
        if !flat {
            for child in task.children.iter().filter_map(|c| by_id.get(c.as_str())) {
                lines.push(format!("  └─ {}", format_task_line(child)));
            }
        }
    }
    lines.join("\n")
}

/// Full task: header, content, dependencies and file.
pub fn format_task_detail(task: &Task) -> String {
    let mut out = format!(
        "{} - {}\n{} | Priority: {}\n",
        task.id, task.title, task.state, task.priority
    );
    out.push_str(&"-".repeat(40));
    out.push('\n');
    if task.content.is_empty() {
        out.push_str("No content\n");
    } else {
        out.push_str(&task.content);
        out.push('\n');
    }
    if !task.depends.is_empty() {
        out.push_str(&format!("Depends on: {}\n", task.depends.join(", ")));
    }
    if !task.children.is_empty() {
        out.push_str(&format!("Subtasks: {}\n", task.children.join(", ")));
    }
    out.push_str(&format!("File: {}", task.file_path().display()));
    out
}

/// Per-project counts of open, progress and blocked tasks.
pub type TaskCounts = HashMap<TaskState, usize>;

/// Project table with an activity summary column.
pub fn format_projects_text(
    projects: &[ProjectSettings],
    counts: &HashMap<String, TaskCounts>,
) -> String {
    if projects.is_empty() {
        return "No projects found".to_string();
    }
    let mut lines = vec![format!(
        "{:<20} {:<24} {:<9} {:>2}  {}",
        "ID", "NAME", "STATUS", "P", "TASKS"
    )];
    for project in projects {
        let summary = counts
            .get(&project.id)
            .map(summarize_counts)
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{:<20} {:<24} {:<9} {:>2}  {}",
            truncate(&project.id, 20),
            truncate(&project.name, 24),
            project.status,
            project.priority,
            summary
        ));
    }
    lines.join("\n")
}

fn summarize_counts(counts: &TaskCounts) -> String {
    let mut parts = Vec::new();
    for (state, label) in [
        (TaskState::Progress, "active"),
        (TaskState::Blocked, "blocked"),
        (TaskState::Open, "open"),
    ] {
        if let Some(n) = counts.get(&state).filter(|n| **n > 0) {
            parts.push(format!("{} {}", n, label));
        }
    }
    if parts.is_empty() {
        "idle".to_string()
    } else {
        parts.join(", ")
    }
}

/// Work log entries, one block per entry.
pub fn format_worklog_text(entries: &[WorkLogEntry]) -> String {
    if entries.is_empty() {
        return "No log entries found".to_string();
    }
    entries
        .iter()
        .map(format_worklog_entry)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn format_worklog_entry(entry: &WorkLogEntry) -> String {
    let mut out = format!("{} [{}]", entry.ts.format("%Y-%m-%d %H:%M"), entry.project);
    if let Some(task) = &entry.task {
        out.push_str(&format!(" {}", task));
    }
    out.push_str(&format!(" {}", entry.action));
    if let Some(summary) = &entry.summary {
        out.push_str(&format!("\n  {}", summary));
    }
    if let Some(next) = &entry.next {
        out.push_str(&format!("\n  Next: {}", next));
    }
    out
}

/// `ID [status] type Title (tags)`, one note per line.
pub fn format_research_text(items: &[Research]) -> String {
    if items.is_empty() {
        return "No research items found".to_string();
    }
    items
        .iter()
        .map(|r| {
            let tags = if r.tags.is_empty() {
                "-".to_string()
            } else {
                r.tags.join(", ")
            };
            format!(
                "{} [{}] {} {} ({})",
                r.id,
                r.status,
                r.kind,
                truncate(&r.title, 40),
                tags
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Doctor findings.
pub fn format_issues_text(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "✓ No issues found".to_string();
    }
    issues
        .iter()
        .map(|issue| {
            let level = serde_json::to_value(issue.level)
                .ok()
                .and_then(|v| v.as_str().map(str::to_uppercase))
                .unwrap_or_default();
            let scope = issue.project.as_deref().unwrap_or(&issue.scope);
            format!("[{}] [{}] {}", level, scope, issue.message)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::{Complexity, TaskStorage};
    use std::path::PathBuf;

    fn task(id: &str, parent: Option<&str>, children: &[&str]) -> Task {
        Task {
            id: id.into(),
            title: format!("Title {}", id),
            state: TaskState::Open,
            priority: 2,
            complexity: Some(Complexity::M),
            depends: vec![],
            parent: parent.map(str::to_string),
            children: children.iter().map(|c| c.to_string()).collect(),
            created: None,
            content: String::new(),
            storage: TaskStorage::Flat {
                path: PathBuf::from(format!("/t/{}.md", id)),
            },
        }
    }

    #[test]
    fn task_line_shows_state_priority_and_complexity() {
        let line = format_task_line(&task("T-001", None, &[]));
        assert_eq!(line, "T-001 [open] P2 [m] Title T-001");
    }

    #[test]
    fn children_nest_under_parent() {
        let tasks = vec![
            task("T-001", None, &["T-001-001"]),
            task("T-001-001", Some("T-001"), &[]),
        ];
        let text = format_tasks_text(&tasks, false);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("  └─ T-001-001 ↳"));

        let flat = format_tasks_text(&tasks, true);
        assert!(!flat.contains("└─"));
    }

    #[test]
    fn error_json_carries_code_and_blocking() {
        let err = PmError::incomplete_children("T-001", &["T-001-001".into()]);
        let value = error_json(&err);
        assert_eq!(value["error"], "INCOMPLETE_CHILDREN");
        assert_eq!(value["details"]["blocking"][0], "T-001-001");

        let value = error_json(&PmError::new(ErrorCode::NoProject, "none"));
        assert!(value.get("details").is_none());
    }

    #[test]
    fn counts_summary_orders_active_first() {
        let mut counts = TaskCounts::new();
        counts.insert(TaskState::Open, 3);
        counts.insert(TaskState::Progress, 1);
        assert_eq!(summarize_counts(&counts), "1 active, 3 open");
        assert_eq!(summarize_counts(&TaskCounts::new()), "idle");
    }
}
