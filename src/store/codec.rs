//! Record codec: markdown files with a YAML frontmatter header.
//!
//! A record looks like
//!
//! ```text
//! ---
//! id: CLAWP-001
//! priority: 2
//! depends: [CLAWP-000]
//! ---
//! # Title
//!
//! Body...
//! ```
//!
//! State is never read from the header; [`state_from_location`] derives it
//! from where the file sits.

use crate::paths::{PROGRESS_MARKER, RecordKind, RecordLocation, id_from_file_name};
use crate::paths::{BLOCKED_DIR, DONE_DIR};
use crate::types::{
    Complexity, DEFAULT_PRIORITY, Priority, Task, TaskEdit, TaskState, TaskStorage,
};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

const FENCE: &str = "---";

/// Header fields read from a record.
#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    id: Option<String>,
    priority: Option<Priority>,
    complexity: Option<String>,
    depends: Option<Vec<String>>,
    parent: Option<String>,
    created: Option<serde_yaml::Value>,
}

/// Header fields written for a new record.
#[derive(Debug, Serialize)]
struct NewFrontmatter<'a> {
    id: &'a str,
    priority: Priority,
    created: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    complexity: Option<&'static str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    depends: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'a str>,
}

/// Section scaffold appended below the description of a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaffold {
    /// Acceptance criteria plus notes.
    Task,
    /// Notes only.
    Subtask,
}

/// Everything needed to write a fresh record.
#[derive(Debug, Clone)]
pub struct RecordDraft<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub priority: Priority,
    pub complexity: Option<Complexity>,
    pub depends: &'a [String],
    pub parent: Option<&'a str>,
    pub created: &'a str,
    pub description: &'a str,
    pub scaffold: Scaffold,
}

/// Derive a task's state from its location.
///
/// `done` holder → Done, `blocked` holder → Blocked, progress marker in the
/// filename → Progress, anything else → Open.
pub fn state_from_location(location: &RecordLocation) -> TaskState {
    let holder = location.holder_name();
    if holder == DONE_DIR {
        TaskState::Done
    } else if holder == BLOCKED_DIR {
        TaskState::Blocked
    } else if location.file_name().contains(PROGRESS_MARKER) {
        TaskState::Progress
    } else {
        TaskState::Open
    }
}

/// Split raw text into (header, body).
///
/// `Ok(None)` means the text has no header at all; an opening fence without
/// a closing one is an error.
pub fn split_frontmatter(raw: &str) -> Result<Option<(&str, &str)>> {
    let Some(after_open) = raw.strip_prefix(FENCE) else {
        return Ok(None);
    };
    let close = after_open
        .find("\n---")
        .ok_or_else(|| anyhow!("unterminated frontmatter"))?;
    let header = &after_open[..close];
    let rest = &after_open[close + 4..];
    // Drop the remainder of the closing fence line.
    let body = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().is_empty() => &rest[nl + 1..],
        None if rest.trim().is_empty() => "",
        _ => rest,
    };
    Ok(Some((header, body)))
}

fn parse_header(header: &str) -> Result<Frontmatter> {
    if header.trim().is_empty() {
        return Ok(Frontmatter::default());
    }
    let value: serde_yaml::Value = serde_yaml::from_str(header)?;
    match value {
        serde_yaml::Value::Null => Ok(Frontmatter::default()),
        serde_yaml::Value::Mapping(_) => Ok(serde_yaml::from_value(value)?),
        _ => Err(anyhow!("frontmatter is not a mapping")),
    }
}

/// First level-1 heading of a body.
pub fn extract_title(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
}

fn created_to_string(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Null => None,
        other => serde_yaml::to_string(&other)
            .ok()
            .map(|s| s.trim().to_string()),
    }
}

/// Decode a record. Errors mean "skip this record".
pub fn decode(raw: &str, location: &RecordLocation) -> Result<Task> {
    let (frontmatter, content) = match split_frontmatter(raw)? {
        Some((header, body)) => (parse_header(header)?, body.trim().to_string()),
        None => (Frontmatter::default(), raw.trim().to_string()),
    };

    let storage = match location.kind {
        RecordKind::Container => {
            let dir = location.file.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            TaskStorage::Directory {
                dir,
                subtasks: Vec::new(),
            }
        }
        RecordKind::Flat | RecordKind::Subtask => TaskStorage::Flat {
            path: location.file.clone(),
        },
    };

    let fallback_id = match (&location.kind, &storage) {
        (RecordKind::Container, TaskStorage::Directory { dir, .. }) => dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        _ => id_from_file_name(&location.file_name()),
    };
    let id = frontmatter.id.unwrap_or(fallback_id);
    if id.trim().is_empty() {
        return Err(anyhow!("record has no id"));
    }

    let title = extract_title(&content).unwrap_or_else(|| id.clone());

    Ok(Task {
        title,
        state: state_from_location(location),
        priority: frontmatter.priority.unwrap_or(DEFAULT_PRIORITY),
        complexity: frontmatter.complexity.as_deref().and_then(Complexity::parse),
        depends: frontmatter.depends.unwrap_or_default(),
        parent: frontmatter.parent,
        children: Vec::new(),
        created: frontmatter.created.and_then(created_to_string),
        content,
        storage,
        id,
    })
}

/// Encode a fresh record with its section scaffold.
pub fn encode(draft: &RecordDraft<'_>) -> Result<String> {
    let header = NewFrontmatter {
        id: draft.id,
        priority: draft.priority,
        created: draft.created,
        complexity: draft.complexity.map(|c| c.as_str()),
        depends: draft.depends,
        parent: draft.parent,
    };
    let yaml = serde_yaml::to_string(&header)?;

    let mut out = format!("{FENCE}\n{}{FENCE}\n# {}\n\n", yaml, draft.title);
    if !draft.description.trim().is_empty() {
        out.push_str(draft.description.trim_end());
        out.push_str("\n\n");
    }
    if draft.scaffold == Scaffold::Task {
        out.push_str("## Acceptance Criteria\n\n- [ ] (Add criteria here)\n\n");
    }
    out.push_str("## Notes\n\n");
    Ok(out)
}

/// Apply metadata and content edits to a record's raw text.
pub fn rewrite(raw: &str, edit: &TaskEdit) -> Result<String> {
    let (mut mapping, content) = match split_frontmatter(raw)? {
        Some((header, body)) => {
            let mapping = if header.trim().is_empty() {
                serde_yaml::Mapping::new()
            } else {
                match serde_yaml::from_str::<serde_yaml::Value>(header)? {
                    serde_yaml::Value::Mapping(m) => m,
                    serde_yaml::Value::Null => serde_yaml::Mapping::new(),
                    _ => return Err(anyhow!("frontmatter is not a mapping")),
                }
            };
            (mapping, body.trim().to_string())
        }
        None => (serde_yaml::Mapping::new(), raw.trim().to_string()),
    };

    if let Some(priority) = edit.priority {
        mapping.insert("priority".into(), priority.into());
    }
    if let Some(complexity) = edit.complexity {
        mapping.insert("complexity".into(), complexity.as_str().into());
    }

    let content = rewrite_body(&content, edit.title.as_deref(), edit.body.as_deref());
    let yaml = serde_yaml::to_string(&mapping)?;
    Ok(format!("{FENCE}\n{}{FENCE}\n{}\n", yaml, content.trim_end()))
}

/// Replace the title heading and/or the description (text between the
/// title and the first `## ` section).
fn rewrite_body(content: &str, title: Option<&str>, body: Option<&str>) -> String {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let title_idx = match lines.iter().position(|l| l.starts_with("# ")) {
        Some(idx) => idx,
        None => {
            let heading = title.map(|t| format!("# {}", t));
            match heading {
                Some(h) => {
                    lines.insert(0, h);
                    lines.insert(1, String::new());
                    0
                }
                None if body.is_some() => {
                    // No heading: the description runs from the top.
                    let end = lines
                        .iter()
                        .position(|l| l.starts_with("## "))
                        .unwrap_or(lines.len());
                    let mut replaced = vec![body.unwrap_or_default().trim().to_string(), String::new()];
                    replaced.extend(lines.drain(end..));
                    return replaced.join("\n");
                }
                None => return content.to_string(),
            }
        }
    };

    if let Some(title) = title {
        lines[title_idx] = format!("# {}", title);
    }

    if let Some(body) = body {
        let start = title_idx + 1;
        let end = lines[start..]
            .iter()
            .position(|l| l.starts_with("## "))
            .map(|offset| start + offset)
            .unwrap_or(lines.len());
        let mut replacement = vec![String::new(), body.trim().to_string(), String::new()];
        if end == lines.len() {
            replacement.pop();
        }
        lines.splice(start..end, replacement);
    }

    lines.join("\n")
}

/// Append a timestamped line under a `## Responses` section.
pub fn append_response(raw: &str, line: &str) -> String {
    let mut out = raw.to_string();
    if !out.contains("## Responses") {
        out = format!("{}\n\n## Responses\n", out.trim_end());
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
    out
}
