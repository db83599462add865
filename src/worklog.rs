//! Append-only work log shared by every project in a portfolio.
//!
//! One JSON object per line in `<portfolio>/work_log.jsonl`. Lines that do
//! not parse are skipped on read.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::types::TaskState;

/// Poll interval of [`WorkLog::follow`].
pub const FOLLOW_INTERVAL: Duration = Duration::from_secs(1);

/// Agent name recorded when none is given.
pub const DEFAULT_AGENT: &str = "main";

/// What a work log entry records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum WorkLogAction {
    Start,
    Progress,
    Done,
    Blocked,
    Pause,
    Research,
    Note,
    Commit,
}

impl WorkLogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkLogAction::Start => "start",
            WorkLogAction::Progress => "progress",
            WorkLogAction::Done => "done",
            WorkLogAction::Blocked => "blocked",
            WorkLogAction::Pause => "pause",
            WorkLogAction::Research => "research",
            WorkLogAction::Note => "note",
            WorkLogAction::Commit => "commit",
        }
    }

    /// Entry recorded automatically when a task changes state.
    pub fn for_state(state: TaskState) -> Self {
        match state {
            TaskState::Open => WorkLogAction::Note,
            TaskState::Progress => WorkLogAction::Start,
            TaskState::Done => WorkLogAction::Done,
            TaskState::Blocked => WorkLogAction::Blocked,
        }
    }
}

impl fmt::Display for WorkLogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the work log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkLogEntry {
    #[serde(deserialize_with = "deserialize_ts")]
    pub ts: DateTime<Utc>,
    pub project: String,
    pub task: Option<String>,
    pub action: WorkLogAction,
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub files_changed: Option<Vec<String>>,
    #[serde(default)]
    pub blockers: Option<String>,
}

fn default_agent() -> String {
    DEFAULT_AGENT.to_string()
}

/// RFC 3339, or a naive ISO timestamp (optionally `Z`-suffixed) taken as UTC.
fn deserialize_ts<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

impl WorkLogEntry {
    /// New entry stamped now, attributed to the default agent.
    pub fn new(project: impl Into<String>, action: WorkLogAction) -> Self {
        Self {
            ts: Utc::now(),
            project: project.into(),
            task: None,
            action,
            agent: default_agent(),
            session_key: None,
            summary: None,
            next: None,
            files_changed: None,
            blockers: None,
        }
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn blockers(mut self, blockers: impl Into<String>) -> Self {
        self.blockers = Some(blockers.into());
        self
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    pub fn files_changed(mut self, files: Vec<String>) -> Self {
        self.files_changed = (!files.is_empty()).then_some(files);
        self
    }
}

/// Handle on the work log file.
#[derive(Debug, Clone)]
pub struct WorkLog {
    path: PathBuf,
}

impl WorkLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, creating the file and its directory if needed.
    pub fn append(&self, entry: &WorkLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        writeln!(file, "{}", line)?;
        debug!(project = %entry.project, action = %entry.action, "Appended work log entry");
        Ok(())
    }

    /// Entries newest first, optionally for one project and capped at `limit`.
    pub fn read_entries(&self, project: Option<&str>, limit: Option<usize>) -> Result<Vec<WorkLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let mut entries: Vec<WorkLogEntry> = parse_lines(&content)
            .filter(|e| project.is_none_or(|p| e.project == p))
            .collect();
        // Later lines win ties.
        entries.reverse();
        entries.sort_by(|a, b| b.ts.cmp(&a.ts));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// The `limit` most recent entries, oldest first.
    pub fn tail(&self, project: Option<&str>, limit: usize) -> Result<Vec<WorkLogEntry>> {
        let mut entries = self.read_entries(project, Some(limit))?;
        entries.reverse();
        Ok(entries)
    }

    /// Most recent entry.
    pub fn last(&self, project: Option<&str>) -> Result<Option<WorkLogEntry>> {
        Ok(self.read_entries(project, Some(1))?.into_iter().next())
    }

    /// Current size of the file; 0 when it does not exist.
    pub fn end_position(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Entries appended after byte offset `pos`, plus the new offset.
    ///
    /// Only complete lines are consumed: a trailing line still being written
    /// is left for the next call. A file that shrank is read again from the
    /// start.
    pub fn read_from(&self, pos: u64, project: Option<&str>) -> Result<(Vec<WorkLogEntry>, u64)> {
        let size = self.end_position();
        if size == pos {
            return Ok((Vec::new(), pos));
        }
        let start = if size < pos { 0 } else { pos };
        let mut file = fs::File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok((Vec::new(), start));
        };
        let complete = &buf[..=last_newline];
        let entries = parse_lines(&String::from_utf8_lossy(complete))
            .filter(|e| project.is_none_or(|p| e.project == p))
            .collect();
        Ok((entries, start + complete.len() as u64))
    }

    /// Poll the file every [`FOLLOW_INTERVAL`] and hand each new entry to
    /// `on_entry`. Runs until the future is dropped.
    pub async fn follow<F>(&self, project: Option<&str>, mut on_entry: F) -> Result<()>
    where
        F: FnMut(WorkLogEntry),
    {
        let mut pos = self.end_position();
        loop {
            tokio::time::sleep(FOLLOW_INTERVAL).await;
            if !self.path.exists() {
                continue;
            }
            let (entries, next) = self.read_from(pos, project)?;
            pos = next;
            for entry in entries {
                on_entry(entry);
            }
        }
    }
}

fn parse_lines(content: &str) -> impl Iterator<Item = WorkLogEntry> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| match serde_json::from_str::<WorkLogEntry>(l) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping malformed work log line");
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(project: &str, action: WorkLogAction, hour: u32) -> WorkLogEntry {
        let mut entry = WorkLogEntry::new(project, action);
        entry.ts = Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap();
        entry
    }

    #[test]
    fn read_entries_is_newest_first_and_filtered() {
        let dir = TempDir::new().unwrap();
        let log = WorkLog::new(dir.path().join("work_log.jsonl"));
        log.append(&at("a", WorkLogAction::Start, 1)).unwrap();
        log.append(&at("b", WorkLogAction::Note, 2)).unwrap();
        log.append(&at("a", WorkLogAction::Done, 3)).unwrap();

        let all = log.read_entries(None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, WorkLogAction::Done);

        let a = log.read_entries(Some("a"), Some(1)).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].action, WorkLogAction::Done);

        let tail = log.tail(Some("a"), 10).unwrap();
        assert_eq!(tail[0].action, WorkLogAction::Start);
        assert_eq!(log.last(Some("b")).unwrap().unwrap().project, "b");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("work_log.jsonl");
        fs::write(
            &path,
            "not json\n{\"ts\":\"2025-01-01T10:00:00Z\",\"project\":\"p\",\"action\":\"note\"}\n{\"ts\":\"2025-01-01T11:00:00.5\",\"project\":\"p\",\"action\":\"bogus\"}\n",
        )
        .unwrap();

        let entries = WorkLog::new(&path).read_entries(None, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].agent, DEFAULT_AGENT);
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let json = r#"{"ts":"2025-01-01T10:00:00.123456","project":"p","action":"start"}"#;
        let entry: WorkLogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.ts.timestamp(), 1735725600);
    }

    #[test]
    fn read_from_returns_only_new_entries() {
        let dir = TempDir::new().unwrap();
        let log = WorkLog::new(dir.path().join("work_log.jsonl"));
        log.append(&at("p", WorkLogAction::Start, 1)).unwrap();
        let pos = log.end_position();
        log.append(&at("p", WorkLogAction::Done, 2)).unwrap();

        let (entries, next) = log.read_from(pos, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, WorkLogAction::Done);
        assert_eq!(next, log.end_position());
        assert!(log.read_from(next, None).unwrap().0.is_empty());
    }

    #[test]
    fn read_from_leaves_partial_line_for_next_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("work_log.jsonl");
        let log = WorkLog::new(&path);
        let pos = log.end_position();

        let line = serde_json::to_string(&at("p", WorkLogAction::Note, 4)).unwrap();
        let (head, rest) = line.split_at(line.len() / 2);
        fs::write(&path, head).unwrap();
        let (entries, next) = log.read_from(pos, None).unwrap();
        assert!(entries.is_empty());
        assert_eq!(next, pos);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", rest).unwrap();
        let (entries, next) = log.read_from(next, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, WorkLogAction::Note);
        assert_eq!(next, log.end_position());
    }

    #[test]
    fn state_changes_map_to_actions() {
        assert_eq!(WorkLogAction::for_state(TaskState::Open), WorkLogAction::Note);
        assert_eq!(WorkLogAction::for_state(TaskState::Progress), WorkLogAction::Start);
        assert_eq!(WorkLogAction::for_state(TaskState::Done), WorkLogAction::Done);
        assert_eq!(WorkLogAction::for_state(TaskState::Blocked), WorkLogAction::Blocked);
    }
}
