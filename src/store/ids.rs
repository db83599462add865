//! Task id prefixes, allocation and shorthand expansion.

use super::TaskStore;
use crate::error::PmError;
use crate::paths::{CONTAINER_FILE, id_from_file_name, is_record_file};
use anyhow::{Context, Result};
use regex_lite::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Maximum length of a project prefix.
pub const PREFIX_LEN: usize = 5;

static FULL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+-\d+(-\d+)?$").expect("valid regex"));
static SUBTASK_SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)$").expect("valid regex"));
static NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static SAFE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*$").expect("valid regex"));

/// `clawpm` -> `CLAWP`, `my_web-app` -> `MYWEB`.
pub fn project_prefix(project_id: &str) -> String {
    project_id
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_uppercase)
        .take(PREFIX_LEN)
        .collect()
}

/// `PREFIX-NNN`, zero-padded to at least three digits.
pub fn format_id(prefix: &str, n: u32) -> String {
    format!("{}-{:03}", prefix, n)
}

/// Expand a user reference into a full task id.
///
/// - `CLAWP-7`, `clawp-001-002`: upper-cased, otherwise unchanged
/// - `1-2`: `PREFIX-001-002`
/// - `7`: `PREFIX-007`
///
/// Anything else comes back verbatim.
pub fn expand(reference: &str, project_id: &str) -> String {
    let reference = reference.trim();
    if FULL_ID.is_match(reference) {
        return reference.to_uppercase();
    }
    let prefix = project_prefix(project_id);
    if let Some(caps) = SUBTASK_SHORTHAND.captures(reference) {
        let (Ok(parent), Ok(child)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            return reference.to_string();
        };
        return format!("{}-{:03}", format_id(&prefix, parent), child);
    }
    if NUMERIC.is_match(reference)
        && let Ok(n) = reference.parse::<u32>()
    {
        return format_id(&prefix, n);
    }
    reference.to_string()
}

/// Reject ids that cannot be used as a single file name component.
///
/// Ids are letters, digits and `-`, starting with a letter or digit.
pub fn validate_id(id: &str) -> Result<()> {
    if SAFE_ID.is_match(id) {
        Ok(())
    } else {
        let reason = format!("{:?} may only contain letters, digits and '-'", id);
        Err(PmError::invalid_value("id", &reason).into())
    }
}

/// `max + 1`, or 0 when nothing was found yet.
fn successor(max: Option<u32>, stem: &str) -> Result<u32> {
    match max {
        None => Ok(0),
        Some(n) => n.checked_add(1).ok_or_else(|| {
            PmError::invalid_value("id", &format!("no ids left after {}-{}", stem, n)).into()
        }),
    }
}

/// Highest `N` among ids `{stem}-N` found as entry names in `dir`.
///
/// Both record files and task directories count, so a task that was split
/// into a directory keeps its number reserved.
fn max_suffix_in(dir: &Path, pattern: &Regex) -> Result<Option<u32>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut max = None;
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let candidate = if path.is_dir() {
            if !path.join(CONTAINER_FILE).is_file() {
                continue;
            }
            name
        } else if is_record_file(&path) {
            id_from_file_name(&name)
        } else {
            continue;
        };
        if let Some(n) = pattern
            .captures(&candidate)
            .and_then(|caps| caps[1].parse::<u32>().ok())
        {
            max = max.max(Some(n));
        }
    }
    Ok(max)
}

fn suffix_pattern(stem: &str) -> Result<Regex> {
    Regex::new(&format!(r"^{}-(\d+)$", regex_lite::escape(stem)))
        .with_context(|| format!("building id pattern for {}", stem))
}

impl TaskStore {
    /// Next free top-level id. Top-level numbering starts at 000.
    pub fn next_task_id(&self) -> Result<String> {
        let prefix = self.prefix();
        let pattern = suffix_pattern(&prefix)?;
        let mut max: Option<u32> = None;
        for root in self.layout().state_roots() {
            max = max.max(max_suffix_in(&root, &pattern)?);
        }
        let next = successor(max, &prefix)?;
        Ok(format_id(&prefix, next))
    }

    /// Next free subtask id under `parent_id`. Subtask numbering starts at 001.
    ///
    /// Looks inside the parent's directory and in the three state roots, where
    /// subtasks that left the parent directory end up.
    pub fn next_subtask_id(&self, parent_id: &str, parent_dir: &Path) -> Result<String> {
        let pattern = suffix_pattern(parent_id)?;
        let mut max = max_suffix_in(parent_dir, &pattern)?;
        for root in self.layout().state_roots() {
            max = max.max(max_suffix_in(&root, &pattern)?);
        }
        let next = successor(Some(max.unwrap_or(0)), parent_id)?;
        Ok(format!("{}-{:03}", parent_id, next))
    }
}
