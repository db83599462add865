//! Research notes: markdown files with a YAML header under
//! `.project/research/`.
//!
//! ```text
//! ---
//! id: clawpm-research-cache-eviction
//! type: spike
//! status: open
//! created: 2025-01-01
//! tags: [perf]
//! ---
//! # Cache eviction
//!
//! ## Question
//! ...
//! ```
//!
//! Files are named `{created}_{slug}.md`; the id lives in the header.

use crate::config::ProjectSettings;
use crate::error::PmError;
use crate::store::codec::{extract_title, split_frontmatter};
use crate::store::ids::validate_id;
use crate::store::today;
use anyhow::{Context, Result, anyhow};
use heck::ToKebabCase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Folder under `.project/` holding research notes.
pub const RESEARCH_DIR: &str = "research";

/// Longest slug derived from a title.
const SLUG_LEN: usize = 50;

const FENCE: &str = "---";

/// What kind of research a note records.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ResearchType {
    #[default]
    Investigation,
    Spike,
    Decision,
    Reference,
}

impl ResearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchType::Investigation => "investigation",
            ResearchType::Spike => "spike",
            ResearchType::Decision => "decision",
            ResearchType::Reference => "reference",
        }
    }
}

impl fmt::Display for ResearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchStatus {
    #[default]
    Open,
    InProgress,
    Complete,
    Stale,
}

impl ResearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchStatus::Open => "open",
            ResearchStatus::InProgress => "in-progress",
            ResearchStatus::Complete => "complete",
            ResearchStatus::Stale => "stale",
        }
    }
}

impl fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent session a note was handed to, stored under `openclaw:`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLink {
    #[serde(default)]
    pub child_session_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawned_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawned_by: Option<String>,
}

/// A decoded research note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Research {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ResearchType,
    pub status: ResearchStatus,
    pub tags: Vec<String>,
    pub created: Option<String>,
    pub openclaw: Option<SessionLink>,
    pub file_path: PathBuf,
    #[serde(skip)]
    pub content: String,
}

impl Research {
    /// True when the note carries every tag in `tags`.
    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }
}

#[derive(Debug, Default, Deserialize)]
struct Header {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<ResearchType>,
    status: Option<ResearchStatus>,
    tags: Option<Vec<String>>,
    created: Option<serde_yaml::Value>,
    openclaw: Option<SessionLink>,
}

#[derive(Debug, Serialize)]
struct NewHeader<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: ResearchType,
    status: ResearchStatus,
    created: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    tags: &'a [String],
}

/// Input for [`ResearchStore::add`].
#[derive(Debug, Clone, Default)]
pub struct NewResearch {
    pub title: String,
    pub kind: ResearchType,
    /// Explicit id; derived from the title when `None`.
    pub id: Option<String>,
    pub tags: Vec<String>,
    pub question: String,
}

/// Decode a note. Errors mean "skip this file".
pub fn decode(raw: &str, path: &Path) -> Result<Research> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let (header, content) = match split_frontmatter(raw)? {
        Some((header, body)) if !header.trim().is_empty() => {
            (serde_yaml::from_str::<Header>(header)?, body.trim().to_string())
        }
        Some((_, body)) => (Header::default(), body.trim().to_string()),
        None => (Header::default(), raw.trim().to_string()),
    };

    let id = header.id.unwrap_or(stem);
    if id.trim().is_empty() {
        return Err(anyhow!("research note has no id"));
    }
    let created = header.created.and_then(|v| match v {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Null => None,
        other => serde_yaml::to_string(&other).ok().map(|s| s.trim().to_string()),
    });

    Ok(Research {
        title: extract_title(&content).unwrap_or_else(|| id.clone()),
        kind: header.kind.unwrap_or_default(),
        status: header.status.unwrap_or_default(),
        tags: header.tags.unwrap_or_default(),
        created,
        openclaw: header.openclaw,
        file_path: path.to_path_buf(),
        content,
        id,
    })
}

/// `Cache eviction: LRU vs. LFU?` -> `cache-eviction-lru-vs-lfu`, capped at
/// [`SLUG_LEN`] characters.
pub fn slugify(title: &str) -> String {
    let slug: String = title.to_kebab_case().chars().take(SLUG_LEN).collect();
    slug.trim_matches('-').to_string()
}

/// Handle on one project's research folder.
#[derive(Debug, Clone)]
pub struct ResearchStore {
    project_id: String,
    dir: PathBuf,
}

impl ResearchStore {
    /// The folder does not need to exist; a missing folder holds no notes.
    pub fn new(project_id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            project_id: project_id.into(),
            dir: dir.into(),
        }
    }

    pub fn for_project(project: &ProjectSettings) -> Result<Self> {
        let meta = project
            .meta_dir()
            .ok_or_else(|| PmError::project_not_found(&project.id))?;
        Ok(Self::new(project.id.clone(), meta.join(RESEARCH_DIR)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn id_prefix(&self) -> String {
        format!("{}-research-", self.project_id)
    }

    /// Every note that decodes, newest `created` first, then by id
    /// descending.
    fn scan(&self) -> Result<Vec<Research>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut items = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("listing {}", self.dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }
            let decoded = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))
                .and_then(|raw| decode(&raw, &path));
            match decoded {
                Ok(item) => items.push(item),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %format!("{:#}", e),
                    "Skipping unreadable research note"
                ),
            }
        }
        items.sort_by(|a, b| {
            b.created
                .cmp(&a.created)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(items)
    }

    /// Notes matching `status` and carrying every tag in `tags`.
    pub fn list(&self, status: Option<ResearchStatus>, tags: &[String]) -> Result<Vec<Research>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .filter(|r| r.has_tags(tags))
            .collect())
    }

    pub fn get(&self, id: &str) -> Result<Option<Research>> {
        Ok(self.scan()?.into_iter().find(|r| r.id == id))
    }

    pub fn require(&self, id: &str) -> Result<Research> {
        self.get(id)?
            .ok_or_else(|| PmError::research_not_found(id).into())
    }

    /// Write a new OPEN note with the question/summary/findings scaffold.
    pub fn add(&self, new: &NewResearch) -> Result<Research> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(PmError::missing_field("title").into());
        }
        let id = match &new.id {
            Some(id) => {
                validate_id(id)?;
                id.clone()
            }
            None => {
                let slug = slugify(title);
                if slug.is_empty() {
                    let reason = format!("no id can be derived from {:?}; pass one", title);
                    return Err(PmError::invalid_value("id", &reason).into());
                }
                format!("{}{}", self.id_prefix(), slug)
            }
        };
        if self.get(&id)?.is_some() {
            return Err(PmError::already_exists(&format!("research {}", id)).into());
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let created = today();
        let header = serde_yaml::to_string(&NewHeader {
            id: &id,
            kind: new.kind,
            status: ResearchStatus::Open,
            created: &created,
            tags: &new.tags,
        })?;
        let question = match new.question.trim() {
            "" => "(Describe the research question)",
            q => q,
        };
        let raw = format!(
            "{FENCE}\n{header}{FENCE}\n# {title}\n\n## Question\n\n{question}\n\n\
             ## Summary\n\n(To be filled in as research progresses)\n\n\
             ## Findings\n\n...\n\n## Conclusion\n\n...\n"
        );

        let path = self.free_path(&created, &id);
        fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
        debug!(project = %self.project_id, research = %id, "Added research note");
        decode(&fs::read_to_string(&path)?, &path)
    }

    /// `{date}_{slug}.md`, with `_1`, `_2`... appended until unused.
    fn free_path(&self, created: &str, id: &str) -> PathBuf {
        let prefix = self.id_prefix();
        let slug = id.strip_prefix(&prefix).unwrap_or(id);
        let mut path = self.dir.join(format!("{}_{}.md", created, slug));
        let mut counter = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}_{}.md", created, slug, counter));
            counter += 1;
        }
        path
    }

    /// Record the agent session working on a note and mark it in progress.
    /// Other header keys and the body are kept as they are.
    pub fn link(&self, id: &str, link: &SessionLink) -> Result<Research> {
        let item = self.require(id)?;
        let path = &item.file_path;
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let (mut mapping, body) = match split_frontmatter(&raw)? {
            Some((header, body)) if header.trim().is_empty() => {
                (serde_yaml::Mapping::new(), body.to_string())
            }
            Some((header, body)) => {
                let mapping = match serde_yaml::from_str::<serde_yaml::Value>(header)? {
                    serde_yaml::Value::Mapping(m) => m,
                    serde_yaml::Value::Null => serde_yaml::Mapping::new(),
                    _ => return Err(anyhow!("frontmatter is not a mapping")),
                };
                (mapping, body.to_string())
            }
            None => (serde_yaml::Mapping::new(), raw.clone()),
        };
        if !mapping.contains_key("id") {
            mapping.insert("id".into(), item.id.clone().into());
        }

        let mut link = link.clone();
        if link.spawned_at.is_none() {
            link.spawned_at = Some(today());
        }
        mapping.insert("openclaw".into(), serde_yaml::to_value(&link)?);
        mapping.insert("status".into(), ResearchStatus::InProgress.as_str().into());

        let header = serde_yaml::to_string(&mapping)?;
        fs::write(path, format!("{FENCE}\n{header}{FENCE}\n{body}"))
            .with_context(|| format!("writing {}", path.display()))?;
        debug!(research = %item.id, session = %link.child_session_key, "Linked research note");
        decode(&fs::read_to_string(path)?, path)
    }
}
