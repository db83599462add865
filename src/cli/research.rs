//! Research note subcommands.

use super::App;
use crate::format::format_research_text;
use crate::research::{NewResearch, ResearchStatus, ResearchStore, ResearchType, SessionLink};
use anyhow::Result;
use clap::Subcommand;
use std::io::Write;

/// `research` subcommands
#[derive(Subcommand, Debug)]
pub enum ResearchCommand {
    /// List research notes, newest first
    List {
        #[arg(short, long, value_enum)]
        status: Option<ResearchStatus>,

        /// Only notes carrying every one of these tags
        #[arg(short, long = "tags")]
        tags: Vec<String>,
    },

    /// Add a research note
    Add {
        #[arg(short = 't', long = "type", value_enum)]
        kind: ResearchType,

        #[arg(long)]
        title: String,

        /// Note id (derived from the title when omitted)
        #[arg(long = "id")]
        research_id: Option<String>,

        /// Tags (repeatable or comma-separated)
        #[arg(long)]
        tags: Vec<String>,

        /// The question being researched
        #[arg(short, long)]
        question: Option<String>,
    },

    /// Record the agent session working on a note
    Link {
        #[arg(long = "id")]
        research_id: String,

        #[arg(short, long)]
        session_key: String,

        #[arg(short, long)]
        run_id: Option<String>,

        /// Session that spawned the worker
        #[arg(long)]
        spawned_by: Option<String>,
    },
}

/// `a,b` and `c` -> `[a, b, c]`, blanks dropped.
fn split_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .flat_map(|t| t.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn run<W: Write>(app: &App, command: ResearchCommand, out: &mut W) -> Result<()> {
    let portfolio = app.portfolio()?;
    let (project, _) = app.require_project(&portfolio)?;
    let store = ResearchStore::for_project(&project)?;

    match command {
        ResearchCommand::List { status, tags } => {
            let items = store.list(status, &split_tags(&tags))?;
            app.emit(out, &items, || format_research_text(&items))
        }
        ResearchCommand::Add {
            kind,
            title,
            research_id,
            tags,
            question,
        } => {
            let item = store.add(&NewResearch {
                title,
                kind,
                id: research_id,
                tags: split_tags(&tags),
                question: question.unwrap_or_default(),
            })?;
            app.success(
                out,
                &format!("Research {} created", item.id),
                Some(serde_json::to_value(&item)?),
            )
        }
        ResearchCommand::Link {
            research_id,
            session_key,
            run_id,
            spawned_by,
        } => {
            let item = store.link(
                &research_id,
                &SessionLink {
                    child_session_key: session_key,
                    spawned_at: None,
                    run_id,
                    spawned_by,
                },
            )?;
            app.success(
                out,
                &format!("Research {} linked to session", item.id),
                Some(serde_json::to_value(&item)?),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_split_on_commas() {
        let tags = vec!["db, perf".to_string(), "".to_string(), "ui".to_string()];
        assert_eq!(split_tags(&tags), vec!["db", "perf", "ui"]);
    }
}
