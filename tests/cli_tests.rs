//! Integration tests for CLI command dispatch.
//!
//! Commands are parsed with clap and run against a temp portfolio, with
//! output captured in a buffer instead of stdout.

use clap::Parser;
use clawpm::cli::{self, App, Cli};
use clawpm::config::{ConfigPaths, PORTFOLIO_FILE, init_project};
use clawpm::error::{ErrorCode, PmError};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A portfolio under `<tmp>/portfolio` with project `alpha` in `<tmp>/repos`.
struct Fixture {
    dir: TempDir,
    paths: ConfigPaths,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let portfolio = dir.path().join("portfolio");
        let repos = dir.path().join("repos");
        fs::create_dir_all(&portfolio).unwrap();
        fs::create_dir_all(repos.join("alpha")).unwrap();
        fs::write(
            portfolio.join(PORTFOLIO_FILE),
            format!("project_roots = [{:?}]\n", repos.to_string_lossy()),
        )
        .unwrap();
        init_project(&repos.join("alpha"), None, Some("Alpha")).unwrap();

        let paths = ConfigPaths::with_dirs(Some(portfolio), Some(dir.path().join("context")));
        Self { dir, paths }
    }

    fn repos(&self) -> PathBuf {
        self.dir.path().join("repos")
    }

    /// Run `args` from the temp root and return stdout.
    async fn run(&self, args: &[&str]) -> anyhow::Result<String> {
        let argv = std::iter::once("clawpm").chain(args.iter().copied());
        let cli = Cli::parse_from(argv);
        let app = App::new(
            cli.format,
            cli.project.clone(),
            self.paths.clone(),
            self.dir.path().to_path_buf(),
        );
        let mut out = Vec::new();
        cli::run(&app, cli.command, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    async fn json(&self, args: &[&str]) -> Value {
        let out = self.run(args).await.unwrap();
        serde_json::from_str(&out).unwrap()
    }

    async fn error(&self, args: &[&str]) -> PmError {
        PmError::from(self.run(args).await.unwrap_err())
    }
}

mod task_command_tests {
    use super::*;

    #[tokio::test]
    async fn add_then_list() {
        let fx = Fixture::new();
        let added = fx.json(&["-p", "alpha", "add", "Write docs", "--priority", "2"]).await;
        assert_eq!(added["status"], "ok");
        assert_eq!(added["message"], "Task ALPHA-000 created");
        assert_eq!(added["data"]["priority"], 2);
        assert_eq!(added["data"]["complexity"], "m");

        let listed = fx.json(&["-p", "alpha", "tasks"]).await;
        let tasks = listed.as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["id"], "ALPHA-000");
        assert_eq!(tasks[0]["state"], "open");
    }

    #[tokio::test]
    async fn subtask_via_parent_flag() {
        let fx = Fixture::new();
        fx.run(&["-p", "alpha", "add", "Parent"]).await.unwrap();
        let child = fx
            .json(&["-p", "alpha", "tasks", "add", "-t", "Child", "--parent", "0"])
            .await;
        assert_eq!(child["data"]["id"], "ALPHA-000-001");

        let shown = fx.json(&["-p", "alpha", "tasks", "show", "0"]).await;
        assert_eq!(shown["children"][0], "ALPHA-000-001");
        assert_eq!(shown["is_parent"], true);
    }

    #[tokio::test]
    async fn parent_flag_rejects_subtask_parents() {
        let fx = Fixture::new();
        fx.run(&["-p", "alpha", "add", "Parent"]).await.unwrap();
        fx.run(&["-p", "alpha", "add", "Child", "--parent", "0"])
            .await
            .unwrap();

        let err = fx
            .error(&["-p", "alpha", "add", "Grandchild", "--parent", "0-1"])
            .await;
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);

        let listed = fx.json(&["-p", "alpha", "tasks"]).await;
        assert_eq!(listed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn done_is_gated_on_children() {
        let fx = Fixture::new();
        fx.run(&["-p", "alpha", "add", "Parent"]).await.unwrap();
        fx.run(&["-p", "alpha", "add", "Child", "--parent", "0"])
            .await
            .unwrap();

        let err = fx.error(&["-p", "alpha", "done", "0"]).await;
        assert_eq!(err.code, ErrorCode::IncompleteChildren);
        assert_eq!(err.blocking, vec!["ALPHA-000-001"]);

        let forced = fx.json(&["-p", "alpha", "done", "0", "--force"]).await;
        assert_eq!(forced["data"]["state"], "done");
    }

    #[tokio::test]
    async fn state_changes_are_logged() {
        let fx = Fixture::new();
        fx.run(&["-p", "alpha", "add", "Work"]).await.unwrap();
        fx.run(&["-p", "alpha", "start", "0"]).await.unwrap();
        fx.run(&["-p", "alpha", "block", "0", "-n", "Waiting on review"])
            .await
            .unwrap();

        let last = fx.json(&["-p", "alpha", "log", "last"]).await;
        assert_eq!(last[0]["action"], "blocked");
        assert_eq!(last[0]["task"], "ALPHA-000");
        assert_eq!(last[0]["summary"], "Waiting on review");

        let tail = fx.json(&["-p", "alpha", "log", "tail"]).await;
        assert_eq!(tail.as_array().unwrap().len(), 2);
        assert_eq!(tail[0]["action"], "start");
    }

    #[tokio::test]
    async fn edit_without_fields_is_rejected() {
        let fx = Fixture::new();
        fx.run(&["-p", "alpha", "add", "Work"]).await.unwrap();
        let err = fx.error(&["-p", "alpha", "tasks", "edit", "0"]).await;
        assert_eq!(err.code, ErrorCode::NoChanges);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let fx = Fixture::new();
        let err = fx.error(&["-p", "alpha", "tasks", "show", "42"]).await;
        assert_eq!(err.code, ErrorCode::TaskNotFound);
    }

    #[tokio::test]
    async fn text_output_lists_task_lines() {
        let fx = Fixture::new();
        fx.run(&["-p", "alpha", "add", "Write docs"]).await.unwrap();
        let out = fx
            .run(&["-p", "alpha", "tasks", "list", "--format", "text"])
            .await
            .unwrap();
        assert!(out.contains("ALPHA-000"));
        assert!(out.contains("Write docs"));
    }
}

mod project_command_tests {
    use super::*;

    #[tokio::test]
    async fn task_commands_need_a_project() {
        let fx = Fixture::new();
        let err = fx.error(&["tasks"]).await;
        assert_eq!(err.code, ErrorCode::NoProject);
    }

    #[tokio::test]
    async fn use_sets_and_clears_context() {
        let fx = Fixture::new();
        let set = fx.json(&["use", "alpha"]).await;
        assert_eq!(set["message"], "Now using project: Alpha (alpha)");

        let shown = fx.json(&["use"]).await;
        assert_eq!(shown["context_project"], "alpha");
        assert_eq!(shown["effective"], "alpha");

        fx.run(&["add", "Picked up from context"]).await.unwrap();
        let tasks = fx.json(&["tasks"]).await;
        assert_eq!(tasks[0]["id"], "ALPHA-000");

        fx.run(&["use", "--clear"]).await.unwrap();
        assert_eq!(fx.error(&["tasks"]).await.code, ErrorCode::NoProject);
    }

    #[tokio::test]
    async fn use_rejects_unknown_project() {
        let fx = Fixture::new();
        let err = fx.error(&["use", "ghost"]).await;
        assert_eq!(err.code, ErrorCode::ProjectNotFound);
    }

    #[tokio::test]
    async fn init_adds_project_to_portfolio() {
        let fx = Fixture::new();
        let repo = fx.repos().join("Beta Repo");
        fs::create_dir_all(&repo).unwrap();
        let repo_arg = repo.to_string_lossy().to_string();

        let created = fx.json(&["project", "init", "-r", &repo_arg]).await;
        assert_eq!(created["data"]["id"], "beta-repo");
        assert!(repo.join(".project").join("settings.toml").is_file());

        let listed = fx.json(&["projects", "list"]).await;
        let ids: Vec<&str> = listed["projects"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"beta-repo"));

        let err = fx.error(&["project", "init", "-r", &repo_arg]).await;
        assert_eq!(err.code, ErrorCode::AlreadyExists);
    }

    #[tokio::test]
    async fn next_without_project_looks_across() {
        let fx = Fixture::new();
        let empty = fx.json(&["next"]).await;
        assert!(empty["task"].is_null());

        fx.run(&["-p", "alpha", "add", "Only task"]).await.unwrap();
        let pick = fx.json(&["next"]).await;
        assert_eq!(pick["project"]["id"], "alpha");
        assert_eq!(pick["task"]["id"], "ALPHA-000");

        let scoped = fx.json(&["-p", "alpha", "next"]).await;
        assert_eq!(scoped["id"], "ALPHA-000");
    }

    #[tokio::test]
    async fn status_summarizes_project() {
        let fx = Fixture::new();
        fx.run(&["-p", "alpha", "add", "One"]).await.unwrap();
        fx.run(&["-p", "alpha", "add", "Two"]).await.unwrap();
        fx.run(&["-p", "alpha", "start", "1"]).await.unwrap();

        let status = fx.json(&["-p", "alpha", "status"]).await;
        assert_eq!(status["project"], "alpha");
        assert_eq!(status["in_progress"][0]["id"], "ALPHA-001");
        assert_eq!(status["open_count"], 1);

        let overall = fx.json(&["status"]).await;
        assert_eq!(overall["total_active"], 1);
        assert_eq!(overall["projects"][0]["in_progress"], 1);
    }

    #[tokio::test]
    async fn doctor_reports_clean_portfolio() {
        let fx = Fixture::new();
        let report = fx.json(&["project", "doctor"]).await;
        assert!(report["count"].is_number());
        assert_eq!(
            report["count"].as_u64().unwrap() as usize,
            report["issues"].as_array().unwrap().len()
        );
    }
}

mod research_command_tests {
    use super::*;

    #[tokio::test]
    async fn add_list_and_link() {
        let fx = Fixture::new();
        let added = fx
            .json(&[
                "-p", "alpha", "research", "add", "-t", "spike", "--title", "Pick a parser",
                "--tags", "parsing,deps", "-q", "Which crate?",
            ])
            .await;
        assert_eq!(added["message"], "Research alpha-research-pick-a-parser created");
        assert_eq!(added["data"]["type"], "spike");
        assert_eq!(added["data"]["status"], "open");
        assert_eq!(added["data"]["tags"][1], "deps");

        fx.run(&["-p", "alpha", "research", "add", "-t", "decision", "--title", "Licensing"])
            .await
            .unwrap();

        let tagged = fx
            .json(&["-p", "alpha", "research", "list", "-t", "parsing"])
            .await;
        assert_eq!(tagged.as_array().unwrap().len(), 1);
        assert_eq!(tagged[0]["title"], "Pick a parser");

        let linked = fx
            .json(&[
                "-p", "alpha", "research", "link", "--id", "alpha-research-pick-a-parser",
                "-s", "agent:main:sub:1",
            ])
            .await;
        assert_eq!(linked["data"]["status"], "in-progress");
        assert_eq!(linked["data"]["openclaw"]["child_session_key"], "agent:main:sub:1");

        let open = fx
            .json(&["-p", "alpha", "research", "list", "-s", "open"])
            .await;
        assert_eq!(open.as_array().unwrap().len(), 1);
        assert_eq!(open[0]["title"], "Licensing");
    }

    #[tokio::test]
    async fn link_unknown_note_is_not_found() {
        let fx = Fixture::new();
        let err = fx
            .error(&["-p", "alpha", "research", "link", "--id", "ghost", "-s", "k"])
            .await;
        assert_eq!(err.code, ErrorCode::ResearchNotFound);
    }
}
