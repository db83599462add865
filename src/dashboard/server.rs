//! HTTP server implementation for the JSON API.
//!
//! This module provides the axum-based HTTP server that serves the overview
//! page and exposes the REST endpoints used by it.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::templates;
use crate::config::{ConfigPaths, ProjectSettings, ProjectStatus};
use crate::error::{ErrorCode, PmError};
use crate::portfolio::{Portfolio, ProjectTask};
use crate::types::{TaskState, TaskView};
use crate::worklog::{WorkLogAction, WorkLogEntry};

/// Default number of entries returned by `/api/worklog`.
const DEFAULT_WORKLOG_LIMIT: usize = 10;

/// Server state shared across handlers.
#[derive(Clone)]
pub struct DashboardServer {
    paths: Arc<ConfigPaths>,
}

impl DashboardServer {
    pub fn new(paths: ConfigPaths) -> Self {
        Self {
            paths: Arc::new(paths),
        }
    }

    /// Load the portfolio fresh for one request.
    fn portfolio(&self) -> Result<Portfolio, ApiError> {
        Ok(Portfolio::load(ConfigPaths::clone(&self.paths))?)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A [`PmError`] rendered as `{"success": false, "error": CODE, "message": ...}`.
#[derive(Debug)]
pub struct ApiError(pub PmError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.code {
            ErrorCode::PortfolioNotFound
            | ErrorCode::ProjectNotFound
            | ErrorCode::TaskNotFound
            | ErrorCode::ResearchNotFound => StatusCode::NOT_FOUND,
            ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldValue
            | ErrorCode::NoChanges
            | ErrorCode::NoProject => StatusCode::BAD_REQUEST,
            ErrorCode::AlreadyExists | ErrorCode::IncompleteChildren => StatusCode::CONFLICT,
            ErrorCode::IoError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(PmError::from(err))
    }
}

impl From<PmError> for ApiError {
    fn from(err: PmError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(code = ?self.0.code, message = %self.0.message, "Request failed");
        }
        let mut body = json!({
            "success": false,
            "error": self.0.code,
            "message": self.0.message,
        });
        if !self.0.blocking.is_empty() {
            body["details"] = json!({ "blocking": self.0.blocking });
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// Pages
// =============================================================================

/// Health check response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Root endpoint - serves the overview page.
async fn root() -> Html<&'static str> {
    Html(templates::INDEX_TEMPLATE)
}

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// =============================================================================
// Read endpoints
// =============================================================================

async fn api_projects(State(state): State<DashboardServer>) -> ApiResult<Vec<ProjectSettings>> {
    Ok(Json(state.portfolio()?.projects(None)?))
}

async fn api_project(
    State(state): State<DashboardServer>,
    Path(project_id): Path<String>,
) -> ApiResult<ProjectSettings> {
    Ok(Json(state.portfolio()?.project(&project_id)?))
}

#[derive(Debug, Deserialize)]
struct TaskListParams {
    state: Option<String>,
}

async fn api_project_tasks(
    State(state): State<DashboardServer>,
    Path(project_id): Path<String>,
    Query(params): Query<TaskListParams>,
) -> ApiResult<Vec<TaskView>> {
    let filter = params
        .state
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(parse_state)
        .transpose()?;
    let tasks = state.portfolio()?.store(&project_id)?.list(filter)?;
    Ok(Json(tasks.iter().map(|t| t.view()).collect()))
}

async fn api_blockers(State(state): State<DashboardServer>) -> ApiResult<Vec<ProjectTask>> {
    Ok(Json(state.portfolio()?.tasks_in_states(&[TaskState::Blocked])?))
}

async fn api_active_tasks(State(state): State<DashboardServer>) -> ApiResult<Vec<ProjectTask>> {
    Ok(Json(
        state
            .portfolio()?
            .tasks_in_states(&[TaskState::Open, TaskState::Progress])?,
    ))
}

#[derive(Debug, Deserialize)]
struct WorklogParams {
    project: Option<String>,
    limit: Option<usize>,
}

async fn api_worklog(
    State(state): State<DashboardServer>,
    Query(params): Query<WorklogParams>,
) -> ApiResult<Vec<WorkLogEntry>> {
    let portfolio = state.portfolio()?;
    let entries = portfolio.worklog().tail(
        params.project.as_deref(),
        params.limit.unwrap_or(DEFAULT_WORKLOG_LIMIT),
    )?;
    Ok(Json(entries))
}

// =============================================================================
// Mutations
// =============================================================================

#[derive(Debug, Deserialize)]
struct StateChangeRequest {
    state: String,
    note: Option<String>,
    #[serde(default)]
    force: bool,
}

async fn api_task_state(
    State(state): State<DashboardServer>,
    Path((project_id, task_id)): Path<(String, String)>,
    Json(req): Json<StateChangeRequest>,
) -> ApiResult<Value> {
    let new_state = parse_state(&req.state)?;
    let task = state.portfolio()?.change_state(
        &project_id,
        &task_id,
        new_state,
        req.note.as_deref(),
        req.force,
    )?;
    Ok(Json(json!({ "success": true, "task": task.view() })))
}

#[derive(Debug, Deserialize)]
struct RespondRequest {
    response: String,
    #[serde(default)]
    unblock: bool,
}

async fn api_task_respond(
    State(state): State<DashboardServer>,
    Path((project_id, task_id)): Path<(String, String)>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Value> {
    let timestamp = state
        .portfolio()?
        .respond(&project_id, &task_id, &req.response, req.unblock)?;
    Ok(Json(json!({ "success": true, "timestamp": timestamp })))
}

#[derive(Debug, Deserialize)]
struct LogParams {
    project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogEntryRequest {
    action: String,
    summary: String,
    task: Option<String>,
    next: Option<String>,
}

async fn api_log(
    State(state): State<DashboardServer>,
    Query(params): Query<LogParams>,
    Json(req): Json<LogEntryRequest>,
) -> ApiResult<Value> {
    let project_id = params
        .project_id
        .filter(|p| !p.is_empty())
        .ok_or_else(|| PmError::missing_field("project_id"))?;
    let action = WorkLogAction::from_str(&req.action, true)
        .map_err(|_| PmError::invalid_value("action", &format!("unknown action '{}'", req.action)))?;

    let mut entry = WorkLogEntry::new(project_id.clone(), action).summary(req.summary);
    if let Some(task) = req.task.filter(|t| !t.is_empty()) {
        entry = entry.task(crate::store::ids::expand(&task, &project_id));
    }
    if let Some(next) = req.next {
        entry = entry.next(next);
    }
    let entry = state.portfolio()?.log(entry)?;
    Ok(Json(json!({ "success": true, "entry": entry })))
}

async fn api_pause_project(
    State(state): State<DashboardServer>,
    Path(project_id): Path<String>,
) -> ApiResult<Value> {
    set_status(&state, &project_id, ProjectStatus::Paused)
}

async fn api_resume_project(
    State(state): State<DashboardServer>,
    Path(project_id): Path<String>,
) -> ApiResult<Value> {
    set_status(&state, &project_id, ProjectStatus::Active)
}

fn set_status(state: &DashboardServer, project_id: &str, status: ProjectStatus) -> ApiResult<Value> {
    let project = state.portfolio()?.set_status(project_id, status)?;
    Ok(Json(json!({ "success": true, "status": project.status })))
}

fn parse_state(raw: &str) -> Result<TaskState, ApiError> {
    raw.parse::<TaskState>()
        .map_err(|reason| ApiError(PmError::invalid_value("state", &reason)))
}

// =============================================================================
// Router
// =============================================================================

/// Build the router with all routes.
pub fn build_router(state: DashboardServer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/projects", get(api_projects))
        .route("/api/projects/{project_id}", get(api_project))
        .route("/api/projects/{project_id}/tasks", get(api_project_tasks))
        .route("/api/projects/{project_id}/pause", post(api_pause_project))
        .route("/api/projects/{project_id}/resume", post(api_resume_project))
        .route("/api/blockers", get(api_blockers))
        .route("/api/active-tasks", get(api_active_tasks))
        .route("/api/worklog", get(api_worklog))
        .route("/api/log", post(api_log))
        .route("/api/tasks/{project_id}/{task_id}/state", post(api_task_state))
        .route("/api/tasks/{project_id}/{task_id}/respond", post(api_task_respond))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `host:port` until Ctrl-C.
pub async fn serve(paths: ConfigPaths, host: &str, port: u16) -> anyhow::Result<()> {
    // Fail fast when there is no portfolio to serve.
    Portfolio::load(paths.clone())?;

    let app = build_router(DashboardServer::new(paths));
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let bound_addr = listener.local_addr()?;
    info!("Serving on http://{}", bound_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Server shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PORTFOLIO_FILE, init_project};
    use crate::types::NewTask;
    use std::fs;
    use tempfile::TempDir;

    /// Portfolio with one project `alpha` holding one task.
    fn fixture() -> (TempDir, DashboardServer) {
        let dir = TempDir::new().unwrap();
        let repos = dir.path().join("repos");
        let repo = repos.join("alpha");
        fs::create_dir_all(&repo).unwrap();
        fs::write(
            dir.path().join(PORTFOLIO_FILE),
            format!("project_roots = [{:?}]\n", repos.to_string_lossy()),
        )
        .unwrap();
        init_project(&repo, Some("alpha"), Some("Alpha")).unwrap();

        let paths = ConfigPaths::with_dirs(Some(dir.path().to_path_buf()), None);
        let server = DashboardServer::new(paths);
        server
            .portfolio()
            .unwrap()
            .store("alpha")
            .unwrap()
            .add(&NewTask {
                title: "Wire the API".into(),
                ..Default::default()
            })
            .unwrap();
        (dir, server)
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            version: "0.1.0",
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("0.1.0"));
    }

    #[test]
    fn error_status_follows_code() {
        assert_eq!(
            ApiError(PmError::task_not_found("X-1")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(PmError::incomplete_children("X-1", &["X-1-001".to_string()])).status(),
            StatusCode::CONFLICT
        );
        let response = ApiError(PmError::missing_field("project_id")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lists_projects_and_tasks() {
        let (_dir, server) = fixture();
        let Json(projects) = api_projects(State(server.clone())).await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Alpha");

        let Json(tasks) = api_project_tasks(
            State(server.clone()),
            Path("alpha".into()),
            Query(TaskListParams {
                state: Some("open".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "ALPHA-000");
    }

    #[tokio::test]
    async fn bad_state_filter_is_rejected() {
        let (_dir, server) = fixture();
        let err = api_project_tasks(
            State(server),
            Path("alpha".into()),
            Query(TaskListParams {
                state: Some("finished".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0.code, ErrorCode::InvalidFieldValue);
    }

    #[tokio::test]
    async fn state_change_moves_task_and_logs() {
        let (_dir, server) = fixture();
        let Json(body) = api_task_state(
            State(server.clone()),
            Path(("alpha".into(), "0".into())),
            Json(StateChangeRequest {
                state: "blocked".into(),
                note: Some("needs keys".into()),
                force: false,
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["task"]["state"], "blocked");

        let Json(blockers) = api_blockers(State(server.clone())).await.unwrap();
        assert_eq!(blockers.len(), 1);
        assert_eq!(blockers[0].project, "alpha");

        let Json(entries) = api_worklog(
            State(server),
            Query(WorklogParams {
                project: Some("alpha".into()),
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary.as_deref(), Some("needs keys"));
    }

    #[tokio::test]
    async fn respond_unblocks_task() {
        let (_dir, server) = fixture();
        server
            .portfolio()
            .unwrap()
            .change_state("alpha", "ALPHA-000", TaskState::Blocked, None, false)
            .unwrap();

        let Json(body) = api_task_respond(
            State(server.clone()),
            Path(("alpha".into(), "ALPHA-000".into())),
            Json(RespondRequest {
                response: "use the staging key".into(),
                unblock: true,
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["success"], true);

        let Json(active) = api_active_tasks(State(server)).await.unwrap();
        assert_eq!(active[0].task.state, TaskState::Progress);
    }

    #[tokio::test]
    async fn log_requires_known_action() {
        let (_dir, server) = fixture();
        let err = api_log(
            State(server.clone()),
            Query(LogParams {
                project_id: Some("alpha".into()),
            }),
            Json(LogEntryRequest {
                action: "celebrate".into(),
                summary: "shipped".into(),
                task: None,
                next: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0.code, ErrorCode::InvalidFieldValue);

        let Json(body) = api_log(
            State(server),
            Query(LogParams {
                project_id: Some("alpha".into()),
            }),
            Json(LogEntryRequest {
                action: "note".into(),
                summary: "shipped".into(),
                task: Some("0".into()),
                next: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["entry"]["task"], "ALPHA-000");
    }

    #[tokio::test]
    async fn pause_and_resume_round_trip() {
        let (_dir, server) = fixture();
        let Json(body) = api_pause_project(State(server.clone()), Path("alpha".into()))
            .await
            .unwrap();
        assert_eq!(body["status"], "paused");
        let Json(project) = api_project(State(server.clone()), Path("alpha".into()))
            .await
            .unwrap();
        assert_eq!(project.status, ProjectStatus::Paused);

        let Json(body) = api_resume_project(State(server), Path("alpha".into()))
            .await
            .unwrap();
        assert_eq!(body["status"], "active");
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let (_dir, server) = fixture();
        let err = api_project(State(server), Path("nope".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
