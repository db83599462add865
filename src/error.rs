//! Structured error types for command and API responses.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    NoChanges,

    // Not found errors
    PortfolioNotFound,
    ProjectNotFound,
    NoProject,
    TaskNotFound,
    ResearchNotFound,

    // Conflict errors
    AlreadyExists,
    IncompleteChildren,

    // Internal errors
    IoError,
    InternalError,
}

/// Structured error carried through `anyhow` and recovered at the edges.
#[derive(Debug, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct PmError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Ids of the children that kept a parent from completing.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocking: Vec<String>,
}

impl PmError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            blocking: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn no_changes() -> Self {
        Self::new(
            ErrorCode::NoChanges,
            "Specify at least one field to edit (--title, --priority, --complexity, --body)",
        )
    }

    pub fn portfolio_not_found() -> Self {
        Self::new(
            ErrorCode::PortfolioNotFound,
            "No portfolio found at ~/clawpm. Create portfolio.toml or set CLAWPM_PORTFOLIO.",
        )
    }

    pub fn project_not_found(project_id: &str) -> Self {
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("Project '{}' not found", project_id),
        )
    }

    pub fn no_project() -> Self {
        Self::new(
            ErrorCode::NoProject,
            "No project specified. Use --project, cd into a project, or run 'clawpm use <project>'.",
        )
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task not found: {}", task_id),
        )
    }

    pub fn research_not_found(research_id: &str) -> Self {
        Self::new(
            ErrorCode::ResearchNotFound,
            format!("Research not found: {}", research_id),
        )
    }

    pub fn already_exists(what: &str) -> Self {
        Self::new(ErrorCode::AlreadyExists, format!("Already exists: {}", what))
    }

    pub fn incomplete_children(task_id: &str, blocking: &[String]) -> Self {
        let mut err = Self::new(
            ErrorCode::IncompleteChildren,
            format!(
                "Cannot complete {} - subtasks incomplete: {}. Use --force to complete anyway.",
                task_id,
                blocking.join(", ")
            ),
        );
        err.blocking = blocking.to_vec();
        err
    }

    pub fn io(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::IoError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

// Recover the structured error from an anyhow chain.
impl From<anyhow::Error> for PmError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PmError>() {
            Ok(pm_err) => pm_err,
            Err(err) => match err.downcast::<std::io::Error>() {
                Ok(io_err) => PmError::io(io_err),
                Err(err) => PmError::internal(format!("{:#}", err)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcasts_structured_error_from_anyhow() {
        let err: anyhow::Error = PmError::task_not_found("CLAWP-001").into();
        let pm: PmError = err.into();
        assert_eq!(pm.code, ErrorCode::TaskNotFound);
        assert_eq!(pm.message, "Task not found: CLAWP-001");
    }

    #[test]
    fn io_errors_keep_their_category() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let pm: PmError = anyhow::Error::from(io).into();
        assert_eq!(pm.code, ErrorCode::IoError);
    }

    #[test]
    fn other_errors_become_internal() {
        let pm: PmError = anyhow::anyhow!("boom").into();
        assert_eq!(pm.code, ErrorCode::InternalError);
        assert_eq!(pm.message, "boom");
    }

    #[test]
    fn incomplete_children_serializes_blocking_ids() {
        let err = PmError::incomplete_children("T-001", &["T-001-001".to_string()]);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "INCOMPLETE_CHILDREN");
        assert_eq!(json["blocking"][0], "T-001-001");
        assert!(json.get("field").is_none());
    }
}
