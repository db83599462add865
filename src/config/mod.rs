//! Portfolio and project configuration.
//!
//! - `~/clawpm/portfolio.toml` (or `$CLAWPM_PORTFOLIO/portfolio.toml`) lists
//!   the roots holding project repositories.
//! - Each project repository carries `.project/settings.toml` and its task
//!   root at `.project/tasks/`.
//! - `~/.clawpm-context` (or `$CLAWPM_CONTEXT_FILE`) remembers the project
//!   chosen with `clawpm use`.

pub mod context;
mod loader;
pub mod projects;
mod types;

pub use context::{ProjectSource, resolve_project};
pub use loader::{CONTEXT_FILE_ENV, ConfigLoader, ConfigPaths, PORTFOLIO_ENV};
pub use projects::{
    Issue, IssueLevel, check_project, discover_projects, get_project, init_project,
    require_project, set_project_status, validate_portfolio,
};
pub use types::*;
