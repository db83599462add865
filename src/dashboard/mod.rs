//! HTTP API module.
//!
//! A thin JSON API over the portfolio, started by `clawpm serve`. Every
//! request reloads the portfolio, so edits made through the CLI show up
//! without a restart.

mod server;
pub mod templates;

pub use server::{ApiError, DashboardServer, build_router, serve};
