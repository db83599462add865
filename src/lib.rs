//! clawpm: a filesystem-first project and task tracker.
//!
//! Projects are repositories carrying a `.project/` directory; tasks are
//! markdown files whose location under `.project/tasks/` is their state.
//! This library holds everything behind the `clawpm` binary so it can be
//! tested and embedded.

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod format;
pub mod logging;
pub mod paths;
pub mod portfolio;
pub mod research;
pub mod store;
pub mod types;
pub mod worklog;
