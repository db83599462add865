//! HTML served by the API root.
//!
//! Embedded at compile time using `include_str!`.

/// Single-page overview that reads everything from `/api/*`.
pub const INDEX_TEMPLATE: &str = include_str!("templates/index.html");
