//! Analysis server module.
//!
//! Provides a REST API for starting analyses and browsing their namespace
//! trees.

pub mod routes;

pub use routes::{build_router, serve, AppState};
