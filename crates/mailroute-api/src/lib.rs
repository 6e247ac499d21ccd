//! Mailroute API - HTTP surface
//!
//! This crate provides the HTTP server surface: the send endpoint, the
//! public tracking callbacks, and health checks.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
