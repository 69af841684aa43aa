//! HTTP API server for external control
//!
//! This module provides a REST API for controlling recording sessions:
//! - POST /sessions/start - Start a new recording
//! - POST /sessions/:id/stop - Stop a recording and wait for its uploads
//! - POST /sessions/:id/cancel - Cancel a recording
//! - GET /sessions/:id/status - Query session status
//! - POST /lifecycle - Forward app foreground/background transitions
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
