// crates/server/src/lib.rs
//! Jobdeck server library.
//!
//! Axum HTTP server around two in-memory engines: the job store and runner
//! that execute, pause and report grouped background jobs, and the
//! append-only replication log with backfill and live subscriptions.

pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sync;

pub use config::Config;
pub use error::*;
pub use self::metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with fresh state built from `config`.
pub fn create_app(config: Config) -> Router {
    create_app_with_state(AppState::new(config))
}

/// Create the Axum application around existing state.
///
/// This sets up:
/// - API routes (health, jobs, sync) and `/metrics`
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app_with_state(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
