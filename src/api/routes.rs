//! Route table for the status/events/health surface.
//!
//! Grounded on the teacher's `api/routes.rs::api_routes`.

use axum::routing::get;
use axum::Router;

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/events", get(handlers::stream_events))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
