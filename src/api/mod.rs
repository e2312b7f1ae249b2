//! External Interfaces Adapter, HTTP/SSE rendering (§6): a thin `axum`
//! surface mirroring the teacher's dashboard router assembly
//! (`api/mod.rs::create_app`), scoped down to the three endpoints the
//! spec actually calls for: `/status`, `/events`, `/healthz`.

mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::Router;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

/// Assemble the full router: middleware stack matches the teacher's
/// (`TraceLayer` + `CompressionLayer` + permissive CORS for a
/// same-host monitoring surface).
pub fn create_app(state: ApiState) -> Router {
    routes::api_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
