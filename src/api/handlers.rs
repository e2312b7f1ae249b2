//! Request handlers for the status/events/health surface.
//!
//! Grounded on the teacher's `api/handlers.rs::DashboardState`
//! (shared `Clone` state struct wrapping `Arc<RwLock<...>>`) and
//! `get_health`/`legacy_health_check`, narrowed to this crate's three
//! endpoints.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::events::{Event, EventBus};
use crate::state_machine::{Csc, CscState};

/// Shared state for the status/events handlers.
#[derive(Clone)]
pub struct ApiState {
    pub csc: Arc<Csc>,
    pub events: Arc<EventBus>,
}

impl ApiState {
    pub fn new(csc: Arc<Csc>, events: Arc<EventBus>) -> Self {
        Self { csc, events }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub summary_state: CscState,
    pub running: bool,
    pub last_heartbeat_mjd: Option<f64>,
    pub last_error: Option<ErrorPayload>,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: u32,
    pub reason: String,
}

/// `GET /status`: current `summaryState` plus last error, per §6's
/// requirement that a client be able to learn the scheduler's state
/// without subscribing to the event stream.
pub async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let last_error = state.csc.last_error().await.map(|(code, reason)| ErrorPayload { code, reason });
    Json(StatusResponse {
        summary_state: state.csc.state().await,
        running: state.csc.is_running(),
        last_heartbeat_mjd: state.csc.last_heartbeat_mjd().await,
        last_error,
    })
}

/// `GET /events`: Server-Sent-Events subscription to the broadcast
/// channel. Lagged subscribers (slow consumers that fall behind the
/// channel's ring buffer) simply skip the missed events rather than
/// terminating the stream — the `/status` endpoint remains the source
/// of truth for anyone who needs to resynchronize.
pub async fn stream_events(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.events.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(event) => serde_json::to_string(&event).ok().map(|json| Ok(SseEvent::default().data(json))),
        Err(_lagged) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// `GET /healthz`: process liveness, independent of `summaryState` —
/// reachable even while the scheduler is FAULT, since a process that
/// can still answer HTTP requests is not the same failure as a
/// scheduler that has faulted.
pub async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn test_state() -> ApiState {
        ApiState::new(
            Arc::new(Csc::new(Arc::new(EventBus::default()), Arc::new(SystemClock::new()))),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn status_reports_offline_before_enter_control() {
        let state = test_state();
        let response = get_status(State(state)).await;
        assert_eq!(response.0.summary_state, CscState::Offline);
        assert!(!response.0.running);
        assert!(response.0.last_error.is_none());
    }

    #[tokio::test]
    async fn status_reflects_enter_control() {
        let state = test_state();
        state.csc.enter_control().await.unwrap();
        let response = get_status(State(state)).await;
        assert_eq!(response.0.summary_state, CscState::Standby);
    }

    #[tokio::test]
    async fn healthz_always_answers() {
        assert_eq!(healthz().await, "ok");
    }

    #[tokio::test]
    async fn status_reports_last_heartbeat_after_one_is_published() {
        let state = test_state();
        assert!(get_status(State(state.clone())).await.0.last_heartbeat_mjd.is_none());

        state.csc.publish_heartbeat().await;
        let response = get_status(State(state)).await;
        assert!(response.0.last_heartbeat_mjd.is_some());
    }
}
