//! Heartbeat task: publishes `Event::Heartbeat` at a fixed interval
//! regardless of `summaryState`, so a monitoring client can distinguish
//! "process alive, scheduler quiet" from "process gone".
//!
//! Grounded on `background/self_healer.rs::SelfHealer::run`'s
//! sleep-then-cycle loop shape, adapted to exit cleanly on
//! cancellation the way `loops::drive` does for the production loops.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::state_machine::Csc;

/// Run until cancelled. `interval` is typically the same
/// `loop_sleep_time_s` cadence the production loop uses, so a missed
/// heartbeat is a reliable signal that the loop task has stalled.
pub async fn run(csc: Arc<Csc>, token: CancellationToken, interval: Duration) {
    info!(interval_secs = interval.as_secs_f64(), "heartbeat task started");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("heartbeat task cancelled, exiting");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        csc.publish_heartbeat().await;
    }
}
