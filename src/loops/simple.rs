//! SIMPLE Production Loop (§4.4): at most one unobserved target resides
//! in the queue at any time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::Clock;
use crate::errors::SchedulerError;
use crate::events::{Event, EventBus};
use crate::model::Model;

/// Run the SIMPLE loop until cancelled or a fatal cycle error. §4.5's
/// "queue unreachable on resume -> FAULT with NO_QUEUE" is checked once
/// up front, before the first tick, so it fires within one heartbeat.
pub async fn run(
    model: Arc<Mutex<Model>>,
    token: CancellationToken,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    sleep_time_s: f64,
) -> Result<(), SchedulerError> {
    {
        let guard = model.lock().await;
        guard.ensure_queue_reachable().await?;
    }

    let tick = Duration::from_secs_f64(sleep_time_s.max(0.001));
    super::drive(token, tick, move || {
        let model = model.clone();
        let events = events.clone();
        let clock = clock.clone();
        Box::pin(async move { cycle(&model, &events, &clock).await })
    })
    .await
}

async fn cycle(model: &Arc<Mutex<Model>>, events: &Arc<EventBus>, clock: &Arc<dyn Clock>) -> Result<(), SchedulerError> {
    let mut guard = model.lock().await;

    if !guard.scheduled_targets().is_empty() {
        debug!("SIMPLE: a target is already outstanding, reconciling only");
        guard.reconcile_observations().await?;
        return Ok(());
    }

    let now = clock.now();
    let submitted = guard.generate_target_queue(now, 1).await?;
    drop(guard);

    if submitted.is_empty() {
        debug!("SIMPLE: no target available this cycle");
        return Ok(());
    }

    for target in &submitted {
        events.publish(Event::Target {
            target_id: target.id,
            ra: target.resolved.ra_deg,
            dec: target.resolved.dec_deg,
            filter: target.resolved.band_filter.clone(),
            exposures: target.resolved.exp_times_s.clone(),
            slew_time: target.resolved.estimated_slew_time_s,
            script_index: target.script_indices.first().copied().unwrap_or(0),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::TooClient;
    use crate::clock::{MockClock, SystemClock};
    use crate::driver::SequentialDriver;
    use crate::queue::InMemoryQueueClient;
    use crate::telemetry::{InMemoryTimeSeriesSource, TelemetryStore};

    fn make_model() -> Arc<Mutex<Model>> {
        Arc::new(Mutex::new(Model::new(
            Box::new(SequentialDriver::new(vec![(1.0, 1.0), (2.0, 2.0)])),
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            Arc::new(InMemoryQueueClient::new()),
            Arc::new(InMemoryTimeSeriesSource::new()),
        )))
    }

    #[tokio::test]
    async fn unreachable_queue_fails_before_first_tick() {
        let queue = Arc::new(InMemoryQueueClient::new());
        queue.set_reachable(false);
        let model = Arc::new(Mutex::new(Model::new(
            Box::new(SequentialDriver::new(vec![(1.0, 1.0)])),
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            queue,
            Arc::new(InMemoryTimeSeriesSource::new()),
        )));
        let token = CancellationToken::new();
        let err = run(model, token, Arc::new(EventBus::default()), Arc::new(SystemClock::new()), 0.01)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Queue(_)));
    }

    #[tokio::test]
    async fn cycle_submits_one_target_and_publishes_an_event() {
        let model = make_model();
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new(1_000));

        cycle(&model, &events, &clock).await.unwrap();
        assert_eq!(model.lock().await.scheduled_targets().len(), 1);

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Event::Target { .. }));
    }

    #[tokio::test]
    async fn skips_selection_while_a_target_is_outstanding() {
        let model = make_model();
        let events = Arc::new(EventBus::default());
        let clock: Arc<dyn Clock> = Arc::new(MockClock::new(1_000));

        cycle(&model, &events, &clock).await.unwrap();
        cycle(&model, &events, &clock).await.unwrap();
        assert_eq!(model.lock().await.scheduled_targets().len(), 1);
    }
}
