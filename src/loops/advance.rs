//! ADVANCE Production Loop (§4.5): maintain a rolling window of
//! `n_targets` unobserved targets, trimmed to
//! `predicted_scheduler_window_hours` of estimated lead time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::Clock;
use crate::errors::SchedulerError;
use crate::events::{Event, EventBus};
use crate::model::Model;

/// Run the ADVANCE loop until cancelled or a fatal cycle error.
pub async fn run(
    model: Arc<Mutex<Model>>,
    token: CancellationToken,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    sleep_time_s: f64,
    n_targets: u32,
    predicted_scheduler_window_hours: f64,
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
        Box::pin(async move {
            cycle(&model, &events, &clock, n_targets, predicted_scheduler_window_hours).await
        })
    })
    .await
}

async fn cycle(
    model: &Arc<Mutex<Model>>,
    events: &Arc<EventBus>,
    clock: &Arc<dyn Clock>,
    n_targets: u32,
    window_hours: f64,
) -> Result<(), SchedulerError> {
    let mut guard = model.lock().await;
    let now = clock.now();

    guard.update_telemetry(now).await?;
    let observatory_state = guard.synchronize_observatory_model(now).await?;
    guard.reconcile_observations().await?;
    guard.update_conditions(now, observatory_state).await;

    let already = guard.scheduled_targets().len() as u32;
    let need = n_targets.saturating_sub(already);

    let mut submitted = Vec::new();
    if need > 0 {
        let candidates = guard.select_next_targets(need)?;
        let mut cumulative_hours = 0.0_f64;
        for candidate in candidates {
            let lead_hours =
                (candidate.resolved.estimated_slew_time_s + candidate.resolved.exp_times_s.iter().sum::<f64>()) / 3_600.0;
            if !submitted.is_empty() && cumulative_hours + lead_hours > window_hours {
                debug!(
                    window_hours,
                    cumulative_hours, "ADVANCE: lead-time window reached, deferring remaining candidates"
                );
                break;
            }
            let block = guard.default_observing_block(&candidate.program);
            let target = guard.submit_target(candidate, &block).await?;
            cumulative_hours += lead_hours;
            submitted.push(target);
        }
    }

    let queued = guard.scheduled_targets().to_vec();
    drop(guard);

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

    if !queued.is_empty() {
        let now_mjd = clock.now_mjd();
        events.publish(Event::PredictedSchedule {
            target_ids: queued.iter().map(|t| t.id).collect(),
            mjds: queued.iter().map(|_| now_mjd).collect(),
        });
    }

    Ok(())
}
