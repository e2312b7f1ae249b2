//! Target-of-opportunity alert polling (§4.7): runs independently of
//! whichever production loop is selected, since alerts must keep
//! landing in the `TooClient`'s map even while the loop is between
//! ticks. Grounded on the same cancellation-aware sleep-then-cycle
//! shape as [`super::heartbeat`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::alerts::AlertTopicSource;
use crate::model::Model;

pub async fn run(
    model: Arc<Mutex<Model>>,
    source: Arc<dyn AlertTopicSource>,
    token: CancellationToken,
    interval: Duration,
) {
    info!(interval_secs = interval.as_secs_f64(), "alert polling task started");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("alert polling task cancelled, exiting");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        model.lock().await.poll_alerts(source.as_ref()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{InMemoryAlertTopic, RawAlertPayload, TooClient};
    use crate::driver::SequentialDriver;
    use crate::queue::InMemoryQueueClient;
    use crate::telemetry::{InMemoryTimeSeriesSource, TelemetryStore};

    #[tokio::test]
    async fn polls_until_cancelled_and_folds_alerts_into_the_model() {
        let topic = Arc::new(InMemoryAlertTopic::new());
        topic.publish(RawAlertPayload {
            source: "GCN".to_string(),
            instrument: "GW".to_string(),
            alert_type: "burst".to_string(),
            event_trigger_timestamp: 10.0,
            reward_map_ring: vec![true, false, false, true],
            nside: 1,
            is_test: true,
        });

        let model = Arc::new(Mutex::new(Model::new(
            Box::new(SequentialDriver::new(vec![(1.0, 1.0)])),
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            Arc::new(InMemoryQueueClient::new()),
            Arc::new(InMemoryTimeSeriesSource::new()),
        )));

        let token = CancellationToken::new();
        let handle = tokio::spawn(run(model.clone(), topic, token.clone(), Duration::from_millis(5)));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(model.lock().await.active_alert_sources(), vec!["GCN".to_string()]);

        token.cancel();
        handle.await.unwrap();
    }
}
