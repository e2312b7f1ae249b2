//! Periodic driver-state checkpointing (§4.9): runs independently of
//! whichever production loop is selected, on the same
//! cancellation-aware sleep-then-cycle shape as [`super::heartbeat`]
//! and [`super::alerts`]. Publishes `largeFileObjectAvailable` whenever
//! a checkpoint resolves to a non-`file` scheme.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::{Event, EventBus};
use crate::model::Model;
use crate::persistence::PersistenceRouter;

pub async fn run(
    model: Arc<Mutex<Model>>,
    persistence: Arc<PersistenceRouter>,
    uri: String,
    events: Arc<EventBus>,
    token: CancellationToken,
    interval: Duration,
) {
    info!(interval_secs = interval.as_secs_f64(), uri, "checkpoint task started");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                checkpoint_once(&model, &persistence, &uri, &events).await;
                info!("checkpoint task cancelled, exiting after final save");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        checkpoint_once(&model, &persistence, &uri, &events).await;
    }
}

async fn checkpoint_once(model: &Arc<Mutex<Model>>, persistence: &PersistenceRouter, uri: &str, events: &Arc<EventBus>) {
    let result = model.lock().await.save_state(uri, persistence).await;
    match result {
        Ok(Some(remote_uri)) => {
            events.publish(Event::LargeFileObjectAvailable { url: remote_uri });
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "periodic driver-state checkpoint failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::TooClient;
    use crate::driver::SequentialDriver;
    use crate::events::EventBus;
    use crate::persistence::{InMemoryRemoteStore, LocalFileStore, PersistenceRouter};
    use crate::queue::InMemoryQueueClient;
    use crate::telemetry::{InMemoryTimeSeriesSource, TelemetryStore};

    fn make_model() -> Arc<Mutex<Model>> {
        Arc::new(Mutex::new(Model::new(
            Box::new(SequentialDriver::new(vec![(1.0, 1.0)])),
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            Arc::new(InMemoryQueueClient::new()),
            Arc::new(InMemoryTimeSeriesSource::new()),
        )))
    }

    #[tokio::test]
    async fn publishes_large_file_object_available_for_a_remote_scheme() {
        let model = make_model();
        let persistence = Arc::new(PersistenceRouter::new(vec![
            Box::new(LocalFileStore::new(std::env::temp_dir())),
            Box::new(InMemoryRemoteStore::new()),
        ]));
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let token = CancellationToken::new();

        let handle = tokio::spawn(run(
            model,
            persistence,
            "s3://bucket/driver.bin".to_string(),
            events,
            token.clone(),
            Duration::from_millis(5),
        ));

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("expected a largeFileObjectAvailable event")
            .unwrap();
        assert!(matches!(received, Event::LargeFileObjectAvailable { url } if url == "s3://bucket/driver.bin"));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn file_scheme_checkpoint_publishes_nothing() {
        let model = make_model();
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(PersistenceRouter::new(vec![
            Box::new(LocalFileStore::new(dir.path())),
            Box::new(InMemoryRemoteStore::new()),
        ]));
        let events = Arc::new(EventBus::default());
        let mut rx = events.subscribe();
        let token = CancellationToken::new();

        let handle = tokio::spawn(run(
            model,
            persistence,
            "file:///driver.bin".to_string(),
            events,
            token.clone(),
            Duration::from_millis(200),
        ));

        token.cancel();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
