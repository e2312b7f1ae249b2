//! Alert Client (§4.7): polls a target-of-opportunity topic, fetches
//! spatial reward maps, and exposes a keyed dictionary of active
//! alerts. Grounded in `original_source/.../too_client.py`.

mod healpix;

pub use healpix::{HealpixCache, RingToNestTable};

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A target-of-opportunity alert, keyed by `source`. Field names
/// follow `original_source/.../too_client.py`'s `TooAlert` dataclass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TooAlert {
    pub source: String,
    pub too_id: u64,
    pub instrument: String,
    pub alert_type: String,
    pub event_trigger_timestamp: f64,
    /// Reward map in HEALPix **nested** ordering, already reordered
    /// from the ring-ordered payload the topic publishes.
    pub reward_map: Vec<bool>,
    pub reward_map_nside: u32,
    pub is_test: bool,
    pub is_update: bool,
}

/// Raw payload as published on the alert topic, before ring→nested
/// reordering and id assignment.
#[derive(Debug, Clone)]
pub struct RawAlertPayload {
    pub source: String,
    pub instrument: String,
    pub alert_type: String,
    pub event_trigger_timestamp: f64,
    /// Reward map in ring ordering, as published.
    pub reward_map_ring: Vec<bool>,
    pub nside: u32,
    pub is_test: bool,
}

/// Abstraction over the external alert topic (out of scope per
/// `spec.md` §1).
#[async_trait]
pub trait AlertTopicSource: Send + Sync {
    /// Poll for alerts published since the last call; an empty vec
    /// means nothing new.
    async fn poll(&self) -> Vec<RawAlertPayload>;
}

/// In-memory stand-in: callers push payloads directly via `publish`.
#[derive(Default)]
pub struct InMemoryAlertTopic {
    pending: std::sync::Mutex<Vec<RawAlertPayload>>,
}

impl InMemoryAlertTopic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, payload: RawAlertPayload) {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).push(payload);
    }
}

#[async_trait]
impl AlertTopicSource for InMemoryAlertTopic {
    async fn poll(&self) -> Vec<RawAlertPayload> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Keyed map of currently-active ToO alerts, written by the poller
/// task, read by the Conditions Aggregator.
pub struct TooClient {
    alerts: DashMap<String, TooAlert>,
    healpix: HealpixCache,
    next_id: std::sync::atomic::AtomicU64,
}

impl TooClient {
    pub fn new() -> Self {
        Self {
            alerts: DashMap::new(),
            healpix: HealpixCache::new(),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Poll once and fold any new payloads into the alert map.
    /// §4.7: unseen source gets a fresh id; `is_update` on a known
    /// source replaces payload in place while preserving the id.
    pub async fn poll_once(&self, source: &dyn AlertTopicSource) {
        for payload in source.poll().await {
            self.ingest(payload);
        }
    }

    fn ingest(&self, payload: RawAlertPayload) {
        let table = self.healpix.table_for(payload.nside);
        let nested = table.ring_to_nested(&payload.reward_map_ring);

        let is_update = self.alerts.contains_key(&payload.source);
        let too_id = if is_update {
            self.alerts.get(&payload.source).map(|a| a.too_id).unwrap_or(0)
        } else {
            self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
        };

        debug!(
            source = %payload.source,
            too_id,
            is_update,
            nside = payload.nside,
            "ingesting ToO alert payload"
        );

        self.alerts.insert(
            payload.source.clone(),
            TooAlert {
                source: payload.source,
                too_id,
                instrument: payload.instrument,
                alert_type: payload.alert_type,
                event_trigger_timestamp: payload.event_trigger_timestamp,
                reward_map: nested,
                reward_map_nside: payload.nside,
                is_test: payload.is_test,
                is_update,
            },
        );

        if !is_update {
            info!(too_id, "new target-of-opportunity alert registered");
        }
    }

    /// Snapshot of currently active alerts, keyed by source, ordered
    /// by source name for deterministic conditions assembly (§4.2).
    pub fn get_too_alerts(&self) -> Vec<(String, TooAlert)> {
        let mut out: Vec<_> = self
            .alerts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl Default for TooClient {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedTooClient = Arc<TooClient>;

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(source: &str, nside: u32, is_test: bool) -> RawAlertPayload {
        let npix = 12 * (nside as usize).pow(2);
        RawAlertPayload {
            source: source.to_string(),
            instrument: "LSSTCam".to_string(),
            alert_type: "gw".to_string(),
            event_trigger_timestamp: 1000.0,
            reward_map_ring: (0..npix).map(|i| i % 7 == 0).collect(),
            nside,
            is_test,
        }
    }

    #[tokio::test]
    async fn new_source_gets_a_fresh_id() {
        let client = TooClient::new();
        let topic = InMemoryAlertTopic::new();
        topic.publish(payload("S230518h", 32, false));
        client.poll_once(&topic).await;

        let alerts = client.get_too_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, "S230518h");
        assert!(!alerts[0].1.is_update);
        assert_eq!(alerts[0].1.reward_map.len(), 12_288);
    }

    #[tokio::test]
    async fn update_preserves_original_id() {
        let client = TooClient::new();
        let topic = InMemoryAlertTopic::new();
        topic.publish(payload("S230518h", 32, false));
        client.poll_once(&topic).await;
        let first_id = client.get_too_alerts()[0].1.too_id;

        topic.publish(payload("S230518h", 32, false));
        client.poll_once(&topic).await;
        let alerts = client.get_too_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].1.too_id, first_id);
        assert!(alerts[0].1.is_update);
    }

    #[tokio::test]
    async fn distinct_sources_are_kept_separately_and_sorted() {
        let client = TooClient::new();
        let topic = InMemoryAlertTopic::new();
        topic.publish(payload("zeta", 16, false));
        topic.publish(payload("alpha", 16, true));
        client.poll_once(&topic).await;

        let alerts = client.get_too_alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].0, "alpha");
        assert!(alerts[0].1.is_test);
        assert_eq!(alerts[1].0, "zeta");
    }
}
