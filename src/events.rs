//! External Interfaces Adapter (§6): events published to the wider
//! system. A thin in-process stand-in for SAL/DDS — a broadcast
//! channel plus the HTTP/SSE surface in `api/` render it externally.

use serde::{Deserialize, Serialize};

use crate::state_machine::CscState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    #[serde(rename = "summaryState")]
    SummaryState { state: CscState },
    #[serde(rename = "heartbeat")]
    Heartbeat { mjd: f64 },
    #[serde(rename = "errorCode")]
    ErrorCode { code: u32, reason: String },
    #[serde(rename = "target")]
    Target {
        target_id: u64,
        ra: f64,
        dec: f64,
        filter: String,
        exposures: Vec<f64>,
        slew_time: f64,
        script_index: u32,
    },
    #[serde(rename = "predictedSchedule")]
    PredictedSchedule { target_ids: Vec<u64>, mjds: Vec<f64> },
    #[serde(rename = "surveyTopology")]
    SurveyTopology {
        general_proposals: Vec<String>,
        sequence_proposals: Vec<String>,
    },
    #[serde(rename = "largeFileObjectAvailable")]
    LargeFileObjectAvailable { url: String },
}

/// Process-wide event bus. Cloning is cheap (wraps a
/// `tokio::sync::broadcast::Sender`); every publisher and subscriber
/// holds a clone.
#[derive(Clone)]
pub struct EventBus {
    sender: tokio::sync::broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        // A send error only means there are currently no subscribers;
        // the event is not lost for anyone who *is* listening, and a
        // late-joining subscriber is expected to start from "now".
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(Event::Heartbeat { mjd: 60000.0 });
        let received = rx.recv().await.unwrap();
        matches!(received, Event::Heartbeat { .. });
    }
}
