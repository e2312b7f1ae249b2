//! In-memory queue stand-in. Enforces the consecutive-index invariant
//! (§4.8) and lets tests drive reachability/completions explicitly.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::block::{ObservingBlock, ResolvedParameters};
use crate::errors::QueueError;

use super::{CompletionEvent, QueueClient, QueueState};

pub struct InMemoryQueueClient {
    next_index: AtomicU32,
    reachable: AtomicBool,
    queued: Mutex<Vec<u32>>,
    pending_completions: Mutex<Vec<CompletionEvent>>,
    fail_next_add: AtomicBool,
}

impl InMemoryQueueClient {
    pub fn new() -> Self {
        Self {
            next_index: AtomicU32::new(1),
            reachable: AtomicBool::new(true),
            queued: Mutex::new(Vec::new()),
            pending_completions: Mutex::new(Vec::new()),
            fail_next_add: AtomicBool::new(false),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn fail_next_add(&self) {
        self.fail_next_add.store(true, Ordering::SeqCst);
    }

    /// Test/harness hook: simulate the queue reporting a script as
    /// finished.
    pub fn complete(&self, script_index: u32, success: bool) {
        {
            let mut queued = self.queued.lock().unwrap_or_else(|e| e.into_inner());
            queued.retain(|&i| i != script_index);
        }
        self.pending_completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(CompletionEvent {
                script_index,
                success,
                observation_record: None,
            });
    }
}

impl Default for InMemoryQueueClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn add(
        &self,
        block: &ObservingBlock,
        _parameters: &ResolvedParameters,
    ) -> Result<Vec<u32>, QueueError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(QueueError::NoQueue);
        }
        if self.fail_next_add.swap(false, Ordering::SeqCst) {
            return Err(QueueError::PutOnQueue(format!(
                "simulated submission failure for block {}",
                block.name
            )));
        }

        let count = block.scripts.len().max(1) as u32;
        let first = self.next_index.fetch_add(count, Ordering::SeqCst);
        let indices: Vec<u32> = (first..first + count).collect();

        debug!(block = %block.name, ?indices, "queued observing block");
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(indices.iter().copied());
        Ok(indices)
    }

    async fn state(&self) -> Result<QueueState, QueueError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(QueueError::NoQueue);
        }
        let queued = self.queued.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(QueueState {
            executing_index: queued.first().copied(),
            queued_indices: queued,
            finished: false,
        })
    }

    async fn cancel(&self, script_index: u32) -> Result<(), QueueError> {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|&i| i != script_index);
        Ok(())
    }

    async fn completions(&self) -> Vec<CompletionEvent> {
        std::mem::take(&mut *self.pending_completions.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ObservingBlock, ScriptSpec};

    fn resolved() -> ResolvedParameters {
        ResolvedParameters {
            ra_deg: 1.0,
            dec_deg: 1.0,
            rot_sky_deg: 0.0,
            band_filter: "r".to_string(),
            num_exp: 1,
            exp_times_s: vec![15.0],
            estimated_slew_time_s: 1.0,
            note: None,
        }
    }

    fn two_script_block() -> ObservingBlock {
        ObservingBlock::new("block", "TestProgram")
            .with_script(ScriptSpec {
                path: "slew.py".to_string(),
                is_standard: true,
                parameters: Default::default(),
            })
            .with_script(ScriptSpec {
                path: "standard_visit.py".to_string(),
                is_standard: true,
                parameters: Default::default(),
            })
    }

    #[tokio::test]
    async fn add_returns_consecutive_indices() {
        let queue = InMemoryQueueClient::new();
        let indices = queue.add(&two_script_block(), &resolved()).await.unwrap();
        assert_eq!(indices, vec![1, 2]);
        let more = queue.add(&two_script_block(), &resolved()).await.unwrap();
        assert_eq!(more, vec![3, 4]);
    }

    #[tokio::test]
    async fn unreachable_queue_fails_add_with_no_queue() {
        let queue = InMemoryQueueClient::new();
        queue.set_reachable(false);
        let err = queue.add(&two_script_block(), &resolved()).await.unwrap_err();
        assert!(matches!(err, QueueError::NoQueue));
    }

    #[tokio::test]
    async fn completions_drain_in_order() {
        let queue = InMemoryQueueClient::new();
        queue.add(&two_script_block(), &resolved()).await.unwrap();
        queue.complete(1, true);
        queue.complete(2, true);
        let events = queue.completions().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].script_index, 1);
        assert_eq!(events[1].script_index, 2);
        assert!(queue.completions().await.is_empty());
    }
}
