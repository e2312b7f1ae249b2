//! Queue Client (§4.8): the external script queue, reached only
//! through this trait. `spec.md` §1 places the real queue service out
//! of scope; this crate ships an in-memory stand-in good enough to
//! exercise the Model and both production loops (scenarios S1, S2).

mod in_memory;

pub use in_memory::InMemoryQueueClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::block::{ObservingBlock, ResolvedParameters};
use crate::errors::QueueError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueState {
    pub executing_index: Option<u32>,
    pub queued_indices: Vec<u32>,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionEvent {
    pub script_index: u32,
    pub success: bool,
    pub observation_record: Option<serde_json::Value>,
}

/// Abstracted interface over the external script queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Submit a block's scripts; returns the strictly-increasing
    /// consecutive script indices assigned to them.
    async fn add(
        &self,
        block: &ObservingBlock,
        parameters: &ResolvedParameters,
    ) -> Result<Vec<u32>, QueueError>;

    async fn state(&self) -> Result<QueueState, QueueError>;

    async fn cancel(&self, script_index: u32) -> Result<(), QueueError>;

    /// Drain completion events observed since the last call, in the
    /// order the queue emitted them.
    async fn completions(&self) -> Vec<CompletionEvent>;

    /// Is the queue reachable at all? Checked once on `resume` (§4.5:
    /// "Queue unreachable on resume -> FAULT with NO_QUEUE").
    async fn is_reachable(&self) -> bool;
}
