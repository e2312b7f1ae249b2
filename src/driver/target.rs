//! Target (§3 DATA MODEL): immutable snapshot of a decision, with a
//! strictly-increasing id and an append-only list of queue script
//! indices.

use serde::{Deserialize, Serialize};

use crate::block::ResolvedParameters;

/// Immutable decision snapshot. Queue script indices are appended as
/// the observing block's scripts are submitted; everything else is
/// fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub id: u64,
    pub observing_block_name: String,
    pub program: String,
    pub resolved: ResolvedParameters,
    pub script_indices: Vec<u32>,
}

impl Target {
    pub fn new(id: u64, observing_block_name: impl Into<String>, program: impl Into<String>, resolved: ResolvedParameters) -> Self {
        Self {
            id,
            observing_block_name: observing_block_name.into(),
            program: program.into(),
            resolved,
            script_indices: Vec::new(),
        }
    }

    /// A target "lives in scheduled_targets" only once its queue
    /// script index is known (§3 invariant).
    pub fn is_scheduled(&self) -> bool {
        !self.script_indices.is_empty()
    }

    pub fn append_script_indices(&mut self, indices: &[u32]) {
        self.script_indices.extend_from_slice(indices);
    }
}

/// Strictly-increasing id generator, one per Model/process run (§3:
/// "Target ids strictly increase within a run").
#[derive(Default)]
pub struct TargetIdGenerator {
    next: std::sync::atomic::AtomicU64,
}

impl TargetIdGenerator {
    pub fn new() -> Self {
        Self {
            next: std::sync::atomic::AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}
