//! Survey Topology (§3): names of general and sequence proposals,
//! published once at startup. Grounded in
//! `original_source/.../kernel/survey_topology.py`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SurveyTopology {
    pub general_proposals: Vec<String>,
    pub sequence_proposals: Vec<String>,
}

impl SurveyTopology {
    pub fn new(general_proposals: Vec<String>, sequence_proposals: Vec<String>) -> Self {
        Self {
            general_proposals,
            sequence_proposals,
        }
    }

    pub fn num_general_proposals(&self) -> usize {
        self.general_proposals.len()
    }

    pub fn num_sequence_proposals(&self) -> usize {
        self.sequence_proposals.len()
    }
}
