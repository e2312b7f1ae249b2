//! Scripted driver: reads a flat, pre-built list of targets (as if
//! loaded from a target list file) and dispatches them in order, one
//! per call, without consulting conditions. Grounded in
//! `original_source/.../proposals/scripted.py`, which reads a flat
//! target file of (fieldid, filter, ra_rad, dec_rad, ...) rows.

use async_trait::async_trait;

use crate::block::ResolvedParameters;
use crate::conditions::ConditionsSnapshot;
use crate::errors::DriverError;

use super::{Driver, DriverConfig, SurveyTopology, Target, TargetIdGenerator};

/// One row of a scripted target list.
#[derive(Debug, Clone)]
pub struct ScriptedEntry {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub filter: String,
    pub num_exp: u32,
    pub exp_time_s: f64,
}

pub struct ScriptedDriver {
    entries: Vec<ScriptedEntry>,
    cursor: usize,
}

impl ScriptedDriver {
    pub fn new(entries: Vec<ScriptedEntry>) -> Self {
        Self { entries, cursor: 0 }
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn configure_scheduler(
        &mut self,
        _config: &DriverConfig,
    ) -> Result<SurveyTopology, DriverError> {
        Ok(SurveyTopology::new(vec!["ScriptedSurvey".to_string()], vec![]))
    }

    async fn update_conditions(&mut self, _snapshot: &ConditionsSnapshot) {}

    fn select_next_target(
        &mut self,
        id_gen: &TargetIdGenerator,
    ) -> Result<Option<Target>, DriverError> {
        if self.cursor >= self.entries.len() {
            return Ok(None); // list exhausted: depletion signal
        }
        let entry = self.entries[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(Target::new(
            id_gen.next_id(),
            "scripted_block",
            "ScriptedSurvey",
            ResolvedParameters {
                ra_deg: entry.ra_deg,
                dec_deg: entry.dec_deg,
                rot_sky_deg: 0.0,
                band_filter: entry.filter,
                num_exp: entry.num_exp,
                exp_times_s: vec![entry.exp_time_s; entry.num_exp as usize],
                estimated_slew_time_s: 5.0,
                note: None,
            },
        )))
    }

    async fn register_observation(&mut self, _target: &Target) {}

    async fn save(&self) -> Vec<u8> {
        serde_json::json!({ "cursor": self.cursor }).to_string().into_bytes()
    }

    async fn load(&mut self, blob: &[u8]) -> Result<(), DriverError> {
        let value: serde_json::Value = serde_json::from_slice(blob)
            .map_err(|e| DriverError::ConfigureFailed(format!("bad scripted driver state: {e}")))?;
        self.cursor = value["cursor"].as_u64().unwrap_or(0) as usize;
        Ok(())
    }

    async fn cold_start(&mut self, observations: &[Target]) {
        self.cursor = observations.len().min(self.entries.len());
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
