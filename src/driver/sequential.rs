//! Sequential driver: walks a fixed, configured list of sky positions
//! in order, wrapping once exhausted. The simplest variant satisfying
//! the Driver contract — no conditions-based scoring at all.

use async_trait::async_trait;

use crate::block::ResolvedParameters;
use crate::conditions::ConditionsSnapshot;
use crate::errors::DriverError;

use super::{Driver, DriverConfig, SurveyTopology, Target, TargetIdGenerator};

pub struct SequentialDriver {
    positions: Vec<(f64, f64)>,
    cursor: usize,
    observed_count: u64,
}

impl SequentialDriver {
    pub fn new(positions: Vec<(f64, f64)>) -> Self {
        Self {
            positions,
            cursor: 0,
            observed_count: 0,
        }
    }
}

#[async_trait]
impl Driver for SequentialDriver {
    async fn configure_scheduler(
        &mut self,
        _config: &DriverConfig,
    ) -> Result<SurveyTopology, DriverError> {
        if self.positions.is_empty() {
            return Err(DriverError::ConfigureFailed(
                "sequential driver requires at least one position".to_string(),
            ));
        }
        Ok(SurveyTopology::new(
            vec!["SequentialSurvey".to_string()],
            vec![],
        ))
    }

    async fn update_conditions(&mut self, _snapshot: &ConditionsSnapshot) {}

    fn select_next_target(
        &mut self,
        id_gen: &TargetIdGenerator,
    ) -> Result<Option<Target>, DriverError> {
        if self.positions.is_empty() {
            return Ok(None);
        }
        let (ra_deg, dec_deg) = self.positions[self.cursor % self.positions.len()];
        self.cursor += 1;
        Ok(Some(Target::new(
            id_gen.next_id(),
            "sequential_block",
            "SequentialSurvey",
            ResolvedParameters {
                ra_deg,
                dec_deg,
                rot_sky_deg: 0.0,
                band_filter: "r".to_string(),
                num_exp: 2,
                exp_times_s: vec![15.0, 15.0],
                estimated_slew_time_s: 5.0,
                note: None,
            },
        )))
    }

    async fn register_observation(&mut self, _target: &Target) {
        self.observed_count += 1;
    }

    async fn save(&self) -> Vec<u8> {
        serde_json::json!({ "cursor": self.cursor, "observed_count": self.observed_count })
            .to_string()
            .into_bytes()
    }

    async fn load(&mut self, blob: &[u8]) -> Result<(), DriverError> {
        let value: serde_json::Value = serde_json::from_slice(blob)
            .map_err(|e| DriverError::ConfigureFailed(format!("bad sequential driver state: {e}")))?;
        self.cursor = value["cursor"].as_u64().unwrap_or(0) as usize;
        self.observed_count = value["observed_count"].as_u64().unwrap_or(0);
        Ok(())
    }

    async fn cold_start(&mut self, observations: &[Target]) {
        self.observed_count = observations.len() as u64;
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wraps_around_position_list() {
        let mut driver = SequentialDriver::new(vec![(1.0, 1.0), (2.0, 2.0)]);
        let id_gen = TargetIdGenerator::new();
        let t1 = driver.select_next_target(&id_gen).unwrap().unwrap();
        let t2 = driver.select_next_target(&id_gen).unwrap().unwrap();
        let t3 = driver.select_next_target(&id_gen).unwrap().unwrap();
        assert_eq!(t1.resolved.ra_deg, 1.0);
        assert_eq!(t2.resolved.ra_deg, 2.0);
        assert_eq!(t3.resolved.ra_deg, 1.0);
    }

    #[tokio::test]
    async fn round_trip_save_load_preserves_cursor() {
        let mut driver = SequentialDriver::new(vec![(1.0, 1.0), (2.0, 2.0)]);
        let id_gen = TargetIdGenerator::new();
        driver.select_next_target(&id_gen).unwrap();
        let blob = driver.save().await;

        let mut restored = SequentialDriver::new(vec![(1.0, 1.0), (2.0, 2.0)]);
        restored.load(&blob).await.unwrap();
        let next_a = driver.select_next_target(&id_gen).unwrap().unwrap();
        let next_b = restored.select_next_target(&id_gen).unwrap().unwrap();
        assert_eq!(next_a.resolved.ra_deg, next_b.resolved.ra_deg);
    }
}
