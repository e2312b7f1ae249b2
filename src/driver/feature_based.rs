//! Feature-based driver: scores a small candidate pool against the
//! most recent conditions snapshot (seeing, airmass-adjacent altitude)
//! and picks the best-scoring candidate each cycle. A toy stand-in for
//! real feature-based astronomical scoring, which is out of scope.

use async_trait::async_trait;

use crate::block::ResolvedParameters;
use crate::conditions::ConditionsSnapshot;
use crate::errors::DriverError;

use super::{Driver, DriverConfig, SurveyTopology, Target, TargetIdGenerator};

#[derive(Debug, Clone)]
pub struct Candidate {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub filter: String,
    pub base_priority: f64,
}

pub struct FeatureBasedDriver {
    candidates: Vec<Candidate>,
    last_seeing: f64,
    observed_ids: std::collections::HashSet<u64>,
}

impl FeatureBasedDriver {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            last_seeing: 1.0,
            observed_ids: std::collections::HashSet::new(),
        }
    }

    fn score(&self, candidate: &Candidate) -> f64 {
        // Lower seeing favors higher-priority fields more strongly;
        // a toy stand-in for a real feature-based reward function.
        candidate.base_priority / self.last_seeing.max(0.1)
    }
}

#[async_trait]
impl Driver for FeatureBasedDriver {
    async fn configure_scheduler(
        &mut self,
        _config: &DriverConfig,
    ) -> Result<SurveyTopology, DriverError> {
        if self.candidates.is_empty() {
            return Err(DriverError::SchedulerBuild(
                "feature-based driver configured with no candidates".to_string(),
            ));
        }
        Ok(SurveyTopology::new(
            vec!["FeatureBasedSurvey".to_string()],
            vec!["DeepDrilling".to_string()],
        ))
    }

    async fn update_conditions(&mut self, snapshot: &ConditionsSnapshot) {
        if let Some(seeing) = snapshot.telemetry_value("seeing").and_then(|v| v.as_f64()) {
            self.last_seeing = seeing;
        }
    }

    fn select_next_target(
        &mut self,
        id_gen: &TargetIdGenerator,
    ) -> Result<Option<Target>, DriverError> {
        let best = self
            .candidates
            .iter()
            .max_by(|a, b| self.score(a).partial_cmp(&self.score(b)).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            None => Ok(None),
            Some(candidate) => Ok(Some(Target::new(
                id_gen.next_id(),
                "feature_based_block",
                "FeatureBasedSurvey",
                ResolvedParameters {
                    ra_deg: candidate.ra_deg,
                    dec_deg: candidate.dec_deg,
                    rot_sky_deg: 0.0,
                    band_filter: candidate.filter.clone(),
                    num_exp: 2,
                    exp_times_s: vec![15.0, 15.0],
                    estimated_slew_time_s: 5.0,
                    note: None,
                },
            ))),
        }
    }

    async fn register_observation(&mut self, target: &Target) {
        self.observed_ids.insert(target.id);
    }

    async fn save(&self) -> Vec<u8> {
        let ids: Vec<u64> = self.observed_ids.iter().copied().collect();
        serde_json::json!({ "observed_ids": ids, "last_seeing": self.last_seeing })
            .to_string()
            .into_bytes()
    }

    async fn load(&mut self, blob: &[u8]) -> Result<(), DriverError> {
        let value: serde_json::Value = serde_json::from_slice(blob)
            .map_err(|e| DriverError::ConfigureFailed(format!("bad feature-based driver state: {e}")))?;
        self.observed_ids = value["observed_ids"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_u64()).collect())
            .unwrap_or_default();
        self.last_seeing = value["last_seeing"].as_f64().unwrap_or(1.0);
        Ok(())
    }

    async fn cold_start(&mut self, observations: &[Target]) {
        self.observed_ids = observations.iter().map(|t| t.id).collect();
    }

    fn name(&self) -> &'static str {
        "feature_based"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn picks_highest_scoring_candidate() {
        let mut driver = FeatureBasedDriver::new(vec![
            Candidate { ra_deg: 1.0, dec_deg: 1.0, filter: "r".to_string(), base_priority: 1.0 },
            Candidate { ra_deg: 2.0, dec_deg: 2.0, filter: "g".to_string(), base_priority: 5.0 },
        ]);
        let id_gen = TargetIdGenerator::new();
        let target = driver.select_next_target(&id_gen).unwrap().unwrap();
        assert_eq!(target.resolved.ra_deg, 2.0);
    }

    #[tokio::test]
    async fn errors_when_configured_with_no_candidates() {
        let mut driver = FeatureBasedDriver::new(vec![]);
        let err = driver
            .configure_scheduler(&DriverConfig {
                night_boundary: -12.0,
                new_moon_phase_threshold: 20.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::SchedulerBuild(_)));
    }
}
