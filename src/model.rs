//! Model / Production Engine (§4.2): owns the Driver, cycles telemetry
//! and conditions, produces target candidates, and reconciles
//! observations against the queue's completion stream.
//!
//! Grounded on `pipeline/coordinator.rs::PipelineCoordinator::process_packet`
//! — a multi-phase per-cycle coordinator owning several collaborators
//! and producing a bounded batch of outputs per call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::alerts::{AlertTopicSource, TooClient};
use crate::block::ObservingBlock;
use crate::clock::{Clock, TaiInstant};
use crate::coldstart::{self, ObservationHistorySource};
use crate::conditions::{self, ConditionsSnapshot, ObservatoryState};
use crate::config::{SchedulerConfig, StartupType};
use crate::driver::{build_driver, Driver, DriverConfig, SurveyTopology, Target, TargetIdGenerator};
use crate::errors::{ConfigError, NonConsecutiveIndexError, ObservatoryStateError, QueueError, SchedulerError};
use crate::persistence::PersistenceRouter;
use crate::queue::QueueClient;
use crate::telemetry::{TelemetryStore, TimeSeriesSource};

/// Out-of-scope collaborator (§1: "the observatory kinematic model"):
/// pulls the current mount state and advances it to `now`. The crate
/// ships only a fixed-state stand-in.
#[async_trait]
pub trait ObservatoryModel: Send + Sync {
    async fn advance_to(&mut self, now: TaiInstant) -> Result<ObservatoryState, ObservatoryStateError>;
}

/// Always reports the same mount pointing; "advancing to now" is a
/// no-op since there is no kinematics to integrate.
pub struct FixedObservatoryModel {
    state: ObservatoryState,
}

impl FixedObservatoryModel {
    pub fn new(state: ObservatoryState) -> Self {
        Self { state }
    }
}

impl Default for FixedObservatoryModel {
    fn default() -> Self {
        Self::new(ObservatoryState {
            az_deg: 0.0,
            el_deg: 90.0,
            filter: "r".to_string(),
            tracking: false,
        })
    }
}

#[async_trait]
impl ObservatoryModel for FixedObservatoryModel {
    async fn advance_to(&mut self, _now: TaiInstant) -> Result<ObservatoryState, ObservatoryStateError> {
        Ok(self.state.clone())
    }
}

const DEFAULT_CONSECUTIVE_TELEMETRY_FAILURES_TO_FAULT: u32 = 3;

pub struct Model {
    driver: Box<dyn Driver>,
    telemetry: TelemetryStore,
    telemetry_source: Arc<dyn TimeSeriesSource>,
    too_client: Arc<TooClient>,
    queue: Arc<dyn QueueClient>,
    observatory: Box<dyn ObservatoryModel>,
    scheduled_targets: Vec<Target>,
    id_gen: TargetIdGenerator,
    consecutive_telemetry_failures_to_fault: u32,
    observing_script: String,
    observing_script_is_standard: bool,
    last_queue_index: Option<u32>,
}

impl Model {
    pub fn new(
        driver: Box<dyn Driver>,
        telemetry: TelemetryStore,
        too_client: Arc<TooClient>,
        queue: Arc<dyn QueueClient>,
        telemetry_source: Arc<dyn TimeSeriesSource>,
    ) -> Self {
        Self {
            driver,
            telemetry,
            telemetry_source,
            too_client,
            queue,
            observatory: Box::new(FixedObservatoryModel::default()),
            scheduled_targets: Vec::new(),
            id_gen: TargetIdGenerator::new(),
            consecutive_telemetry_failures_to_fault: DEFAULT_CONSECUTIVE_TELEMETRY_FAILURES_TO_FAULT,
            observing_script: "standard_visit".to_string(),
            observing_script_is_standard: true,
            last_queue_index: None,
        }
    }

    pub fn with_observatory_model(mut self, observatory: Box<dyn ObservatoryModel>) -> Self {
        self.observatory = observatory;
        self
    }

    pub fn with_observing_script(mut self, path: impl Into<String>, is_standard: bool) -> Self {
        self.observing_script = path.into();
        self.observing_script_is_standard = is_standard;
        self
    }

    /// `configure(params, driver_type, startup_type, startup_db)`
    /// (§4.2): instantiate the Driver by name and bring its internal
    /// state up per the configured startup mode, returning the ready
    /// Model plus the `SurveyTopology` the driver published.
    #[allow(clippy::too_many_arguments)]
    pub async fn configure(
        config: &SchedulerConfig,
        too_client: Arc<TooClient>,
        queue: Arc<dyn QueueClient>,
        telemetry_source: Arc<dyn TimeSeriesSource>,
        persistence: &PersistenceRouter,
        history: Option<&dyn ObservationHistorySource>,
    ) -> Result<(Self, SurveyTopology), SchedulerError> {
        let mut driver = build_driver(&config.driver_type).map_err(SchedulerError::Config)?;

        let topology = driver
            .configure_scheduler(&DriverConfig {
                night_boundary: config.night_boundary,
                new_moon_phase_threshold: config.new_moon_phase_threshold,
            })
            .await
            .map_err(SchedulerError::Driver)?;

        let startup_type = config.startup_type().ok_or_else(|| {
            SchedulerError::Config(ConfigError::Schema(format!(
                "unknown startup_type {}",
                config.startup_type
            )))
        })?;

        match startup_type {
            StartupType::Hot => {
                info!("HOT start: driver begins with default internal state");
            }
            StartupType::Warm => {
                let uri = config.startup_database.as_deref().ok_or_else(|| {
                    SchedulerError::Config(ConfigError::Schema(
                        "WARM startup requires startup_database".to_string(),
                    ))
                })?;
                let blob = persistence
                    .load(uri)
                    .await
                    .map_err(|e| SchedulerError::Config(ConfigError::UnreachableUri(e.to_string())))?;
                driver.load(&blob).await.map_err(SchedulerError::Driver)?;
                info!(uri, "WARM start: driver state restored from URI");
            }
            StartupType::Cold => {
                let uri = config.startup_database.as_deref().ok_or_else(|| {
                    SchedulerError::Config(ConfigError::Schema(
                        "COLD startup requires startup_database".to_string(),
                    ))
                })?;
                let history = history.ok_or_else(|| {
                    SchedulerError::Config(ConfigError::Schema(
                        "COLD startup requires an observation history source".to_string(),
                    ))
                })?;
                coldstart::cold_start(history, uri, driver.as_mut())
                    .await
                    .map_err(|e| SchedulerError::Config(ConfigError::UnreachableUri(e.to_string())))?;
                info!(uri, "COLD start: driver counters rebuilt from observation history");
            }
        }

        let mut telemetry = TelemetryStore::new();
        telemetry
            .configure(config.telemetry_streams.clone(), telemetry_source.as_ref())
            .await
            .map_err(SchedulerError::Telemetry)?;

        let model = Self {
            driver,
            telemetry,
            telemetry_source,
            too_client,
            queue,
            observatory: Box::new(FixedObservatoryModel::default()),
            scheduled_targets: Vec::new(),
            id_gen: TargetIdGenerator::new(),
            consecutive_telemetry_failures_to_fault: config.consecutive_telemetry_failures_to_fault,
            observing_script: config.observing_script.clone(),
            observing_script_is_standard: config.observing_script_is_standard,
            last_queue_index: None,
        };

        Ok((model, topology))
    }

    pub fn scheduled_targets(&self) -> &[Target] {
        &self.scheduled_targets
    }

    /// `update_telemetry()` (§4.2): non-fatal unless it has failed for
    /// `consecutive_telemetry_failures_to_fault` cycles running.
    pub async fn update_telemetry(&self, now: TaiInstant) -> Result<(), SchedulerError> {
        self.telemetry
            .update_all(now, self.telemetry_source.as_ref(), self.consecutive_telemetry_failures_to_fault)
            .await
            .map_err(SchedulerError::Telemetry)
    }

    /// `synchronize_observatory_model(now)` (§4.2).
    pub async fn synchronize_observatory_model(&mut self, now: TaiInstant) -> Result<ObservatoryState, SchedulerError> {
        self.observatory
            .advance_to(now)
            .await
            .map_err(SchedulerError::ObservatoryState)
    }

    /// Poll the ToO topic once, folding any new payloads into the
    /// shared alert map the conditions aggregator reads from.
    pub async fn poll_alerts(&self, source: &dyn AlertTopicSource) {
        self.too_client.poll_once(source).await;
    }

    /// Sources with a currently-active alert, for diagnostics and tests.
    pub fn active_alert_sources(&self) -> Vec<String> {
        self.too_client.get_too_alerts().into_iter().map(|(source, _)| source).collect()
    }

    /// `update_conditions(snapshot)` (§4.2): assemble the snapshot and
    /// hand it to the driver.
    pub async fn update_conditions(&mut self, now: TaiInstant, observatory_state: ObservatoryState) -> ConditionsSnapshot {
        let too_alerts = self.too_client.get_too_alerts();
        let snapshot = conditions::assemble(now, observatory_state, &self.telemetry, &too_alerts);
        self.driver.update_conditions(&snapshot).await;
        snapshot
    }

    /// `select_next_targets(now, n)` (§4.2): up to `n` targets, never
    /// partial — a full contiguous prefix or empty.
    pub fn select_next_targets(&mut self, n: u32) -> Result<Vec<Target>, SchedulerError> {
        let mut out = Vec::new();
        for _ in 0..n {
            match self.driver.select_next_target(&self.id_gen) {
                Ok(Some(target)) => out.push(target),
                Ok(None) => break,
                Err(e) => return Err(SchedulerError::Driver(e)),
            }
        }
        Ok(out)
    }

    /// Submit `target`'s observing block to the queue, recording its
    /// script indices and registering it as scheduled. Grounds §4.4
    /// step 4 and §4.5 step 5.
    ///
    /// Failure semantics (§4.5): a rejected submission is retried once
    /// before faulting; a second rejection promotes to PUT_ON_QUEUE
    /// regardless of the underlying failure.
    pub async fn submit_target(&mut self, mut target: Target, block: &ObservingBlock) -> Result<Target, SchedulerError> {
        let resolved = target.resolved.clone();
        let indices = match self.queue.add(block, &resolved).await {
            Ok(indices) => indices,
            Err(first_err) => {
                warn!(target_id = target.id, error = %first_err, "queue rejected submission, retrying once");
                self.queue.add(block, &resolved).await.map_err(|second_err| {
                    SchedulerError::Queue(QueueError::PutOnQueue(format!(
                        "submission rejected twice (first: {first_err}; second: {second_err})"
                    )))
                })?
            }
        };

        let expected_first = self.last_queue_index.map(|i| i + 1).unwrap_or_else(|| indices.first().copied().unwrap_or(0));
        let mut expected = expected_first;
        for &idx in &indices {
            if idx != expected {
                return Err(SchedulerError::NonConsecutiveIndex(NonConsecutiveIndexError {
                    expected,
                    got: idx,
                }));
            }
            expected += 1;
        }
        self.last_queue_index = indices.last().copied().or(self.last_queue_index);

        target.append_script_indices(&indices);
        self.scheduled_targets.push(target.clone());
        debug!(target_id = target.id, ?indices, "target submitted to queue");
        Ok(target)
    }

    /// `register_observation(obs)` (§4.2): idempotent, keyed by queue
    /// script index.
    pub async fn register_observation(&mut self, script_index: u32) {
        if let Some(pos) = self
            .scheduled_targets
            .iter()
            .position(|t| t.script_indices.contains(&script_index))
        {
            let target = self.scheduled_targets.remove(pos);
            self.driver.register_observation(&target).await;
            info!(target_id = target.id, script_index, "observation registered");
        } else {
            warn!(script_index, "unmatched completion event, ignoring");
        }
    }

    /// Observation reconciliation (§4.2): drain the queue's completion
    /// stream and register each against `scheduled_targets`, in the
    /// order the queue emitted them.
    pub async fn reconcile_observations(&mut self) -> Result<(), SchedulerError> {
        let completions = self.queue.completions().await;
        for completion in completions {
            self.register_observation(completion.script_index).await;
        }
        Ok(())
    }

    /// `generate_target_queue(already_scheduled, n)` (§4.2): the
    /// composite per-cycle operation. Returns up to `n` freshly
    /// submitted targets.
    pub async fn generate_target_queue(&mut self, now: TaiInstant, n: u32) -> Result<Vec<Target>, SchedulerError> {
        self.update_telemetry(now).await?;
        let observatory_state = self.synchronize_observatory_model(now).await?;
        self.reconcile_observations().await?;
        self.update_conditions(now, observatory_state).await;

        let candidates = self.select_next_targets(n)?;
        let mut submitted = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let block = self.default_observing_block(&candidate.program);
            submitted.push(self.submit_target(candidate, &block).await?);
        }
        Ok(submitted)
    }

    /// `save_state(uri)` (§4.9): persist the driver's opaque blob.
    pub async fn save_state(&self, uri: &str, persistence: &PersistenceRouter) -> Result<Option<String>, SchedulerError> {
        let blob = self.driver.save().await;
        persistence
            .save(uri, &blob)
            .await
            .map_err(|e| SchedulerError::Config(ConfigError::UnreachableUri(e.to_string())))
    }

    /// `load_state(uri)` (§4.9).
    pub async fn load_state(&mut self, uri: &str, persistence: &PersistenceRouter) -> Result<(), SchedulerError> {
        let blob = persistence
            .load(uri)
            .await
            .map_err(|e| SchedulerError::Config(ConfigError::UnreachableUri(e.to_string())))?;
        self.driver.load(&blob).await.map_err(SchedulerError::Driver)
    }

    /// Queue unreachable on resume (§4.5 failure semantics).
    pub async fn ensure_queue_reachable(&self) -> Result<(), SchedulerError> {
        if self.queue.is_reachable().await {
            Ok(())
        } else {
            Err(SchedulerError::Queue(QueueError::NoQueue))
        }
    }

    pub fn default_observing_block(&self, program: &str) -> ObservingBlock {
        ObservingBlock::new(format!("{program}-{}", self.observing_script), program).with_script(
            crate::block::ScriptSpec {
                path: self.observing_script.clone(),
                is_standard: self.observing_script_is_standard,
                parameters: [
                    ("ra".to_string(), serde_json::json!("$ra")),
                    ("dec".to_string(), serde_json::json!("$dec")),
                    ("rot_sky".to_string(), serde_json::json!("$rot_sky")),
                    ("band_filter".to_string(), serde_json::json!("$band_filter")),
                    ("exp_times".to_string(), serde_json::json!("$exp_times")),
                ]
                .into_iter()
                .collect(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ResolvedParameters;
    use crate::clock::MockClock;
    use crate::driver::SequentialDriver;
    use crate::errors::codes;
    use crate::queue::InMemoryQueueClient;
    use crate::telemetry::InMemoryTimeSeriesSource;

    fn new_model() -> Model {
        Model::new(
            Box::new(SequentialDriver::new(vec![(10.0, -20.0), (30.0, -40.0)])),
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            Arc::new(InMemoryQueueClient::new()),
            Arc::new(InMemoryTimeSeriesSource::new()),
        )
    }

    #[tokio::test]
    async fn generate_target_queue_submits_up_to_n_targets() {
        let mut model = new_model();
        let clock = MockClock::new(1_000);
        let submitted = model.generate_target_queue(clock.now(), 2).await.unwrap();
        assert_eq!(submitted.len(), 2);
        assert_eq!(model.scheduled_targets().len(), 2);
        for target in &submitted {
            assert!(!target.script_indices.is_empty());
        }
    }

    #[tokio::test]
    async fn register_observation_is_idempotent() {
        let mut model = new_model();
        let clock = MockClock::new(1_000);
        let submitted = model.generate_target_queue(clock.now(), 1).await.unwrap();
        let index = submitted[0].script_indices[0];

        model.register_observation(index).await;
        assert!(model.scheduled_targets().is_empty());
        model.register_observation(index).await;
        assert!(model.scheduled_targets().is_empty());
    }

    #[tokio::test]
    async fn unmatched_completion_does_not_panic() {
        let mut model = new_model();
        model.register_observation(9999).await;
        assert!(model.scheduled_targets().is_empty());
    }

    #[tokio::test]
    async fn ensure_queue_reachable_fails_when_queue_offline() {
        let queue = Arc::new(InMemoryQueueClient::new());
        queue.set_reachable(false);
        let model = Model::new(
            Box::new(SequentialDriver::new(vec![(1.0, 1.0)])),
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            queue,
            Arc::new(InMemoryTimeSeriesSource::new()),
        );
        let err = model.ensure_queue_reachable().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Queue(QueueError::NoQueue)));
    }

    #[tokio::test]
    async fn submit_target_retries_once_after_a_single_rejection() {
        let queue = Arc::new(InMemoryQueueClient::new());
        let mut model = Model::new(
            Box::new(SequentialDriver::new(vec![(1.0, 1.0)])),
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            queue.clone(),
            Arc::new(InMemoryTimeSeriesSource::new()),
        );
        queue.fail_next_add();

        let clock = MockClock::new(1_000);
        let submitted = model.generate_target_queue(clock.now(), 1).await.unwrap();
        assert_eq!(submitted.len(), 1);
        assert!(!submitted[0].script_indices.is_empty());
    }

    #[tokio::test]
    async fn submit_target_faults_with_put_on_queue_after_two_rejections() {
        let queue = Arc::new(InMemoryQueueClient::new());
        let mut model = Model::new(
            Box::new(SequentialDriver::new(vec![(1.0, 1.0)])),
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            queue.clone(),
            Arc::new(InMemoryTimeSeriesSource::new()),
        );
        queue.set_reachable(false);

        let clock = MockClock::new(1_000);
        let err = model.generate_target_queue(clock.now(), 1).await.unwrap_err();
        assert_eq!(err.code(false), codes::PUT_ON_QUEUE);
    }

    #[tokio::test]
    async fn submit_target_rejects_non_consecutive_indices_from_a_misbehaving_queue() {
        struct SkippingQueue;

        #[async_trait]
        impl QueueClient for SkippingQueue {
            async fn add(
                &self,
                _block: &ObservingBlock,
                _parameters: &ResolvedParameters,
            ) -> Result<Vec<u32>, QueueError> {
                Ok(vec![1, 3])
            }

            async fn state(&self) -> Result<crate::queue::QueueState, QueueError> {
                Ok(crate::queue::QueueState {
                    executing_index: None,
                    queued_indices: Vec::new(),
                    finished: false,
                })
            }

            async fn cancel(&self, _script_index: u32) -> Result<(), QueueError> {
                Ok(())
            }

            async fn completions(&self) -> Vec<crate::queue::CompletionEvent> {
                Vec::new()
            }

            async fn is_reachable(&self) -> bool {
                true
            }
        }

        let mut model = Model::new(
            Box::new(SequentialDriver::new(vec![(1.0, 1.0)])),
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            Arc::new(SkippingQueue),
            Arc::new(InMemoryTimeSeriesSource::new()),
        );

        let clock = MockClock::new(1_000);
        let err = model.generate_target_queue(clock.now(), 1).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NonConsecutiveIndex(NonConsecutiveIndexError { expected: 2, got: 3 })));
    }
}
