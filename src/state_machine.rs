//! CSC State Machine (§4.1): lifecycle states and the commands that
//! transition between them. Re-architected per the class-hierarchy note
//! in `original_source/.../stateMachine/states.py` into a plain enum
//! plus a free transition function — per-state side effects become
//! ordinary methods on `Csc` rather than virtual `do`/`exit` hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::driver::SurveyTopology;
use crate::errors::{self, SchedulerError};
use crate::events::{Event, EventBus};
use crate::model::Model;

/// Lifecycle states (§4.1). `ENABLED(running)` from the transition
/// table is tracked as a separate `running` flag on `Csc` rather than a
/// distinct variant, since it is not a distinct externally-published
/// `summaryState` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CscState {
    Offline,
    Standby,
    Disabled,
    Enabled,
    Fault,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("command {command:?} is not valid in state {state:?}")]
    Invalid { state: CscState, command: &'static str },
}

fn require(state: CscState, expected: CscState, command: &'static str) -> Result<(), TransitionError> {
    if state == expected {
        Ok(())
    } else {
        Err(TransitionError::Invalid { state, command })
    }
}

/// Owns the Model, the active production loop (if any), and publishes
/// `summaryState`/`heartbeat`/`errorCode` through the shared event bus.
/// State is held behind `RwLock`, matching the teacher's
/// `pipeline/state.rs::AppState` sharing pattern for data touched by
/// both command handlers and background tasks.
pub struct Csc {
    state: RwLock<CscState>,
    running: AtomicBool,
    model: RwLock<Option<Arc<Mutex<Model>>>>,
    cancel: RwLock<Option<CancellationToken>>,
    loop_task: RwLock<Option<JoinHandle<()>>>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    last_error: RwLock<Option<(u32, String)>>,
    last_heartbeat_mjd: RwLock<Option<f64>>,
}

impl Csc {
    pub fn new(events: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(CscState::Offline),
            running: AtomicBool::new(false),
            model: RwLock::new(None),
            cancel: RwLock::new(None),
            loop_task: RwLock::new(None),
            events,
            clock,
            last_error: RwLock::new(None),
            last_heartbeat_mjd: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CscState {
        *self.state.read().await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn last_error(&self) -> Option<(u32, String)> {
        self.last_error.read().await.clone()
    }

    /// MJD of the last published heartbeat, or `None` before the first
    /// one (surfaced by `GET /status`).
    pub async fn last_heartbeat_mjd(&self) -> Option<f64> {
        *self.last_heartbeat_mjd.read().await
    }

    async fn set_state(&self, new_state: CscState) {
        *self.state.write().await = new_state;
        info!(state = ?new_state, "summary state changed");
        self.events.publish(Event::SummaryState { state: new_state });
    }

    /// The shared Model handle, once `start` has configured one. Used
    /// by `main.rs` to spawn the alert-polling background task, which
    /// runs independently of whichever production loop is selected.
    pub async fn model_handle(&self) -> Option<Arc<Mutex<Model>>> {
        self.model.read().await.clone()
    }

    pub async fn publish_heartbeat(&self) {
        let mjd = self.clock.now_mjd();
        *self.last_heartbeat_mjd.write().await = Some(mjd);
        self.events.publish(Event::Heartbeat { mjd });
    }

    /// OFFLINE -> STANDBY: "publish valid config labels" (§4.1). No
    /// config labels are modeled explicitly here; the summaryState
    /// transition itself is the published signal.
    pub async fn enter_control(&self) -> Result<(), TransitionError> {
        let mut state = self.state.write().await;
        require(*state, CscState::Offline, "enterControl")?;
        *state = CscState::Standby;
        drop(state);
        info!("entered control, now in STANDBY");
        self.events.publish(Event::SummaryState {
            state: CscState::Standby,
        });
        Ok(())
    }

    /// STANDBY -> DISABLED: validate config (already done by the
    /// caller before constructing `model`); construct Model; configure
    /// Driver. The caller passes in the already-configured `Model` and
    /// the `SurveyTopology` its configure_scheduler call produced.
    pub async fn start(&self, model: Model, topology: SurveyTopology) -> Result<(), TransitionError> {
        let mut state = self.state.write().await;
        require(*state, CscState::Standby, "start")?;
        *self.model.write().await = Some(Arc::new(Mutex::new(model)));
        *state = CscState::Disabled;
        drop(state);
        info!("scheduler configured, now in DISABLED");
        self.events.publish(Event::SummaryState {
            state: CscState::Disabled,
        });
        self.events.publish(Event::SurveyTopology {
            general_proposals: topology.general_proposals,
            sequence_proposals: topology.sequence_proposals,
        });
        Ok(())
    }

    /// DISABLED -> ENABLED: "begin telemetry polling; do not yet run
    /// loop." Poller task lifecycle is owned by the caller (it holds
    /// the `TimeSeriesSource`/`AlertTopicSource` handles); this method
    /// only performs the state transition the pollers key off of.
    pub async fn enable(&self) -> Result<(), TransitionError> {
        let mut state = self.state.write().await;
        require(*state, CscState::Disabled, "enable")?;
        *state = CscState::Enabled;
        drop(state);
        self.events.publish(Event::SummaryState {
            state: CscState::Enabled,
        });
        Ok(())
    }

    /// ENABLED -> ENABLED(running): spawn the production loop task.
    /// `spawn` receives the shared Model handle and a fresh
    /// cancellation token and must return the task's `JoinHandle`; the
    /// concrete loop body (SIMPLE or ADVANCE) lives in `crate::loops`
    /// and is selected by the caller from configuration.
    ///
    /// Also spawns a supervisor that awaits the loop task and promotes
    /// any `Err` it returns to FAULT (§4.5/§7): user-visible behavior
    /// must not depend on whether a caller happens to await the loop
    /// task itself.
    pub async fn resume<F>(self: Arc<Self>, spawn: F, loop_is_advance: bool) -> Result<(), TransitionError>
    where
        F: FnOnce(Arc<Mutex<Model>>, CancellationToken) -> JoinHandle<Result<(), SchedulerError>>,
    {
        let state = *self.state.read().await;
        require(state, CscState::Enabled, "resume")?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let model = self
            .model
            .read()
            .await
            .clone()
            .expect("ENABLED state implies a configured Model");
        let token = CancellationToken::new();
        let handle = spawn(model, token.clone());

        *self.cancel.write().await = Some(token);

        let this = self;
        let supervisor = tokio::spawn(async move {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => this.fault_from_error(&err, loop_is_advance).await,
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    this.fault(errors::codes::SIMPLE_LOOP_ERROR, format!("production loop task panicked: {join_err}"))
                        .await;
                }
            }
        });
        *self.loop_task.write().await = Some(supervisor);
        info!("production loop resumed");
        Ok(())
    }

    /// ENABLED(running) -> ENABLED: cancel the loop at its next
    /// suspension point; in-flight submissions are left to complete
    /// (§4.4/§5). Does not await the task's completion — the loop is
    /// responsible for exiting cleanly on its own schedule.
    pub async fn stop(&self) -> Result<(), TransitionError> {
        let state = *self.state.read().await;
        require(state, CscState::Enabled, "stop")?;
        self.cancel_loop().await;
        info!("production loop stopped");
        Ok(())
    }

    /// ENABLED -> DISABLED: stop the loop (if running) and keep Driver
    /// state resident.
    pub async fn disable(&self) -> Result<(), TransitionError> {
        let mut state = self.state.write().await;
        require(*state, CscState::Enabled, "disable")?;
        self.cancel_loop().await;
        *state = CscState::Disabled;
        drop(state);
        self.events.publish(Event::SummaryState {
            state: CscState::Disabled,
        });
        Ok(())
    }

    /// DISABLED -> STANDBY: release the Driver.
    pub async fn standby(&self) -> Result<(), TransitionError> {
        let mut state = self.state.write().await;
        match *state {
            CscState::Disabled => {
                *self.model.write().await = None;
                *state = CscState::Standby;
            }
            CscState::Fault => {
                *self.last_error.write().await = None;
                *self.model.write().await = None;
                *state = CscState::Standby;
            }
            other => return Err(TransitionError::Invalid { state: other, command: "standby" }),
        }
        drop(state);
        info!("now in STANDBY");
        self.events.publish(Event::SummaryState {
            state: CscState::Standby,
        });
        Ok(())
    }

    /// any -> FAULT: cancel the loop (if running), publish the
    /// errorCode, then publish the summaryState transition (§4.1, §7).
    pub async fn fault(&self, code: u32, reason: impl Into<String>) {
        let reason = reason.into();
        self.cancel_loop().await;
        *self.last_error.write().await = Some((code, reason.clone()));
        *self.state.write().await = CscState::Fault;
        error!(error_code = code, reason = %reason, "scheduler entering FAULT");
        self.events.publish(Event::ErrorCode { code, reason });
        self.events.publish(Event::SummaryState {
            state: CscState::Fault,
        });
    }

    /// Convenience used by the production loop's error-handling arm:
    /// derive the errorCode from a `SchedulerError` and fault with it.
    pub async fn fault_from_error(&self, err: &SchedulerError, loop_is_advance: bool) {
        self.fault(err.code(loop_is_advance), err.to_string()).await;
    }

    async fn cancel_loop(&self) {
        if let Some(token) = self.cancel.write().await.take() {
            token.cancel();
        }
        self.loop_task.write().await.take();
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Pure transition lookup for the §4.1 table, independent of `Csc`'s
/// side effects. Exposed for tests and for callers (e.g. an HTTP
/// command handler) that want to validate a command before dispatching
/// it to `Csc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    EnterControl,
    Start,
    Enable,
    Resume,
    Stop,
    Disable,
    Standby,
    Fault,
}

pub fn transition(state: CscState, running: bool, command: Command) -> Option<(CscState, bool)> {
    use Command::*;
    use CscState::*;
    match (state, running, command) {
        (Offline, false, EnterControl) => Some((Standby, false)),
        (Standby, false, Start) => Some((Disabled, false)),
        (Disabled, false, Enable) => Some((Enabled, false)),
        (Enabled, false, Resume) => Some((Enabled, true)),
        (Enabled, true, Stop) => Some((Enabled, false)),
        (Enabled, _, Disable) => Some((Disabled, false)),
        (Disabled, false, Standby) => Some((Standby, false)),
        (Fault, false, Standby) => Some((Standby, false)),
        (_, running, Fault) => {
            let _ = running;
            Some((Fault, false))
        }
        _ => {
            warn!(?state, running, ?command, "rejected invalid transition");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_enters_control_into_standby() {
        assert_eq!(
            transition(CscState::Offline, false, Command::EnterControl),
            Some((CscState::Standby, false))
        );
    }

    #[test]
    fn fault_reachable_from_any_state() {
        for state in [
            CscState::Offline,
            CscState::Standby,
            CscState::Disabled,
            CscState::Enabled,
        ] {
            assert_eq!(
                transition(state, false, Command::Fault),
                Some((CscState::Fault, false))
            );
        }
    }

    #[test]
    fn resume_then_stop_round_trips_running_flag() {
        let (state, running) = transition(CscState::Disabled, false, Command::Enable).unwrap();
        assert_eq!(state, CscState::Enabled);
        let (state, running) = transition(state, running, Command::Resume).unwrap();
        assert!(running);
        let (state, running) = transition(state, running, Command::Stop).unwrap();
        assert_eq!(state, CscState::Enabled);
        assert!(!running);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        assert_eq!(transition(CscState::Offline, false, Command::Resume), None);
    }

    #[tokio::test]
    async fn csc_walks_offline_to_disabled() {
        use crate::clock::SystemClock;
        use crate::driver::{build_driver, DriverConfig};
        use crate::events::EventBus;
        use crate::queue::InMemoryQueueClient;
        use crate::telemetry::{InMemoryTimeSeriesSource, TelemetryStore};
        use crate::alerts::TooClient;

        let csc = Csc::new(Arc::new(EventBus::default()), Arc::new(SystemClock::new()));
        csc.enter_control().await.unwrap();
        assert_eq!(csc.state().await, CscState::Standby);

        let mut driver = build_driver("sequential").unwrap();
        let topology = driver
            .configure_scheduler(&DriverConfig {
                night_boundary: -12.0,
                new_moon_phase_threshold: 20.0,
            })
            .await
            .unwrap();
        let model = Model::new(
            driver,
            TelemetryStore::new(),
            Arc::new(TooClient::new()),
            Arc::new(InMemoryQueueClient::new()),
            Arc::new(InMemoryTimeSeriesSource::new()),
        );
        csc.start(model, topology).await.unwrap();
        assert_eq!(csc.state().await, CscState::Disabled);
        let _ = errors::codes::NO_QUEUE;
    }
}
