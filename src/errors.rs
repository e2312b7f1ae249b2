//! Error taxonomy for the scheduler control core.
//!
//! One `thiserror` enum per taxonomy entry, each carrying the numeric
//! event code it promotes to when it reaches the production loop's
//! catch-all. `SchedulerError` is the loop-facing union; `anyhow` is
//! used only at the CLI boundary in `main.rs`.

use thiserror::Error;

/// Numeric error codes published on the `errorCode` event.
pub mod codes {
    pub const NO_QUEUE: u32 = 300;
    pub const PUT_ON_QUEUE: u32 = 301;
    pub const UPDATE_TELEMETRY_ERROR: u32 = 302;
    pub const SIMPLE_LOOP_ERROR: u32 = 400;
    pub const ADVANCE_LOOP_ERROR: u32 = 401;
    pub const UNABLE_TO_FIND_TARGET: u32 = 402;
    pub const OBSERVATORY_STATE_UPDATE: u32 = 500;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration schema violation: {0}")]
    Schema(String),
    #[error("unknown driver type: {0}")]
    UnknownDriver(String),
    #[error("unreachable startup URI: {0}")]
    UnreachableUri(String),
    #[error("configuration invalid: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("io error reading configuration: {0}")]
    Io(String),
    #[error("could not parse configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry stream {stream} fetch failed: {reason}")]
    FetchFailed { stream: String, reason: String },
    #[error("unknown telemetry stream: {0}")]
    UnknownStream(String),
    #[error("telemetry declaration schema invalid: {0}")]
    SchemaInvalid(String),
    #[error("telemetry stream {stream} missing table/column: {detail}")]
    MissingColumn { stream: String, detail: String },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("script queue unreachable")]
    NoQueue,
    #[error("submission to script queue failed: {0}")]
    PutOnQueue(String),
    #[error("queue returned non-consecutive script indices starting at {first}: {indices:?}")]
    NonConsecutiveIndex { first: u32, indices: Vec<u32> },
    #[error("queue timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl QueueError {
    pub fn code(&self) -> u32 {
        match self {
            QueueError::NoQueue => codes::NO_QUEUE,
            QueueError::PutOnQueue(_) | QueueError::Timeout(_) => codes::PUT_ON_QUEUE,
            QueueError::NonConsecutiveIndex { .. } => codes::PUT_ON_QUEUE,
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("scheduler build failed: {0}")]
    SchedulerBuild(String),
    #[error("driver raised during select_next_target: {0}")]
    SelectionFailed(String),
    #[error("driver raised during configure_scheduler: {0}")]
    ConfigureFailed(String),
}

#[derive(Debug, Error)]
#[error("queue add returned non-consecutive indices: expected {expected}, got {got}")]
pub struct NonConsecutiveIndexError {
    pub expected: u32,
    pub got: u32,
}

#[derive(Debug, Error)]
pub enum ObservatoryStateError {
    #[error("observatory state telemetry unusable: {0}")]
    Unusable(String),
}

/// Union of all errors a production loop cycle can raise, each
/// already carrying (or able to derive) the errorCode it promotes to.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    NonConsecutiveIndex(#[from] NonConsecutiveIndexError),
    #[error(transparent)]
    ObservatoryState(#[from] ObservatoryStateError),
}

impl SchedulerError {
    /// The numeric errorCode this failure promotes the CSC to FAULT with,
    /// given which production loop observed it (§4.5 failure semantics).
    pub fn code(&self, loop_is_advance: bool) -> u32 {
        match self {
            SchedulerError::Config(_) => codes::NO_QUEUE,
            SchedulerError::Telemetry(_) => codes::UPDATE_TELEMETRY_ERROR,
            SchedulerError::Queue(q) => q.code(),
            SchedulerError::Driver(DriverError::SelectionFailed(_)) => {
                if loop_is_advance {
                    codes::ADVANCE_LOOP_ERROR
                } else {
                    codes::UNABLE_TO_FIND_TARGET
                }
            }
            SchedulerError::Driver(_) => {
                if loop_is_advance {
                    codes::ADVANCE_LOOP_ERROR
                } else {
                    codes::SIMPLE_LOOP_ERROR
                }
            }
            SchedulerError::NonConsecutiveIndex(_) => codes::PUT_ON_QUEUE,
            SchedulerError::ObservatoryState(_) => codes::OBSERVATORY_STATE_UPDATE,
        }
    }
}
