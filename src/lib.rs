//! Survey Scheduler Control Core
//!
//! The control core of an astronomical survey scheduler: a CSC-style
//! lifecycle state machine wrapping a production engine that cycles
//! telemetry, target-of-opportunity alerts, and a pluggable driver into
//! a live, recoverable observing queue.
//!
//! ## Architecture
//!
//! - **CSC State Machine** ([`state_machine`]): OFFLINE/STANDBY/
//!   DISABLED/ENABLED/FAULT lifecycle and its commands.
//! - **Model** ([`model`]): owns the driver, runs the per-cycle
//!   telemetry/conditions/selection/submission pipeline.
//! - **Target Production Loops** ([`loops`]): SIMPLE and ADVANCE
//!   strategies layered on the Model.
//! - **Telemetry / Alerts** ([`telemetry`], [`alerts`]): named-stream
//!   polling and target-of-opportunity alert ingestion.
//! - **Persistence** ([`persistence`], [`coldstart`]): driver-state
//!   save/restore and COLD-start replay.
//! - **External Interfaces** ([`events`], [`api`]): published events
//!   and their HTTP/SSE rendering.

pub mod alerts;
pub mod api;
pub mod background;
pub mod block;
pub mod clock;
pub mod coldstart;
pub mod conditions;
pub mod config;
pub mod driver;
pub mod errors;
pub mod events;
pub mod loops;
pub mod model;
pub mod persistence;
pub mod queue;
pub mod state_machine;
pub mod telemetry;

pub use clock::{Clock, SystemClock, TaiInstant};
pub use config::SchedulerConfig;
pub use errors::SchedulerError;
pub use events::{Event, EventBus};
pub use model::Model;
pub use state_machine::{Csc, CscState};
