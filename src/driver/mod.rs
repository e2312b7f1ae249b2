//! Driver Interface (§4.3): abstract contract any scheduling algorithm
//! must satisfy. Concrete astronomical scoring is out of scope
//! (`spec.md` §1); this crate ships three small, deterministic
//! variants that satisfy the contract well enough to exercise the
//! core end-to-end.

mod factory;
mod feature_based;
mod scripted;
mod sequential;
mod survey_topology;
mod target;

pub use factory::build_driver;
pub use feature_based::FeatureBasedDriver;
pub use scripted::ScriptedDriver;
pub use sequential::SequentialDriver;
pub use survey_topology::SurveyTopology;
pub use target::{Target, TargetIdGenerator};

use async_trait::async_trait;

use crate::conditions::ConditionsSnapshot;
use crate::errors::DriverError;

/// One-time configuration payload handed to `configure_scheduler`.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub night_boundary: f64,
    pub new_moon_phase_threshold: f64,
}

/// Tagged-variant contract (§9: "a small set of driver implementations
/// behind a common capability set") that any scheduling algorithm
/// must satisfy.
#[async_trait]
pub trait Driver: Send + Sync {
    /// One-time; returns proposal names for downstream bookkeeping.
    async fn configure_scheduler(
        &mut self,
        config: &DriverConfig,
    ) -> Result<SurveyTopology, DriverError>;

    async fn update_conditions(&mut self, snapshot: &ConditionsSnapshot);

    /// Must be pure with respect to conditions and must not perform
    /// blocking I/O. `None` means "no target this cycle".
    fn select_next_target(&mut self, id_gen: &TargetIdGenerator) -> Result<Option<Target>, DriverError>;

    async fn register_observation(&mut self, target: &Target);

    /// Serialize internal state to an opaque blob.
    async fn save(&self) -> Vec<u8>;

    /// Restore internal state from a previously-saved opaque blob.
    async fn load(&mut self, blob: &[u8]) -> Result<(), DriverError>;

    /// Replay a persisted observation history to rebuild internal
    /// counters (COLD start, §4.9).
    async fn cold_start(&mut self, observations: &[Target]);

    fn name(&self) -> &'static str;
}
