//! Persistence / Cold-Warm-Hot Start, COLD branch (§4.9, §3): rebuild a
//! freshly-constructed driver's internal counters by replaying a
//! persisted observation history into `Driver::cold_start`.
//!
//! Grounded on `original_source/.../coldstart/coldstarter.py` and
//! `database.py`, an ad-hoc `sys.argv`-driven SQLite scanner;
//! re-architected per `spec.md` §9 into an explicit trait passed to the
//! constructor rather than a module-level script.
//!
//! Resolves the open question on timestamp preservation: replay
//! presents observations to the driver in their **original** timestamp
//! order and does not rewrite them to "now" (see `SPEC_FULL.md` §4.9).

use async_trait::async_trait;
use thiserror::Error;

use crate::driver::{Driver, Target};

#[derive(Debug, Error)]
pub enum ColdStartError {
    #[error("observation history source unreachable: {0}")]
    Unreachable(String),
    #[error("observation history is corrupt: {0}")]
    Corrupt(String),
}

/// Abstraction over the persisted observation database (out of scope
/// per `spec.md` §1).
#[async_trait]
pub trait ObservationHistorySource: Send + Sync {
    /// Load every observation in the history, paired with its original
    /// event timestamp. Order is not guaranteed by the source; callers
    /// must sort before replaying.
    async fn load(&self, uri: &str) -> Result<Vec<(f64, Target)>, ColdStartError>;
}

/// Deterministic in-memory stand-in for tests and default deployments.
#[derive(Default)]
pub struct InMemoryObservationHistory {
    records: Vec<(f64, Target)>,
}

impl InMemoryObservationHistory {
    pub fn new(records: Vec<(f64, Target)>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ObservationHistorySource for InMemoryObservationHistory {
    async fn load(&self, _uri: &str) -> Result<Vec<(f64, Target)>, ColdStartError> {
        Ok(self.records.clone())
    }
}

/// Replay `uri`'s observation history into `driver` in original
/// timestamp order.
pub async fn cold_start(
    source: &dyn ObservationHistorySource,
    uri: &str,
    driver: &mut dyn Driver,
) -> Result<(), ColdStartError> {
    let mut records = source.load(uri).await?;
    records.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let targets: Vec<Target> = records.into_iter().map(|(_, target)| target).collect();
    driver.cold_start(&targets).await;
    Ok(())
}
