//! Conditions Aggregator (§4.2 "Conditions assembly"): assembles the
//! snapshot handed to the driver from telemetry, observatory state,
//! and alerts, in deterministic order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alerts::TooAlert;
use crate::clock::TaiInstant;
use crate::telemetry::TelemetryStore;

/// Current mount/telescope state, pulled each cycle and advanced to
/// `now` by the (out-of-scope) observatory kinematic model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservatoryState {
    pub az_deg: f64,
    pub el_deg: f64,
    pub filter: String,
    pub tracking: bool,
}

/// One telemetry value as seen by the aggregator: the stream's latest
/// reading plus whether it was flagged stale for having aged past the
/// configured max.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub value: Value,
    pub age_s: f64,
    pub stale: bool,
}

/// The full snapshot handed to `Driver::update_conditions`. Built
/// fresh every cycle; never mutated after construction (§3 invariant:
/// "not mutated during a driver call").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionsSnapshot {
    pub valid_at: f64,
    pub observatory_state: ObservatoryState,
    /// Telemetry streams in configuration order (deterministic
    /// ordering per §4.2).
    pub telemetry: Vec<(String, TelemetryReading)>,
    /// ToO alerts keyed by source, sorted by source for determinism.
    pub too_alerts: BTreeMap<String, TooAlert>,
}

impl ConditionsSnapshot {
    pub fn telemetry_value(&self, name: &str) -> Option<&Value> {
        self.telemetry
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| &r.value)
    }
}

/// Assemble a conditions snapshot: observatory_state first, then each
/// telemetry stream in configuration order, then ToO alerts keyed by
/// source (§4.2). A stream aged past its own configured
/// `stale_after_s` is flagged stale and its last-known value is
/// replaced by the stream's `fill_value` rather than left in place.
pub fn assemble(
    now: TaiInstant,
    observatory_state: ObservatoryState,
    telemetry: &TelemetryStore,
    too_alerts: &[(String, TooAlert)],
) -> ConditionsSnapshot {
    let telemetry_readings = telemetry
        .all_cells()
        .into_iter()
        .map(|(name, cell)| {
            let age_s = cell.age(now).as_secs_f64();
            let decl = telemetry.declaration(&name);
            let stale_after_s = decl.map(|d| d.stale_after_s).unwrap_or(60.0);
            let stale = age_s > stale_after_s || !cell.is_valid;

            let value = if stale {
                decl.and_then(|d| d.fill_value.clone()).unwrap_or(Value::Null)
            } else {
                cell.value.unwrap_or(Value::Null)
            };

            (name, TelemetryReading { value, age_s, stale })
        })
        .collect();

    ConditionsSnapshot {
        valid_at: now.as_seconds(),
        observatory_state,
        telemetry: telemetry_readings,
        too_alerts: too_alerts.iter().cloned().collect(),
    }
}
