//! Driver factory (§9: "a single factory keyed by `driver_type`
//! constructs the concrete variant").

use crate::errors::ConfigError;

use super::feature_based::{Candidate, FeatureBasedDriver};
use super::scripted::{ScriptedDriver, ScriptedEntry};
use super::sequential::SequentialDriver;
use super::Driver;

/// Construct the driver named by `driver_type`. Unknown names fail
/// `start` with `ConfigError::UnknownDriver` (§4.2).
pub fn build_driver(driver_type: &str) -> Result<Box<dyn Driver>, ConfigError> {
    match driver_type {
        "sequential" => Ok(Box::new(SequentialDriver::new(vec![(10.0, -20.0), (30.0, -40.0)]))),
        "scripted" => Ok(Box::new(ScriptedDriver::new(vec![ScriptedEntry {
            ra_deg: 15.0,
            dec_deg: -15.0,
            filter: "r".to_string(),
            num_exp: 2,
            exp_time_s: 15.0,
        }]))),
        "feature_based" | "driver" => Ok(Box::new(FeatureBasedDriver::new(vec![
            Candidate {
                ra_deg: 10.0,
                dec_deg: -20.0,
                filter: "r".to_string(),
                base_priority: 1.0,
            },
            Candidate {
                ra_deg: 40.0,
                dec_deg: -10.0,
                filter: "g".to_string(),
                base_priority: 1.2,
            },
        ]))),
        other => Err(ConfigError::UnknownDriver(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_driver_type_is_a_config_error() {
        let err = build_driver("nonexistent").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDriver(name) if name == "nonexistent"));
    }

    #[test]
    fn known_driver_types_build() {
        for name in ["sequential", "scripted", "feature_based", "driver"] {
            assert!(build_driver(name).is_ok(), "expected {name} to build");
        }
    }
}
