//! Cross-field validation for `SchedulerConfig`, run once before
//! `start` is allowed to move the CSC out of STANDBY. Collects every
//! violation rather than failing on the first, matching the teacher's
//! `well_config.rs::validate()` shape.

use super::{SchedulerConfig, StartupType};
use crate::errors::ConfigError;
use std::collections::HashSet;

pub fn validate(cfg: &SchedulerConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if cfg.n_targets < 1 {
        errors.push("n_targets must be >= 1".to_string());
    }
    if cfg.predicted_scheduler_window_hours <= 0.0 {
        errors.push("predicted_scheduler_window_hours must be > 0".to_string());
    }
    if cfg.loop_sleep_time_s <= 0.0 {
        errors.push("loop_sleep_time_s must be > 0".to_string());
    }
    if cfg.cmd_timeout_s <= 0.0 {
        errors.push("cmd_timeout_s must be > 0".to_string());
    }
    if cfg.max_scripts < 1 {
        errors.push("max_scripts must be >= 1".to_string());
    }
    if !matches!(cfg.mode.as_str(), "SIMPLE" | "ADVANCE") {
        errors.push(format!("mode must be SIMPLE or ADVANCE, got {:?}", cfg.mode));
    }

    match cfg.startup_type() {
        Some(StartupType::Hot) => {}
        Some(_) => {
            if cfg.startup_database.is_none() {
                errors.push(
                    "startup_database is required when startup_type is WARM or COLD".to_string(),
                );
            }
        }
        None => errors.push(format!(
            "startup_type must be HOT, WARM, or COLD, got {:?}",
            cfg.startup_type
        )),
    }

    let mut seen_names = HashSet::new();
    for stream in &cfg.telemetry_streams {
        if !seen_names.insert(stream.name.clone()) {
            errors.push(format!("duplicate telemetry stream name: {}", stream.name));
        }
        if stream.delta_time <= 0.0 {
            errors.push(format!(
                "telemetry stream {} has delta_time <= 0",
                stream.name
            ));
        }
        if stream.columns.is_empty() {
            errors.push(format!("telemetry stream {} declares no columns", stream.name));
        }
    }

    for value in [
        cfg.night_boundary,
        cfg.new_moon_phase_threshold,
        cfg.predicted_scheduler_window_hours,
        cfg.loop_sleep_time_s,
        cfg.cmd_timeout_s,
    ] {
        if !value.is_finite() {
            errors.push(format!("configuration field is not a finite number: {value}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors))
    }
}
