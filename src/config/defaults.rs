//! Default value functions for `#[serde(default = "...")]` fields in
//! `SchedulerConfig`. Kept separate from `mod.rs` so the field list
//! there reads as a table of names and defaults, not a mix of fields
//! and inline closures.

pub fn driver_type() -> String {
    "driver".to_string()
}

pub fn night_boundary() -> f64 {
    -12.0
}

pub fn new_moon_phase_threshold() -> f64 {
    20.0
}

pub fn startup_type() -> String {
    "HOT".to_string()
}

pub fn mode() -> String {
    "SIMPLE".to_string()
}

pub fn n_targets() -> u32 {
    1
}

pub fn predicted_scheduler_window_hours() -> f64 {
    2.0
}

pub fn loop_sleep_time_s() -> f64 {
    1.0
}

pub fn cmd_timeout_s() -> f64 {
    60.0
}

pub fn observing_script() -> String {
    "standard_visit".to_string()
}

pub fn observing_script_is_standard() -> bool {
    true
}

pub fn max_scripts() -> u32 {
    100
}

pub fn delta_time() -> f64 {
    1.0
}

pub fn stale_after_s() -> f64 {
    60.0
}

pub fn checkpoint_interval_s() -> f64 {
    300.0
}

pub fn consecutive_telemetry_failures_to_fault() -> u32 {
    5
}
