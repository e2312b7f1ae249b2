//! Configuration surface (§6) — `SchedulerConfig`, layered loading,
//! provenance tracking, and whole-config validation.
//!
//! Loading precedence, one field at a time: `SCHEDULER_CONFIG` env var
//! naming a TOML file, else `<config_dir>/scheduler.toml`, else the
//! built-in default. Mirrors the teacher's `well_config.rs` pattern.

mod defaults;
mod validation;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use crate::errors::ConfigError;

/// Declared shape of one telemetry stream (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryStreamConfig {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    #[serde(default = "defaults::delta_time")]
    pub delta_time: f64,
    #[serde(default)]
    pub fill_value: Option<serde_json::Value>,
    /// Age, in seconds, past which this stream's latest value is
    /// flagged stale and replaced by `fill_value` (§4.6).
    #[serde(default = "defaults::stale_after_s")]
    pub stale_after_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupType {
    Hot,
    Warm,
    Cold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Simple,
    Advance,
}

/// Full configuration surface from `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    #[serde(default = "defaults::driver_type")]
    pub driver_type: String,
    #[serde(default = "defaults::night_boundary")]
    pub night_boundary: f64,
    #[serde(default = "defaults::new_moon_phase_threshold")]
    pub new_moon_phase_threshold: f64,
    #[serde(default = "defaults::startup_type")]
    pub startup_type: String,
    #[serde(default)]
    pub startup_database: Option<String>,
    #[serde(default = "defaults::mode")]
    pub mode: String,
    #[serde(default = "defaults::n_targets")]
    pub n_targets: u32,
    #[serde(default = "defaults::predicted_scheduler_window_hours")]
    pub predicted_scheduler_window_hours: f64,
    #[serde(default = "defaults::loop_sleep_time_s")]
    pub loop_sleep_time_s: f64,
    #[serde(default = "defaults::cmd_timeout_s")]
    pub cmd_timeout_s: f64,
    #[serde(default = "defaults::observing_script")]
    pub observing_script: String,
    #[serde(default = "defaults::observing_script_is_standard")]
    pub observing_script_is_standard: bool,
    #[serde(default = "defaults::max_scripts")]
    pub max_scripts: u32,
    #[serde(default)]
    pub telemetry_streams: Vec<TelemetryStreamConfig>,
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default = "defaults::consecutive_telemetry_failures_to_fault")]
    pub consecutive_telemetry_failures_to_fault: u32,
    /// Where to periodically checkpoint driver state (§4.9). `None`
    /// disables periodic checkpointing; a non-`file` scheme here
    /// triggers `largeFileObjectAvailable` on every successful save.
    #[serde(default)]
    pub checkpoint_uri: Option<String>,
    #[serde(default = "defaults::checkpoint_interval_s")]
    pub checkpoint_interval_s: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            driver_type: defaults::driver_type(),
            night_boundary: defaults::night_boundary(),
            new_moon_phase_threshold: defaults::new_moon_phase_threshold(),
            startup_type: defaults::startup_type(),
            startup_database: None,
            mode: defaults::mode(),
            n_targets: defaults::n_targets(),
            predicted_scheduler_window_hours: defaults::predicted_scheduler_window_hours(),
            loop_sleep_time_s: defaults::loop_sleep_time_s(),
            cmd_timeout_s: defaults::cmd_timeout_s(),
            observing_script: defaults::observing_script(),
            observing_script_is_standard: defaults::observing_script_is_standard(),
            max_scripts: defaults::max_scripts(),
            telemetry_streams: Vec::new(),
            s3_bucket: None,
            consecutive_telemetry_failures_to_fault:
                defaults::consecutive_telemetry_failures_to_fault(),
            checkpoint_uri: None,
            checkpoint_interval_s: defaults::checkpoint_interval_s(),
        }
    }
}

impl SchedulerConfig {
    pub fn startup_type(&self) -> Option<StartupType> {
        match self.startup_type.as_str() {
            "HOT" => Some(StartupType::Hot),
            "WARM" => Some(StartupType::Warm),
            "COLD" => Some(StartupType::Cold),
            _ => None,
        }
    }

    pub fn loop_mode(&self) -> Option<LoopMode> {
        match self.mode.as_str() {
            "SIMPLE" => Some(LoopMode::Simple),
            "ADVANCE" => Some(LoopMode::Advance),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)
    }
}

/// Which keys were explicitly present in the loaded TOML vs. defaulted.
/// Diagnostic only — never load-bearing for correctness.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvenance {
    pub explicit_keys: HashSet<String>,
    pub source: ConfigSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    BuiltInDefault,
    EnvVarFile,
    ConfigDirFile,
}

impl ConfigProvenance {
    pub fn is_explicit(&self, key: &str) -> bool {
        self.explicit_keys.contains(key)
    }
}

fn walk_toml_keys(value: &toml::Value, prefix: &str, out: &mut HashSet<String>) {
    if let toml::Value::Table(table) = value {
        for (k, v) in table {
            let full = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            out.insert(full.clone());
            walk_toml_keys(v, &full, out);
        }
    }
}

/// Load configuration with full precedence and provenance tracking.
pub fn load_with_provenance(config_dir: Option<&Path>) -> Result<(SchedulerConfig, ConfigProvenance), ConfigError> {
    if let Ok(path) = std::env::var("SCHEDULER_CONFIG") {
        let (cfg, keys) = load_from_file(Path::new(&path))?;
        return Ok((
            cfg,
            ConfigProvenance {
                explicit_keys: keys,
                source: ConfigSource::EnvVarFile,
            },
        ));
    }

    if let Some(dir) = config_dir {
        let candidate = dir.join("scheduler.toml");
        if candidate.exists() {
            let (cfg, keys) = load_from_file(&candidate)?;
            return Ok((
                cfg,
                ConfigProvenance {
                    explicit_keys: keys,
                    source: ConfigSource::ConfigDirFile,
                },
            ));
        }
    }

    Ok((SchedulerConfig::default(), ConfigProvenance::default()))
}

fn load_from_file(path: &Path) -> Result<(SchedulerConfig, HashSet<String>), ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    let raw: toml::Value = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let mut keys = HashSet::new();
    walk_toml_keys(&raw, "", &mut keys);
    let cfg: SchedulerConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok((cfg, keys))
}

/// Convenience wrapper dropping provenance for callers that don't need it.
pub fn load(config_dir: Option<&Path>) -> Result<SchedulerConfig, ConfigError> {
    load_with_provenance(config_dir).map(|(cfg, _)| cfg)
}

static CONFIG: OnceLock<SchedulerConfig> = OnceLock::new();

/// Install the process-wide configuration singleton. Called once from
/// `main.rs` after `start` has validated it; idempotent no-op if
/// already initialized (first call wins).
pub fn init(cfg: SchedulerConfig) {
    let _ = CONFIG.set(cfg);
}

/// Access the process-wide configuration.
///
/// # Panics
/// Panics if `init` has not been called. Only reachable after `start`
/// completes, so production code paths never hit this before init.
pub fn get() -> &'static SchedulerConfig {
    CONFIG.get().expect("scheduler config accessed before init")
}

pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.driver_type, "driver");
        assert_eq!(cfg.night_boundary, -12.0);
        assert_eq!(cfg.new_moon_phase_threshold, 20.0);
        assert_eq!(cfg.startup_type, "HOT");
        assert_eq!(cfg.n_targets, 1);
        assert_eq!(cfg.predicted_scheduler_window_hours, 2.0);
        assert_eq!(cfg.loop_sleep_time_s, 1.0);
        assert_eq!(cfg.cmd_timeout_s, 60.0);
        assert_eq!(cfg.observing_script, "standard_visit");
        assert!(cfg.observing_script_is_standard);
        assert_eq!(cfg.max_scripts, 100);
    }

    #[test]
    fn loads_from_explicit_file_with_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.toml");
        std::fs::write(&path, "mode = \"ADVANCE\"\nn_targets = 3\n").unwrap();
        let (cfg, prov) = load_with_provenance(Some(dir.path())).unwrap();
        assert_eq!(cfg.mode, "ADVANCE");
        assert_eq!(cfg.n_targets, 3);
        assert!(prov.is_explicit("mode"));
        assert!(prov.is_explicit("n_targets"));
        assert!(!prov.is_explicit("loop_sleep_time_s"));
        assert_eq!(prov.source, ConfigSource::ConfigDirFile);
    }

    #[test]
    fn falls_back_to_default_when_no_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, prov) = load_with_provenance(Some(dir.path())).unwrap();
        assert_eq!(cfg, SchedulerConfig::default());
        assert_eq!(prov.source, ConfigSource::BuiltInDefault);
    }
}
