//! Per-stream latest-value cell and the poller that keeps it fresh.
//!
//! Each configured stream is single-writer (its own poller task) and
//! multi-reader (the Model), backed by a `DashMap` entry rather than a
//! dedicated lock — following the teacher's use of `dashmap` for
//! independently-updated, lock-free shared state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{Clock, TaiInstant};
use crate::config::TelemetryStreamConfig;
use crate::errors::TelemetryError;

/// Abstraction over the external time-series database (out of scope
/// per `spec.md` §1; this crate ships only an in-memory stand-in).
#[async_trait]
pub trait TimeSeriesSource: Send + Sync {
    /// Returns true if `table` exists and carries every name in `columns`.
    async fn probe_schema(&self, table: &str, columns: &[String]) -> bool;

    /// Query `[now - delta_time, now]` and return the last row's values,
    /// one per requested column, in the same order. `None` means the
    /// window was empty.
    async fn query_last(
        &self,
        table: &str,
        columns: &[String],
        now: TaiInstant,
        delta_time: f64,
    ) -> Option<Vec<Value>>;
}

/// Deterministic in-memory source for tests and default deployments:
/// callers push rows directly, `query_last` returns the most recent
/// row whose timestamp falls in the requested window.
#[derive(Default)]
pub struct InMemoryTimeSeriesSource {
    rows: DashMap<String, Vec<(f64, Vec<Value>)>>,
    known_tables: DashMap<String, Vec<String>>,
}

impl InMemoryTimeSeriesSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_table(&self, table: &str, columns: &[String]) {
        self.known_tables
            .insert(table.to_string(), columns.to_vec());
    }

    pub fn push_row(&self, table: &str, timestamp: f64, values: Vec<Value>) {
        self.rows.entry(table.to_string()).or_default().push((timestamp, values));
    }
}

#[async_trait]
impl TimeSeriesSource for InMemoryTimeSeriesSource {
    async fn probe_schema(&self, table: &str, columns: &[String]) -> bool {
        match self.known_tables.get(table) {
            Some(known) => columns.iter().all(|c| known.contains(c)),
            None => false,
        }
    }

    async fn query_last(
        &self,
        table: &str,
        _columns: &[String],
        now: TaiInstant,
        delta_time: f64,
    ) -> Option<Vec<Value>> {
        let rows = self.rows.get(table)?;
        let window_start = now.as_seconds() - delta_time;
        rows.iter()
            .filter(|(ts, _)| *ts >= window_start && *ts <= now.as_seconds())
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, values)| values.clone())
    }
}

/// Latest known value for one stream, with staleness derived from the
/// reader's current time rather than stored redundantly.
#[derive(Debug, Clone)]
pub struct TelemetryCell {
    pub value: Option<Value>,
    pub timestamp: TaiInstant,
    pub is_valid: bool,
}

impl TelemetryCell {
    pub fn age(&self, now: TaiInstant) -> Duration {
        now.duration_since(self.timestamp)
    }
}

/// Owns every configured stream's latest-value cell and the probing
/// logic run once at `configure`.
pub struct TelemetryStore {
    declarations: Vec<TelemetryStreamConfig>,
    cells: DashMap<String, TelemetryCell>,
    consecutive_failures: std::sync::atomic::AtomicU32,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self {
            declarations: Vec::new(),
            cells: DashMap::new(),
            consecutive_failures: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Validate and persist stream declarations (§4.6 `configure`).
    pub async fn configure(
        &mut self,
        declarations: Vec<TelemetryStreamConfig>,
        source: &dyn TimeSeriesSource,
    ) -> Result<(), TelemetryError> {
        for decl in &declarations {
            if decl.delta_time <= 0.0 {
                return Err(TelemetryError::SchemaInvalid(format!(
                    "stream {} has non-positive delta_time",
                    decl.name
                )));
            }
            if !source.probe_schema(&decl.table, &decl.columns).await {
                return Err(TelemetryError::MissingColumn {
                    stream: decl.name.clone(),
                    detail: format!("table {} or one of {:?}", decl.table, decl.columns),
                });
            }
        }
        self.declarations = declarations;
        Ok(())
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.declarations.iter().map(|d| d.name.clone()).collect()
    }

    pub fn declaration(&self, name: &str) -> Option<&TelemetryStreamConfig> {
        self.declarations.iter().find(|d| d.name == name)
    }

    /// §4.6 `retrieve_telemetry`: query the trailing window, falling
    /// back to the declared fill value on an empty result.
    pub async fn retrieve_telemetry(
        &self,
        name: &str,
        now: TaiInstant,
        source: &dyn TimeSeriesSource,
    ) -> Result<Value, TelemetryError> {
        let decl = self
            .declaration(name)
            .ok_or_else(|| TelemetryError::UnknownStream(name.to_string()))?;

        let result = source
            .query_last(&decl.table, &decl.columns, now, decl.delta_time)
            .await;

        match result {
            Some(values) => Ok(if values.len() == 1 {
                values.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(values)
            }),
            None => Ok(decl.fill_value.clone().unwrap_or(Value::Null)),
        }
    }

    /// Poll every configured stream once, updating each cell. Returns
    /// `Err` only once `consecutive_telemetry_failures_to_fault` worth
    /// of cycles have all failed; individual stream failures are
    /// logged and the cell keeps its last-known value (§4.2).
    pub async fn update_all(
        &self,
        now: TaiInstant,
        source: &dyn TimeSeriesSource,
        failures_to_fault: u32,
    ) -> Result<(), TelemetryError> {
        let mut any_failed = false;
        for decl in &self.declarations {
            match self.retrieve_telemetry(&decl.name, now, source).await {
                Ok(value) => {
                    let is_valid = !value.is_null();
                    self.cells.insert(
                        decl.name.clone(),
                        TelemetryCell {
                            value: Some(value),
                            timestamp: now,
                            is_valid,
                        },
                    );
                }
                Err(e) => {
                    any_failed = true;
                    warn!(stream = %decl.name, error = %e, "telemetry fetch failed, keeping last-known value");
                }
            }
        }

        if any_failed {
            let count = self
                .consecutive_failures
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                + 1;
            if count >= failures_to_fault {
                return Err(TelemetryError::FetchFailed {
                    stream: "<multiple>".to_string(),
                    reason: format!("{count} consecutive cycles with at least one failing stream"),
                });
            }
        } else {
            self.consecutive_failures
                .store(0, std::sync::atomic::Ordering::SeqCst);
            debug!("telemetry update cycle completed with no failures");
        }
        Ok(())
    }

    pub fn cell(&self, name: &str) -> Option<TelemetryCell> {
        self.cells.get(name).map(|c| c.clone())
    }

    pub fn all_cells(&self) -> Vec<(String, TelemetryCell)> {
        self.declarations
            .iter()
            .filter_map(|d| self.cell(&d.name).map(|c| (d.name.clone(), c)))
            .collect()
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedTelemetryStore = Arc<TelemetryStore>;
