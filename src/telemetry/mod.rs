//! Telemetry Stream Handler (§4.6): configurable named streams pulling
//! a column from a time-series database over a trailing window.

mod stream;

pub use stream::{
    InMemoryTimeSeriesSource, SharedTelemetryStore, TelemetryCell, TelemetryStore,
    TimeSeriesSource,
};
