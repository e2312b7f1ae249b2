//! Clock & Time Source: monotonic TAI seconds and MJD conversion.
//!
//! Every duration/age computation in the crate goes through TAI
//! seconds; MJD is derived only at the event-publishing boundary,
//! where downstream consumers expect Modified Julian Date.

use std::time::Duration;

/// MJD of the Unix epoch (1970-01-01T00:00:00Z), used to derive MJD
/// from a wall-clock `chrono::DateTime<Utc>` without a TAI-UTC leap
/// second table — good enough for scheduling granularity, not for
/// sub-second timing.
const MJD_UNIX_EPOCH: f64 = 40_587.0;

/// A monotonic instant expressed as TAI seconds since an arbitrary,
/// process-local epoch. Only differences between `TaiInstant`s are
/// meaningful; absolute values are not comparable across processes.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TaiInstant(f64);

impl TaiInstant {
    pub fn from_seconds(seconds: f64) -> Self {
        Self(seconds)
    }

    pub fn as_seconds(self) -> f64 {
        self.0
    }

    pub fn duration_since(self, earlier: TaiInstant) -> Duration {
        Duration::from_secs_f64((self.0 - earlier.0).max(0.0))
    }

    pub fn elapsed_since(self, now: TaiInstant) -> Duration {
        now.duration_since(self)
    }
}

/// Injectable time source; production code uses `SystemClock`, tests
/// use `MockClock` to drive deterministic cycles.
pub trait Clock: Send + Sync {
    fn now(&self) -> TaiInstant;

    /// Modified Julian Date corresponding to `now()`, for event payloads.
    fn now_mjd(&self) -> f64 {
        unix_seconds_to_mjd(self.now().as_seconds())
    }
}

fn unix_seconds_to_mjd(unix_seconds: f64) -> f64 {
    MJD_UNIX_EPOCH + unix_seconds / 86_400.0
}

/// Real clock backed by the OS monotonic/wall clock.
pub struct SystemClock {
    start: std::time::Instant,
    start_unix: f64,
}

impl SystemClock {
    pub fn new() -> Self {
        let start_unix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self {
            start: std::time::Instant::now(),
            start_unix,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> TaiInstant {
        TaiInstant::from_seconds(self.start_unix + self.start.elapsed().as_secs_f64())
    }
}

/// Deterministic clock for tests: advances only when told to.
pub struct MockClock {
    seconds: std::sync::atomic::AtomicU64,
}

impl MockClock {
    pub fn new(start_seconds: u64) -> Self {
        Self {
            seconds: std::sync::atomic::AtomicU64::new(start_seconds),
        }
    }

    pub fn advance(&self, delta: Duration) {
        self.seconds
            .fetch_add(delta.as_secs(), std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, seconds: u64) {
        self.seconds.store(seconds, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> TaiInstant {
        TaiInstant::from_seconds(self.seconds.load(std::sync::atomic::Ordering::SeqCst) as f64)
    }
}
