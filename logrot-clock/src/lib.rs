//! Clock abstraction for logrot.
//!
//! Provides a trait for reading the current instant and the local UTC offset,
//! with real and mock implementations to enable deterministic testing of
//! bucket boundaries and retention cutoffs.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, Offset, TimeDelta, TimeZone, Utc};

/// Trait for reading the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant (nanosecond resolution).
    fn now(&self) -> DateTime<Utc>;

    /// Returns the local-to-UTC offset in effect at `at`.
    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset;

    /// Returns the current instant as nanoseconds since the Unix epoch.
    fn now_unix_nanos(&self) -> i64 {
        unix_nanos(self.now())
    }
}

/// Nanoseconds since the Unix epoch, saturating outside the representable range
/// (roughly years 1677..2262).
pub fn unix_nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt()
        .unwrap_or(if t.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

/// Inverse of [`unix_nanos`].
pub fn from_unix_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

fn offset_or_utc(secs: i32) -> FixedOffset {
    FixedOffset::east_opt(secs).unwrap_or_else(|| Utc.fix())
}

/// Real system clock implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset {
        Local.offset_from_utc_datetime(&at.naive_utc()).fix()
    }
}

/// Mock clock for testing.
///
/// Clones share the same instant, so a test can keep one handle and advance
/// time underneath a component holding another.
#[derive(Debug, Clone)]
pub struct MockClock {
    nanos: Arc<AtomicI64>,
    offset_secs: Arc<AtomicI32>,
}

impl MockClock {
    /// Create a mock clock fixed at `at`, with a UTC local offset.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self::from_unix_nanos(unix_nanos(at))
    }

    /// Create a mock clock fixed at a raw nanosecond timestamp.
    pub fn from_unix_nanos(nanos: i64) -> Self {
        Self {
            nanos: Arc::new(AtomicI64::new(nanos)),
            offset_secs: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Builder: report `secs` east of UTC as the local offset.
    ///
    /// Offsets outside a day in either direction fall back to UTC.
    pub fn with_offset_secs(self, secs: i32) -> Self {
        self.set_offset_secs(secs);
        self
    }

    /// Change the reported local offset (e.g. to simulate a DST switch).
    pub fn set_offset_secs(&self, secs: i32) {
        self.offset_secs.store(secs, Ordering::SeqCst);
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        self.nanos.store(unix_nanos(at), Ordering::SeqCst);
    }

    /// Move the clock forward (or backward, for a negative delta).
    pub fn advance(&self, delta: TimeDelta) {
        let step = delta.num_nanoseconds().unwrap_or(i64::MAX);
        self.nanos.fetch_add(step, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        from_unix_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn local_offset(&self, _at: DateTime<Utc>) -> FixedOffset {
        offset_or_utc(self.offset_secs.load(Ordering::SeqCst))
    }
}

/// Mock clock that auto-advances time on each reading.
///
/// Useful for driving a writer across bucket boundaries without touching the
/// clock between calls.
#[derive(Debug)]
pub struct AdvancingClock {
    nanos: AtomicI64,
    step_nanos: i64,
    offset: FixedOffset,
}

impl AdvancingClock {
    /// Create a clock starting at `start` and moving forward by `step` per reading.
    pub fn new(start: DateTime<Utc>, step: TimeDelta) -> Self {
        Self {
            nanos: AtomicI64::new(unix_nanos(start)),
            step_nanos: step.num_nanoseconds().unwrap_or(i64::MAX),
            offset: Utc.fix(),
        }
    }

    /// Builder: report `secs` east of UTC as the local offset.
    pub fn with_offset_secs(mut self, secs: i32) -> Self {
        self.offset = offset_or_utc(secs);
        self
    }
}

impl Clock for AdvancingClock {
    fn now(&self) -> DateTime<Utc> {
        from_unix_nanos(self.nanos.fetch_add(self.step_nanos, Ordering::SeqCst))
    }

    fn local_offset(&self, _at: DateTime<Utc>) -> FixedOffset {
        self.offset
    }
}
