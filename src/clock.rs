//! Time source used for duration fields.

use serde_json::Value;
use std::time::{Duration, SystemTime};

/// Source of "now" for duration computation.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock frozen at one instant, for deterministic durations in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub SystemTime);

impl FixedClock {
    /// A clock frozen `millis` milliseconds after the Unix epoch.
    pub fn at_millis(millis: u64) -> Self {
        Self(SystemTime::UNIX_EPOCH + Duration::from_millis(millis))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Milliseconds from `started_at` to `now`.
///
/// `NaN` when the start time is unknown; negative when `now` precedes the start.
pub fn elapsed_ms(started_at: Option<SystemTime>, now: SystemTime) -> f64 {
    let Some(started_at) = started_at else {
        return f64::NAN;
    };
    match now.duration_since(started_at) {
        Ok(elapsed) => elapsed.as_millis() as f64,
        Err(err) => -(err.duration().as_millis() as f64),
    }
}

/// Record value for a duration: whole milliseconds as an integer, non-finite as `null`.
pub(crate) fn duration_value(ms: f64) -> Value {
    if ms.is_finite() && ms.fract() == 0.0 {
        Value::from(ms as i64)
    } else {
        Value::from(ms)
    }
}
