use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of one processing batch as reported by the scheduler.
///
/// Also used as the "work cadence" hint pushed to node aggregators, and to
/// derive the rebalance timer schedule.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchDuration {
    millis: u64,
}

impl BatchDuration {
    pub const ZERO: BatchDuration = BatchDuration { millis: 0 };

    pub const fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.millis as f64 / 1_000.0
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    pub fn as_std(&self) -> Duration {
        Duration::from_millis(self.millis)
    }

    /// Delay before the first rebalance computation of a cycle: a third of a batch.
    pub fn rebalance_initial_delay(&self) -> Duration {
        Duration::from_millis(self.millis / 3)
    }

    /// Period of the rebalance timer once armed: two batches.
    pub fn rebalance_period(&self) -> Duration {
        Duration::from_millis(self.millis.saturating_mul(2))
    }
}

impl fmt::Debug for BatchDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchDuration({}ms)", self.millis)
    }
}

impl fmt::Display for BatchDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.millis)
    }
}

/// Elapsed milliseconds between two epoch-millisecond timestamps.
///
/// Clock skew between executors can put `end` before `start`; the magnitude
/// is what matters for rate computation.
pub fn elapsed_millis(start_ms: i64, end_ms: i64) -> u64 {
    end_ms.abs_diff(start_ms)
}

/// A UTC timestamp wrapper around `chrono::DateTime<Utc>`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtcTime {
    inner: DateTime<Utc>,
}

impl UtcTime {
    pub fn now() -> Self {
        Self { inner: Utc::now() }
    }

    /// Milliseconds since Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.inner.timestamp_millis()
    }
}

impl fmt::Debug for UtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UtcTime({})", self.inner.to_rfc3339())
    }
}

impl fmt::Display for UtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for UtcTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self { inner: dt }
    }
}
