use flowbal_types::elapsed_millis;
use serde::Serialize;

/// Weight of the previous smoothed value.
pub const SMOOTHING_PREV_WEIGHT: f64 = 0.4;
/// Weight of the newest instantaneous reading.
pub const SMOOTHING_NEW_WEIGHT: f64 = 0.6;

/// Bytes per second for one unit of work. Zero when no time elapsed.
pub fn instant_rate(start_ms: i64, end_ms: i64, bytes: u64) -> f64 {
    let elapsed = elapsed_millis(start_ms, end_ms);
    if elapsed == 0 {
        return 0.0;
    }
    bytes as f64 * 1_000.0 / elapsed as f64
}

/// Exponentially smoothed throughput.
///
/// While the running value is zero the next reading is taken as is, so the
/// first sample (and any sample after an idle stretch) does not get dragged
/// toward zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SmoothedRate {
    value: f64,
    samples: u64,
}

impl SmoothedRate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Fold in a reading and return the updated value.
    pub fn update(&mut self, instant: f64) -> f64 {
        self.value = if self.value == 0.0 {
            instant
        } else {
            SMOOTHING_PREV_WEIGHT * self.value + SMOOTHING_NEW_WEIGHT * instant
        };
        self.samples += 1;
        self.value
    }

    pub fn observe(&mut self, start_ms: i64, end_ms: i64, bytes: u64) -> f64 {
        self.update(instant_rate(start_ms, end_ms, bytes))
    }
}
