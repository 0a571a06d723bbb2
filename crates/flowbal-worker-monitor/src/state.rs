use std::collections::BTreeMap;
use std::time::Duration;

use flowbal_proto::{ReporterRef, SpeedSample};
use flowbal_types::{BatchDuration, ReporterId};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Reading {
    sample: SpeedSample,
    at: Instant,
}

/// Everything a worker monitor knows about the reporters on its node.
///
/// Registration and samples are tracked separately: a report from a reporter
/// that never registered is still counted, and a registered reporter that has
/// not reported yet contributes nothing to the total.
#[derive(Debug, Default)]
pub struct NodeAggregate {
    registered: BTreeMap<ReporterId, ReporterRef>,
    readings: BTreeMap<ReporterId, Reading>,
    bytes_handled: u64,
}

impl NodeAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the id was already registered and its ref got replaced.
    pub fn register(&mut self, reporter_id: ReporterId, reporter: ReporterRef) -> bool {
        self.registered.insert(reporter_id, reporter).is_none()
    }

    /// Forget the reporter and its last sample. Returns whether it was known.
    pub fn deregister(&mut self, reporter_id: ReporterId) -> bool {
        let had_ref = self.registered.remove(&reporter_id).is_some();
        let had_sample = self.readings.remove(&reporter_id).is_some();
        had_ref || had_sample
    }

    pub fn record(&mut self, sample: SpeedSample, now: Instant) {
        self.bytes_handled = self.bytes_handled.saturating_add(sample.bytes_processed);
        self.readings.insert(sample.reporter_id, Reading { sample, at: now });
    }

    /// Sum of the latest smoothed rates, bytes per second.
    pub fn total_rate(&self) -> f64 {
        self.readings.values().map(|r| r.sample.smoothed_rate).sum()
    }

    pub fn bytes_handled(&self) -> u64 {
        self.bytes_handled
    }

    /// Return the bytes reported since the previous call and restart the count.
    pub fn take_bytes_handled(&mut self) -> u64 {
        std::mem::take(&mut self.bytes_handled)
    }

    pub fn registered(&self) -> impl Iterator<Item = (&ReporterId, &ReporterRef)> {
        self.registered.iter()
    }

    pub fn registered_len(&self) -> usize {
        self.registered.len()
    }

    pub fn samples(&self) -> BTreeMap<ReporterId, SpeedSample> {
        self.readings
            .iter()
            .map(|(id, r)| (*id, r.sample))
            .collect()
    }

    /// Drop every reporter whose last sample is older than `max_age`.
    pub fn evict_stale(&mut self, now: Instant, max_age: Duration) -> Vec<ReporterId> {
        let stale: Vec<ReporterId> = self
            .readings
            .iter()
            .filter(|(_, r)| now.saturating_duration_since(r.at) > max_age)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.deregister(*id);
        }
        stale
    }
}

/// Bytes the node works through in one cadence at `rate` bytes per second.
pub fn estimate_outstanding(rate: f64, cadence: BatchDuration) -> u64 {
    (rate * cadence.as_secs_f64()).round().max(0.0) as u64
}
