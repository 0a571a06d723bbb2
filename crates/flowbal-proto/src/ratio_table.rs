use std::collections::BTreeMap;

use flowbal_types::{make_error_msg, HostAddress, RebalanceCode, Result};
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that a table's fractions sum to one.
pub const RATIO_SUM_TOLERANCE: f64 = 1e-9;

/// Target fraction of new ingestion each host should receive.
///
/// Always published as a whole; consumers replace their previous table
/// rather than merging entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatioTable {
    ratios: BTreeMap<HostAddress, f64>,
}

impl RatioTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fraction for `host`, replacing any previous entry.
    pub fn insert(&mut self, host: HostAddress, ratio: f64) {
        self.ratios.insert(host, ratio);
    }

    /// Add `ratio` to the entry for `host`, creating it at zero first.
    pub fn add(&mut self, host: HostAddress, ratio: f64) {
        *self.ratios.entry(host).or_insert(0.0) += ratio;
    }

    pub fn remove(&mut self, host: &str) -> Option<f64> {
        self.ratios.remove(host)
    }

    pub fn get(&self, host: &str) -> Option<f64> {
        self.ratios.get(host).copied()
    }

    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.ratios.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HostAddress, f64)> {
        self.ratios.iter().map(|(h, r)| (h, *r))
    }

    pub fn hosts(&self) -> impl Iterator<Item = &HostAddress> {
        self.ratios.keys()
    }

    /// Scale all entries so they sum to one. A table summing to zero is left as is.
    pub fn normalize(&mut self) {
        let sum = self.sum();
        if sum <= 0.0 {
            return;
        }
        for ratio in self.ratios.values_mut() {
            *ratio /= sum;
        }
    }

    /// Check the publication invariant: every fraction in `[0, 1]`, total one.
    pub fn validate(&self) -> Result<()> {
        for (host, ratio) in &self.ratios {
            if !(-RATIO_SUM_TOLERANCE..=1.0 + RATIO_SUM_TOLERANCE).contains(ratio) {
                return make_error_msg(
                    RebalanceCode::RATIO_OUT_OF_RANGE,
                    format!("host {} has ratio {}", host, ratio),
                );
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
            return make_error_msg(
                RebalanceCode::RATIO_SUM_MISMATCH,
                format!("ratios sum to {}", sum),
            );
        }
        Ok(())
    }
}

impl FromIterator<(HostAddress, f64)> for RatioTable {
    fn from_iter<I: IntoIterator<Item = (HostAddress, f64)>>(iter: I) -> Self {
        Self {
            ratios: iter.into_iter().collect(),
        }
    }
}
