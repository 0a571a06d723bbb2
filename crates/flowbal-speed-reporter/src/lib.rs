//! Leaf telemetry: one reporter per task executor.

pub mod rate;
pub mod reporter;

pub use rate::{instant_rate, SmoothedRate, SMOOTHING_NEW_WEIGHT, SMOOTHING_PREV_WEIGHT};
pub use reporter::SpeedReporter;
