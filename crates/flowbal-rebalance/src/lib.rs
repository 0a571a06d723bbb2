//! Rebalance heuristic turning per-host estimates into an ingestion ratio table.
//!
//! Kept free of any actor or channel so it can be exercised directly.

pub mod algorithm;
pub mod cooldown;
pub mod planner;
pub mod selection;

pub use algorithm::{
    compute_ratios, compute_ratios_with, split_by_rank, Allocation, Candidate, RankedSplit,
    DEFAULT_MAX_RATIO,
};
pub use cooldown::{CooldownTracker, DEFAULT_COOLDOWN_THRESHOLD};
pub use planner::{RebalanceParams, RebalancePlan, RebalancePlanner};
pub use selection::{select_candidates, TOP_HOSTS};
