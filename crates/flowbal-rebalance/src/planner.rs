use std::collections::BTreeMap;

use flowbal_proto::RatioTable;
use flowbal_types::{make_error_msg, HostAddress, RebalanceCode, Result};

use crate::algorithm::{split_by_rank, Candidate, DEFAULT_MAX_RATIO};
use crate::cooldown::{CooldownTracker, DEFAULT_COOLDOWN_THRESHOLD};
use crate::selection::{select_candidates, TOP_HOSTS};

/// Tunables of the rebalance heuristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalanceParams {
    pub max_ratio: f64,
    pub cooldown_threshold: u32,
}

impl Default for RebalanceParams {
    fn default() -> Self {
        Self {
            max_ratio: DEFAULT_MAX_RATIO,
            cooldown_threshold: DEFAULT_COOLDOWN_THRESHOLD,
        }
    }
}

/// Outcome of one rebalance cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalancePlan {
    /// Ratio table over the real candidate hosts, summing to one.
    pub table: RatioTable,
    /// Candidates in rank order, without padding.
    pub candidates: Vec<Candidate>,
    pub capped: Option<HostAddress>,
    /// Host left out this cycle because of its cap streak.
    pub excluded: Option<HostAddress>,
}

/// Stateful wrapper that turns per-host estimates into a ratio table.
///
/// Owns the cooldown state carried between cycles. When fewer than three
/// hosts are eligible the ranked slots are padded with zero-backlog
/// placeholders (after any real idle hosts, before the busy ones); their
/// share is dropped and the real hosts' shares are renormalised.
#[derive(Debug, Clone)]
pub struct RebalancePlanner {
    params: RebalanceParams,
    cooldown: CooldownTracker,
}

impl RebalancePlanner {
    pub fn new(params: RebalanceParams) -> Self {
        Self {
            params,
            cooldown: CooldownTracker::new(params.cooldown_threshold),
        }
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    pub fn params(&self) -> RebalanceParams {
        self.params
    }

    pub fn plan(&mut self, host_backlogs: &BTreeMap<HostAddress, u64>) -> Result<RebalancePlan> {
        let excluded = self.cooldown.take_exclusion();
        let candidates = select_candidates(host_backlogs, excluded.as_ref());
        self.cooldown
            .observe_selection(candidates.iter().map(|c| &c.host), excluded.as_ref());

        if candidates.is_empty() {
            return make_error_msg(
                RebalanceCode::NO_CANDIDATES,
                format!("{} hosts known, none eligible", host_backlogs.len()),
            );
        }

        // Slot layout: real idle hosts, placeholders, real busy hosts.
        let idle = candidates.iter().take_while(|c| c.backlog == 0).count();
        let padding = TOP_HOSTS - candidates.len();
        let mut slots: [Option<&Candidate>; TOP_HOSTS] = [None; TOP_HOSTS];
        for (i, candidate) in candidates.iter().enumerate() {
            let slot = if i < idle { i } else { i + padding };
            slots[slot] = Some(candidate);
        }

        let backlogs = slots.map(|s| s.map_or(0, |c| c.backlog));
        let split = split_by_rank(backlogs, self.params.max_ratio);

        let mut table = RatioTable::new();
        for (slot, ratio) in slots.iter().zip(split.ratios) {
            if let Some(candidate) = slot {
                table.add(candidate.host.clone(), ratio);
            }
        }
        if padding > 0 {
            table.normalize();
        }

        let capped = split
            .capped
            .and_then(|i| slots[i])
            .map(|c| c.host.clone());
        self.cooldown.record_cap(capped.as_ref());

        Ok(RebalancePlan {
            table,
            candidates,
            capped,
            excluded,
        })
    }
}

impl Default for RebalancePlanner {
    fn default() -> Self {
        Self::new(RebalanceParams::default())
    }
}
