//! The ratio heuristic applied to the three ranked candidate hosts.
//!
//! Inputs are in rank order as produced by
//! [`select_candidates`](crate::select_candidates): zero-backlog hosts first,
//! then the largest backlogs. Rules, first match wins:
//!
//! 1. third backlog is zero: equal thirds;
//! 2. first backlog is non-zero: proportional to backlog, with a single host
//!    above `max_ratio` clamped and its excess shared by the other two;
//! 3. second backlog is zero: fixed `0.4 / 0.4 / 0.2`;
//! 4. otherwise: `0.4` head start for the first host, the remaining `0.6`
//!    split between the other two in proportion to their backlogs.

use flowbal_proto::RatioTable;
use flowbal_types::HostAddress;
use serde::{Deserialize, Serialize};

/// Upper bound on any single host's share before capping kicks in.
pub const DEFAULT_MAX_RATIO: f64 = 0.7;

const HEAD_START: f64 = 0.4;
const IDLE_PAIR_SPLIT: [f64; 3] = [0.4, 0.4, 0.2];

/// One host entering the ratio computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub host: HostAddress,
    pub backlog: u64,
}

impl Candidate {
    pub fn new(host: impl Into<HostAddress>, backlog: u64) -> Self {
        Self {
            host: host.into(),
            backlog,
        }
    }
}

/// Ratios by rank, and which rank (if any) was clamped to the maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedSplit {
    pub ratios: [f64; 3],
    pub capped: Option<usize>,
}

/// Result of [`compute_ratios`] over three named hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub table: RatioTable,
    pub capped: Option<HostAddress>,
}

/// Apply the rules to backlogs given in rank order.
pub fn split_by_rank(backlogs: [u64; 3], max_ratio: f64) -> RankedSplit {
    let [first, second, third] = backlogs;

    if third == 0 {
        return RankedSplit {
            ratios: [1.0 / 3.0; 3],
            capped: None,
        };
    }

    if first != 0 {
        let total: f64 = backlogs.iter().map(|b| *b as f64).sum();
        let mut ratios = backlogs.map(|b| b as f64 / total);
        let capped = cap_single_overflow(&mut ratios, max_ratio);
        return RankedSplit { ratios, capped };
    }

    if second == 0 {
        return RankedSplit {
            ratios: IDLE_PAIR_SPLIT,
            capped: None,
        };
    }

    let rest = second as f64 + third as f64;
    let remaining = 1.0 - HEAD_START;
    RankedSplit {
        ratios: [
            HEAD_START,
            remaining * second as f64 / rest,
            remaining * third as f64 / rest,
        ],
        capped: None,
    }
}

/// Clamp the one ratio above `max_ratio` and share the excess equally.
///
/// Only acts when exactly one entry exceeds the bound.
fn cap_single_overflow(ratios: &mut [f64; 3], max_ratio: f64) -> Option<usize> {
    let mut over = ratios.iter().enumerate().filter(|(_, r)| **r > max_ratio);
    let (idx, _) = over.next()?;
    if over.next().is_some() {
        return None;
    }

    let excess = ratios[idx] - max_ratio;
    ratios[idx] = max_ratio;
    for (i, ratio) in ratios.iter_mut().enumerate() {
        if i != idx {
            *ratio += excess / 2.0;
        }
    }
    Some(idx)
}

/// Compute the ratio table for exactly three ranked hosts using the default cap.
pub fn compute_ratios(candidates: &[Candidate; 3]) -> Allocation {
    compute_ratios_with(candidates, DEFAULT_MAX_RATIO)
}

pub fn compute_ratios_with(candidates: &[Candidate; 3], max_ratio: f64) -> Allocation {
    let split = split_by_rank(
        [
            candidates[0].backlog,
            candidates[1].backlog,
            candidates[2].backlog,
        ],
        max_ratio,
    );
    let mut table = RatioTable::new();
    for (candidate, ratio) in candidates.iter().zip(split.ratios) {
        table.add(candidate.host.clone(), ratio);
    }
    Allocation {
        table,
        capped: split.capped.map(|i| candidates[i].host.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn ranked(a: u64, b: u64, c: u64) -> [Candidate; 3] {
        [
            Candidate::new("A", a),
            Candidate::new("B", b),
            Candidate::new("C", c),
        ]
    }

    fn assert_ratio(alloc: &Allocation, host: &str, expected: f64) {
        let got = alloc.table.get(host).unwrap();
        assert!(
            (got - expected).abs() < EPS,
            "host {}: expected {}, got {}",
            host,
            expected,
            got
        );
    }

    #[test]
    fn test_all_idle_is_equal_split() {
        let alloc = compute_ratios(&ranked(0, 0, 0));
        for host in ["A", "B", "C"] {
            assert_ratio(&alloc, host, 1.0 / 3.0);
        }
        assert!(alloc.capped.is_none());
    }

    #[test]
    fn test_equal_backlogs_proportional_without_cap() {
        let alloc = compute_ratios(&ranked(100, 100, 100));
        for host in ["A", "B", "C"] {
            assert_ratio(&alloc, host, 1.0 / 3.0);
        }
        assert!(alloc.capped.is_none());
    }

    #[test]
    fn test_dominant_host_is_capped() {
        let alloc = compute_ratios(&ranked(900, 50, 50));
        assert_ratio(&alloc, "A", 0.7);
        assert_ratio(&alloc, "B", 0.15);
        assert_ratio(&alloc, "C", 0.15);
        assert_eq!(alloc.capped, Some(HostAddress::from("A")));
    }

    #[test]
    fn test_two_idle_hosts_get_fixed_split() {
        let alloc = compute_ratios(&ranked(0, 0, 100));
        assert_ratio(&alloc, "A", 0.4);
        assert_ratio(&alloc, "B", 0.4);
        assert_ratio(&alloc, "C", 0.2);
    }

    #[test]
    fn test_busy_first_with_idle_tail_falls_under_rule_one() {
        // Rank order puts idle hosts first; a trailing zero means every
        // backlog ahead of it is zero by construction, so rule 1 applies.
        let alloc = compute_ratios(&ranked(100, 0, 0));
        for host in ["A", "B", "C"] {
            assert_ratio(&alloc, host, 1.0 / 3.0);
        }
    }

    #[test]
    fn test_one_idle_host_gets_head_start() {
        let alloc = compute_ratios(&ranked(0, 60, 40));
        assert_ratio(&alloc, "A", 0.4);
        assert_ratio(&alloc, "B", 0.36);
        assert_ratio(&alloc, "C", 0.24);
    }

    #[test]
    fn test_cap_at_exact_bound_is_not_applied() {
        let split = split_by_rank([70, 20, 10], DEFAULT_MAX_RATIO);
        assert!(split.capped.is_none());
        assert!((split.ratios[0] - 0.7).abs() < EPS);
    }

    #[test]
    fn test_custom_cap() {
        let alloc = compute_ratios_with(&ranked(600, 300, 100), 0.5);
        assert_ratio(&alloc, "A", 0.5);
        assert_ratio(&alloc, "B", 0.35);
        assert_ratio(&alloc, "C", 0.15);
        assert_eq!(alloc.capped, Some(HostAddress::from("A")));
    }

    #[test]
    fn test_cap_can_hit_a_lower_rank() {
        // Rank order is positional; the cap follows whichever slot overflows.
        let split = split_by_rank([10, 10, 980], DEFAULT_MAX_RATIO);
        assert_eq!(split.capped, Some(2));
        assert!((split.ratios[2] - 0.7).abs() < EPS);
        assert!((split.ratios[0] - 0.15).abs() < EPS);
    }

    #[test]
    fn test_huge_backlogs_do_not_overflow() {
        let split = split_by_rank([u64::MAX, u64::MAX, u64::MAX], DEFAULT_MAX_RATIO);
        for r in split.ratios {
            assert!((r - 1.0 / 3.0).abs() < EPS);
        }
    }

    proptest! {
        #[test]
        fn prop_ratios_sum_to_one(a in 0u64..1_000_000_000_000, b in 0u64..1_000_000_000_000, c in 0u64..1_000_000_000_000) {
            let alloc = compute_ratios(&ranked(a, b, c));
            prop_assert!((alloc.table.sum() - 1.0).abs() < EPS);
            prop_assert!(alloc.table.validate().is_ok());
        }

        #[test]
        fn prop_capped_host_holds_exactly_the_cap(a in 1u64..1_000_000, b in 1u64..1_000_000, c in 1u64..1_000_000) {
            let alloc = compute_ratios(&ranked(a, b, c));
            if let Some(host) = &alloc.capped {
                prop_assert!((alloc.table.get(host.as_str()).unwrap() - DEFAULT_MAX_RATIO).abs() < EPS);
            }
            for (_, ratio) in alloc.table.iter() {
                prop_assert!(ratio <= DEFAULT_MAX_RATIO + EPS);
            }
        }
    }
}
