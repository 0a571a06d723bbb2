use std::collections::BTreeMap;

use flowbal_types::HostAddress;

use crate::algorithm::Candidate;

/// Number of hosts fed into the ratio heuristic.
pub const TOP_HOSTS: usize = 3;

/// Pick up to [`TOP_HOSTS`] hosts in rank order.
///
/// Hosts with zero backlog come first, in ascending host order. The rest
/// follow by descending backlog; equal backlogs fall back to ascending host
/// order so the outcome never depends on map iteration order. `excluded`
/// removes a host that is cooling down after repeated capping.
pub fn select_candidates(
    host_backlogs: &BTreeMap<HostAddress, u64>,
    excluded: Option<&HostAddress>,
) -> Vec<Candidate> {
    let eligible = host_backlogs
        .iter()
        .filter(|(host, _)| Some(*host) != excluded);

    let (idle, mut busy): (Vec<_>, Vec<_>) = eligible.partition(|(_, backlog)| **backlog == 0);
    busy.sort_by(|(ha, a), (hb, b)| b.cmp(a).then_with(|| ha.cmp(hb)));

    idle.into_iter()
        .chain(busy)
        .take(TOP_HOSTS)
        .map(|(host, backlog)| Candidate::new(host.clone(), *backlog))
        .collect()
}
