use std::collections::{BTreeMap, BTreeSet};

use flowbal_proto::EstimateReply;
use flowbal_types::{HostAddress, NodeId, StreamId};

/// Bytes received per host that are not yet accounted as handled.
///
/// Entries go negative when handled bytes outrun the received ones; the
/// inaccuracy is accepted rather than clamped.
#[derive(Debug, Default, Clone)]
pub struct HostBacklog {
    by_host: BTreeMap<HostAddress, i64>,
}

impl HostBacklog {
    pub fn add(&mut self, host: HostAddress, bytes: u64) {
        let entry = self.by_host.entry(host).or_insert(0);
        *entry = entry.saturating_add(i64::try_from(bytes).unwrap_or(i64::MAX));
    }

    pub fn subtract(&mut self, host: &HostAddress, bytes: u64) {
        let delta = i64::try_from(bytes).unwrap_or(i64::MAX);
        match self.by_host.get_mut(host) {
            Some(entry) => *entry = entry.saturating_sub(delta),
            None => {
                self.by_host.insert(host.clone(), 0i64.saturating_sub(delta));
            }
        }
    }

    pub fn get(&self, host: &str) -> Option<i64> {
        self.by_host.get(host).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<HostAddress, i64> {
        self.by_host.clone()
    }
}

/// Two-way index between streams and the host they ingest on.
#[derive(Debug, Default, Clone)]
pub struct StreamOrigins {
    host_of: BTreeMap<StreamId, HostAddress>,
    streams_on: BTreeMap<HostAddress, BTreeSet<StreamId>>,
}

impl StreamOrigins {
    /// Record where `stream_id` lives, moving it if it was known on another host.
    pub fn insert(&mut self, stream_id: StreamId, host: HostAddress) {
        if self.host_of.get(&stream_id) == Some(&host) {
            return;
        }
        self.remove(stream_id);
        self.streams_on
            .entry(host.clone())
            .or_default()
            .insert(stream_id);
        self.host_of.insert(stream_id, host);
    }

    pub fn remove(&mut self, stream_id: StreamId) -> Option<HostAddress> {
        let host = self.host_of.remove(&stream_id)?;
        if let Some(streams) = self.streams_on.get_mut(&host) {
            streams.remove(&stream_id);
            if streams.is_empty() {
                self.streams_on.remove(&host);
            }
        }
        Some(host)
    }

    pub fn host_of(&self, stream_id: StreamId) -> Option<&HostAddress> {
        self.host_of.get(&stream_id)
    }

    pub fn streams_on(&self, host: &str) -> impl Iterator<Item = StreamId> + '_ {
        self.streams_on
            .get(host)
            .into_iter()
            .flat_map(|streams| streams.iter().copied())
    }
}

#[derive(Debug, Clone)]
struct NodeEstimate {
    host: HostAddress,
    outstanding: u64,
    handling_rate: f64,
}

/// Latest estimate reply of every node aggregator.
#[derive(Debug, Default, Clone)]
pub struct NodeEstimates {
    by_node: BTreeMap<NodeId, NodeEstimate>,
}

impl NodeEstimates {
    pub fn record(&mut self, reply: &EstimateReply) {
        self.by_node.insert(
            reply.node_id,
            NodeEstimate {
                host: reply.host.clone(),
                outstanding: reply.estimated_outstanding,
                handling_rate: reply.handling_rate,
            },
        );
    }

    pub fn remove(&mut self, node_id: NodeId) -> bool {
        self.by_node.remove(&node_id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// Sum of node estimates per host.
    pub fn per_host_totals(&self) -> BTreeMap<HostAddress, u64> {
        let mut totals = BTreeMap::new();
        for estimate in self.by_node.values() {
            let total: &mut u64 = totals.entry(estimate.host.clone()).or_default();
            *total = total.saturating_add(estimate.outstanding);
        }
        totals
    }

    /// Combined handling throughput of the nodes on `host`, bytes per second.
    pub fn handling_rate(&self, host: &HostAddress) -> f64 {
        self.by_node
            .values()
            .filter(|e| &e.host == host)
            .map(|e| e.handling_rate)
            .sum()
    }
}
