use std::collections::{BTreeMap, BTreeSet};

use flowbal_types::{HostAddress, StreamId};
use serde::Serialize;

/// One-time overload split decisions.
///
/// A host whose streams ingest faster than its nodes handle gets every one
/// of its streams split, once. Neither the host nor any split stream is ever
/// considered again for the lifetime of the job.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SplitTracker {
    stream_speeds: BTreeMap<StreamId, f64>,
    split_hosts: BTreeSet<HostAddress>,
    split_streams: BTreeSet<StreamId>,
}

impl SplitTracker {
    pub fn record_speed(&mut self, stream_id: StreamId, speed: f64) {
        self.stream_speeds.insert(stream_id, speed.abs());
    }

    pub fn forget_stream(&mut self, stream_id: StreamId) {
        self.stream_speeds.remove(&stream_id);
    }

    /// Sum of the last reported speeds of `streams`.
    pub fn ingestion_speed(&self, streams: impl IntoIterator<Item = StreamId>) -> f64 {
        streams
            .into_iter()
            .filter_map(|s| self.stream_speeds.get(&s))
            .sum()
    }

    /// Streams to split on `host`, given the streams living there and the
    /// host's handling throughput. Marks the host and the returned streams.
    ///
    /// Callers invoke this on an estimate reply for `host`, so a zero
    /// `handling_rate` is a measured stall rather than missing data.
    pub fn decide(
        &mut self,
        host: &HostAddress,
        streams: &[StreamId],
        handling_rate: f64,
    ) -> Vec<StreamId> {
        if self.split_hosts.contains(host) {
            return Vec::new();
        }
        let ingestion = self.ingestion_speed(streams.iter().copied());
        if ingestion <= handling_rate {
            return Vec::new();
        }

        tracing::info!(%host, ingestion, handling_rate, "host ingests faster than it handles, splitting its streams");
        self.split_hosts.insert(host.clone());
        streams
            .iter()
            .copied()
            .filter(|s| self.split_streams.insert(*s))
            .collect()
    }

    pub fn split_streams(&self) -> &BTreeSet<StreamId> {
        &self.split_streams
    }

    pub fn is_host_split(&self, host: &HostAddress) -> bool {
        self.split_hosts.contains(host)
    }
}
