//! Message payloads exchanged between the tiers.
//!
//! These are the logical, transport-agnostic contracts at the core boundary.
//! Every payload is plain data and serializable so that a remote transport
//! can carry it unchanged; the in-process actors pass them by value.

use flowbal_types::{CycleId, HostAddress, NodeId, ReporterId, StreamId};
use serde::{Deserialize, Serialize};

/// Completion of one unit of work, delivered by an executor to its reporter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkCompleted {
    /// Epoch milliseconds when the unit started.
    pub start_ms: i64,
    /// Epoch milliseconds when the unit finished.
    pub end_ms: i64,
    pub bytes_processed: u64,
}

/// Latest throughput reading of one reporter (`SpeedReport` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub reporter_id: ReporterId,
    pub bytes_processed: u64,
    /// Exponentially smoothed rate in bytes per second.
    pub smoothed_rate: f64,
}

/// Bytes that arrived at an ingestion host and still need processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReceived {
    pub host: HostAddress,
    pub bytes: u64,
}

/// A processing cycle (batch) finished; used as the rebalance trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleFinished {
    pub cycle_id: CycleId,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Ingestion speed a data source observes for one of its streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSpeedReport {
    pub stream_id: StreamId,
    /// Bytes per second.
    pub speed: f64,
    pub host: HostAddress,
}

/// Instruction to a data source to split (or not) its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitStream {
    pub stream_id: StreamId,
    pub split: bool,
}

/// Coordinator asks a node aggregator for its current estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateRequest {
    pub cycle_id: CycleId,
}

/// A node aggregator's answer to an [`EstimateRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateReply {
    /// Bytes the node is estimated to work through in one batch interval.
    pub estimated_outstanding: u64,
    /// Bytes reporters finished since the previous reply.
    pub bytes_handled: u64,
    pub node_id: NodeId,
    pub host: HostAddress,
    /// Current aggregate handling throughput in bytes per second.
    pub handling_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_reply_json_shape() {
        let reply = EstimateReply {
            estimated_outstanding: 4_096,
            bytes_handled: 512,
            node_id: NodeId(3),
            host: HostAddress::from("host-a"),
            handling_rate: 2_048.0,
        };
        let v: serde_json::Value = serde_json::to_value(&reply).unwrap();
        assert_eq!(v["node_id"], 3);
        assert_eq!(v["host"], "host-a");
        assert_eq!(v["bytes_handled"], 512);
    }

    #[test]
    fn test_split_stream_json_shape() {
        let msg = SplitStream {
            stream_id: StreamId(9),
            split: true,
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"stream_id":9,"split":true}"#
        );
    }
}
