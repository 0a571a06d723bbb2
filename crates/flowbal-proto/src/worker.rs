//! Mailbox of a per-node aggregator ("worker monitor").

use std::collections::BTreeMap;
use std::time::Duration;

use flowbal_types::{BatchDuration, HostAddress, NodeId, ReporterId, Result, ResultExt};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::actor::ActorRef;
use crate::link::LinkState;
use crate::messages::{EstimateRequest, SpeedSample};
use crate::reporter::ReporterRef;

/// Messages accepted by a node aggregator.
#[derive(Debug)]
pub enum WorkerMonitorMsg {
    /// A reporter on this node asks to join; the ack goes back over `reporter`.
    Register {
        reporter_id: ReporterId,
        reporter: ReporterRef,
    },
    Deregister {
        reporter_id: ReporterId,
    },
    Report(SpeedSample),
    QueryTotal(oneshot::Sender<f64>),
    /// The coordinator accepted this aggregator, passing its current cadence.
    RegisterAck {
        cadence: BatchDuration,
    },
    /// Batch interval hint pushed by the coordinator.
    WorkCadence(BatchDuration),
    EstimateRequest(EstimateRequest),
    /// Reloaded silent-reporter window; `None` turns eviction off.
    ReporterStaleAfter(Option<Duration>),
    Snapshot(oneshot::Sender<WorkerMonitorSnapshot>),
    /// Deregister from the coordinator (if ever registered) and stop.
    Shutdown,
}

/// Point-in-time view of a node aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerMonitorSnapshot {
    pub node_id: NodeId,
    pub host: HostAddress,
    pub link: LinkState,
    pub cadence: BatchDuration,
    pub registered_reporters: usize,
    pub samples: BTreeMap<ReporterId, SpeedSample>,
    pub total_rate: f64,
    pub bytes_handled_pending: u64,
    pub estimates_sent: u64,
    /// Zero when eviction is off.
    pub reporter_stale_after_ms: u64,
}

pub type WorkerMonitorRef = ActorRef<WorkerMonitorMsg>;

impl ActorRef<WorkerMonitorMsg> {
    pub fn register(&self, reporter_id: ReporterId, reporter: ReporterRef) -> Result<()> {
        self.tell(WorkerMonitorMsg::Register {
            reporter_id,
            reporter,
        })
    }

    pub fn deregister(&self, reporter_id: ReporterId) -> Result<()> {
        self.tell(WorkerMonitorMsg::Deregister { reporter_id })
    }

    pub fn report(&self, sample: SpeedSample) -> Result<()> {
        self.tell(WorkerMonitorMsg::Report(sample))
    }

    /// Sum of the latest smoothed rates of every known reporter.
    pub async fn query_total(&self) -> Result<f64> {
        self.ask(WorkerMonitorMsg::QueryTotal).await
    }

    pub fn register_ack(&self, cadence: BatchDuration) -> Result<()> {
        self.tell(WorkerMonitorMsg::RegisterAck { cadence })
    }

    pub fn work_cadence(&self, cadence: BatchDuration) -> Result<()> {
        self.tell(WorkerMonitorMsg::WorkCadence(cadence))
    }

    pub fn estimate_request(&self, request: EstimateRequest) -> Result<()> {
        self.tell(WorkerMonitorMsg::EstimateRequest(request))
    }

    pub fn reporter_stale_after(&self, window: Option<Duration>) -> Result<()> {
        self.tell(WorkerMonitorMsg::ReporterStaleAfter(window))
    }

    pub async fn snapshot(&self) -> Result<WorkerMonitorSnapshot> {
        self.ask(WorkerMonitorMsg::Snapshot)
            .await
            .context("worker snapshot")
    }

    pub fn shutdown(&self) -> Result<()> {
        self.tell(WorkerMonitorMsg::Shutdown)
    }
}
