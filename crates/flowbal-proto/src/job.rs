//! Mailbox of the per-job coordinator ("job monitor").

use std::collections::{BTreeMap, BTreeSet};

use flowbal_types::{
    BatchDuration, CycleId, HostAddress, JobId, NodeId, Result, ResultExt, StreamId,
};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::actor::ActorRef;
use crate::control::{DataSourceRef, RatioSinkRef};
use crate::link::LinkState;
use crate::messages::{CycleFinished, DataReceived, EstimateReply, StreamSpeedReport};
use crate::ratio_table::RatioTable;
use crate::worker::WorkerMonitorRef;

/// Messages accepted by a job coordinator.
#[derive(Debug)]
pub enum JobMonitorMsg {
    RegisterWorkerMonitor {
        node_id: NodeId,
        host: HostAddress,
        monitor: WorkerMonitorRef,
    },
    DeregisterWorkerMonitor {
        node_id: NodeId,
    },
    RegisterDataSource {
        stream_id: StreamId,
        host: HostAddress,
        source: DataSourceRef,
    },
    DeregisterDataSource {
        stream_id: StreamId,
    },
    /// The batch-interval reporter registers as the consumer of ratio tables.
    RegisterRatioSink {
        sink: RatioSinkRef,
    },
    /// The master/driver accepted this coordinator.
    MasterAck,
    BatchDuration(BatchDuration),
    /// Reloaded fallback used while the scheduler has not reported a batch duration.
    DefaultBatchDuration(BatchDuration),
    DataReceived(DataReceived),
    CycleFinished(CycleFinished),
    StreamSpeedReport(StreamSpeedReport),
    EstimateReply(EstimateReply),
    /// Posted by the coordinator's own rebalance timer.
    RebalanceTick {
        cycle_id: CycleId,
    },
    Snapshot(oneshot::Sender<JobMonitorSnapshot>),
    /// Cancel any armed timer and stop.
    Shutdown,
}

/// Point-in-time view of a job coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct JobMonitorSnapshot {
    pub job_id: JobId,
    pub master_link: LinkState,
    pub batch_duration: BatchDuration,
    pub worker_monitors: BTreeMap<NodeId, HostAddress>,
    pub data_sources: BTreeMap<StreamId, HostAddress>,
    pub has_ratio_sink: bool,
    pub backlog: BTreeMap<HostAddress, i64>,
    pub host_estimates: BTreeMap<HostAddress, u64>,
    pub rebalance_in_flight: bool,
    pub active_cycle: Option<CycleId>,
    pub last_ratios: Option<RatioTable>,
    pub last_capped: Option<HostAddress>,
    pub cap_streak: u32,
    pub split_streams: BTreeSet<StreamId>,
    pub cycles_started: u64,
    pub cycles_published: u64,
    pub estimate_requests_sent: u64,
}

pub type JobMonitorRef = ActorRef<JobMonitorMsg>;

impl ActorRef<JobMonitorMsg> {
    pub fn register_worker_monitor(
        &self,
        node_id: NodeId,
        host: HostAddress,
        monitor: WorkerMonitorRef,
    ) -> Result<()> {
        self.tell(JobMonitorMsg::RegisterWorkerMonitor {
            node_id,
            host,
            monitor,
        })
    }

    pub fn deregister_worker_monitor(&self, node_id: NodeId) -> Result<()> {
        self.tell(JobMonitorMsg::DeregisterWorkerMonitor { node_id })
    }

    pub fn register_data_source(
        &self,
        stream_id: StreamId,
        host: HostAddress,
        source: DataSourceRef,
    ) -> Result<()> {
        self.tell(JobMonitorMsg::RegisterDataSource {
            stream_id,
            host,
            source,
        })
    }

    pub fn deregister_data_source(&self, stream_id: StreamId) -> Result<()> {
        self.tell(JobMonitorMsg::DeregisterDataSource { stream_id })
    }

    pub fn register_ratio_sink(&self, sink: RatioSinkRef) -> Result<()> {
        self.tell(JobMonitorMsg::RegisterRatioSink { sink })
    }

    pub fn master_ack(&self) -> Result<()> {
        self.tell(JobMonitorMsg::MasterAck)
    }

    pub fn batch_duration(&self, duration: BatchDuration) -> Result<()> {
        self.tell(JobMonitorMsg::BatchDuration(duration))
    }

    pub fn default_batch_duration(&self, duration: BatchDuration) -> Result<()> {
        self.tell(JobMonitorMsg::DefaultBatchDuration(duration))
    }

    pub fn data_received(&self, host: HostAddress, bytes: u64) -> Result<()> {
        self.tell(JobMonitorMsg::DataReceived(DataReceived { host, bytes }))
    }

    pub fn cycle_finished(&self, cycle_id: CycleId, start_ms: i64, end_ms: i64) -> Result<()> {
        self.tell(JobMonitorMsg::CycleFinished(CycleFinished {
            cycle_id,
            start_ms,
            end_ms,
        }))
    }

    pub fn stream_speed(&self, stream_id: StreamId, speed: f64, host: HostAddress) -> Result<()> {
        self.tell(JobMonitorMsg::StreamSpeedReport(StreamSpeedReport {
            stream_id,
            speed,
            host,
        }))
    }

    pub fn estimate_reply(&self, reply: EstimateReply) -> Result<()> {
        self.tell(JobMonitorMsg::EstimateReply(reply))
    }

    pub async fn snapshot(&self) -> Result<JobMonitorSnapshot> {
        self.ask(JobMonitorMsg::Snapshot)
            .await
            .context("job snapshot")
    }

    pub fn shutdown(&self) -> Result<()> {
        self.tell(JobMonitorMsg::Shutdown)
    }
}
