//! Downstream control channels: data sources, the ratio sink, and the master.

use flowbal_types::{JobId, Result, StreamId};

use crate::actor::ActorRef;
use crate::job::JobMonitorRef;
use crate::messages::SplitStream;
use crate::ratio_table::RatioTable;

/// Commands pushed by the coordinator to a data source (receiver).
#[derive(Debug, Clone, PartialEq)]
pub enum DataSourceCommand {
    RegisterAck { stream_id: StreamId },
    Split(SplitStream),
}

pub type DataSourceRef = ActorRef<DataSourceCommand>;

impl ActorRef<DataSourceCommand> {
    pub fn register_ack(&self, stream_id: StreamId) -> Result<()> {
        self.tell(DataSourceCommand::RegisterAck { stream_id })
    }

    pub fn split(&self, stream_id: StreamId) -> Result<()> {
        self.tell(DataSourceCommand::Split(SplitStream {
            stream_id,
            split: true,
        }))
    }
}

/// Messages delivered to the data-flow controller that applies ratio tables.
#[derive(Debug, Clone, PartialEq)]
pub enum RatioSinkMsg {
    RegisterAck,
    Ratios(RatioTable),
}

pub type RatioSinkRef = ActorRef<RatioSinkMsg>;

impl ActorRef<RatioSinkMsg> {
    pub fn register_ack(&self) -> Result<()> {
        self.tell(RatioSinkMsg::RegisterAck)
    }

    pub fn publish(&self, table: RatioTable) -> Result<()> {
        self.tell(RatioSinkMsg::Ratios(table))
    }
}

/// Messages a coordinator sends to the job's master/driver.
#[derive(Debug)]
pub enum MasterMsg {
    RegisterJobMonitor {
        job_id: JobId,
        monitor: JobMonitorRef,
    },
}

pub type MasterRef = ActorRef<MasterMsg>;

impl ActorRef<MasterMsg> {
    pub fn register_job_monitor(&self, job_id: JobId, monitor: JobMonitorRef) -> Result<()> {
        self.tell(MasterMsg::RegisterJobMonitor { job_id, monitor })
    }
}
