//! Mailbox of a leaf speed reporter.

use flowbal_types::{ReporterId, Result, ResultExt};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::actor::ActorRef;
use crate::link::LinkState;
use crate::messages::{SpeedSample, WorkCompleted};

/// Messages accepted by a speed reporter.
#[derive(Debug)]
pub enum ReporterMsg {
    /// The hosting executor finished a unit of work.
    WorkCompleted(WorkCompleted),
    /// Poll nudge from the node aggregator: re-send the last sample.
    ReportNow,
    /// The node aggregator accepted the registration.
    RegisterAck,
    Snapshot(oneshot::Sender<ReporterSnapshot>),
    /// Deregister from the aggregator (if ever registered) and stop.
    Shutdown,
}

/// Point-in-time view of a reporter.
#[derive(Debug, Clone, Serialize)]
pub struct ReporterSnapshot {
    pub reporter_id: ReporterId,
    pub link: LinkState,
    pub last_sample: Option<SpeedSample>,
    pub reports_sent: u64,
}

pub type ReporterRef = ActorRef<ReporterMsg>;

impl ActorRef<ReporterMsg> {
    pub fn work_completed(&self, start_ms: i64, end_ms: i64, bytes_processed: u64) -> Result<()> {
        self.tell(ReporterMsg::WorkCompleted(WorkCompleted {
            start_ms,
            end_ms,
            bytes_processed,
        }))
    }

    pub fn report_now(&self) -> Result<()> {
        self.tell(ReporterMsg::ReportNow)
    }

    pub fn register_ack(&self) -> Result<()> {
        self.tell(ReporterMsg::RegisterAck)
    }

    pub async fn snapshot(&self) -> Result<ReporterSnapshot> {
        self.ask(ReporterMsg::Snapshot)
            .await
            .context("reporter snapshot")
    }

    pub fn shutdown(&self) -> Result<()> {
        self.tell(ReporterMsg::Shutdown)
    }
}
