//! Message contracts and mailboxes for the flowbal tiers.
//!
//! Telemetry flows upward (reporter → worker monitor → job monitor) and
//! control flows downward (job monitor → worker monitors, data sources, and
//! the ratio sink). Every registration carries the registrant's [`ActorRef`],
//! which doubles as the reverse channel for acknowledgments and commands.

pub mod actor;
pub mod control;
pub mod job;
pub mod link;
pub mod messages;
pub mod ratio_table;
pub mod reporter;
pub mod worker;

pub use actor::{ActorRef, Mailbox};
pub use control::{DataSourceCommand, DataSourceRef, MasterMsg, MasterRef, RatioSinkMsg, RatioSinkRef};
pub use job::{JobMonitorMsg, JobMonitorRef, JobMonitorSnapshot};
pub use link::LinkState;
pub use messages::{
    CycleFinished, DataReceived, EstimateReply, EstimateRequest, SpeedSample, SplitStream,
    StreamSpeedReport, WorkCompleted,
};
pub use ratio_table::{RatioTable, RATIO_SUM_TOLERANCE};
pub use reporter::{ReporterMsg, ReporterRef, ReporterSnapshot};
pub use worker::{WorkerMonitorMsg, WorkerMonitorRef, WorkerMonitorSnapshot};
