//! Per-job coordinator: backlog tracking, rebalance cycles, and split hints.
//!
//! One [`JobMonitor`] runs per job. Node aggregators, data sources and the
//! ratio sink register with it; it turns their estimates into a ratio table
//! on the rebalance timer and pushes that table to the sink.

pub mod config;
pub mod monitor;
pub mod split;
pub mod state;
pub mod timer;

pub use config::JobMonitorConfig;
pub use monitor::JobMonitor;
pub use split::SplitTracker;
pub use state::{HostBacklog, NodeEstimates, StreamOrigins};
pub use timer::RebalanceTimer;
