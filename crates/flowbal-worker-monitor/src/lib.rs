//! Per-node aggregation of reporter throughput.
//!
//! A [`WorkerMonitor`] collects the latest sample of every speed reporter on
//! its node, nudges them on a fixed poll period, and answers the job
//! monitor's estimate requests once registered with it.

pub mod config;
pub mod monitor;
pub mod state;

pub use config::WorkerMonitorConfig;
pub use monitor::WorkerMonitor;
pub use state::{estimate_outstanding, NodeAggregate};
