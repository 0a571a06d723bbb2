use std::time::Duration;

use flowbal_proto::RatioTable;
use flowbal_types::{CycleId, UtcTime};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::cluster::{report, Cluster, HostNode};
use crate::config::SimConfig;

/// Epoch milliseconds that advance with the tokio clock, so paused-time runs see real durations.
struct SimClock {
    epoch_ms: i64,
    origin: Instant,
}

impl SimClock {
    fn start() -> Self {
        Self {
            epoch_ms: UtcTime::now().timestamp_millis(),
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> i64 {
        self.epoch_ms + self.origin.elapsed().as_millis() as i64
    }
}

/// Fraction of new ingestion `node` receives under `table`; equal shares until one is published.
fn share(table: &RatioTable, node: &HostNode, hosts: usize) -> f64 {
    if table.is_empty() {
        return 1.0 / hosts as f64;
    }
    table.get(node.host.as_str()).unwrap_or(0.0)
}

/// Feed batches into the cluster until `batches` are done or shutdown is signalled.
///
/// Each batch spreads the configured ingestion over the hosts by the current
/// ratio table, waits one batch duration, lets every host's reporters finish
/// work at that host's handling rate, then reports the cycle as finished.
pub async fn drive(config: SimConfig, cluster: &Cluster, mut shutdown: watch::Receiver<bool>) -> u64 {
    let batch = config.batch_duration();
    let clock = SimClock::start();
    let mut completed = 0;
    while config.batches == 0 || completed < config.batches {
        let cycle_id = CycleId(completed + 1);
        let table = cluster.ratios.borrow().clone();
        let start_ms = clock.now_ms();

        for node in &cluster.hosts {
            let bytes = (config.ingest_bytes_per_batch as f64 * share(&table, node, cluster.hosts.len())) as u64;
            if bytes == 0 {
                continue;
            }
            if let Err(e) = cluster.job.data_received(node.host.clone(), bytes) {
                tracing::warn!(error = %e, "job monitor gone, stopping workload");
                return completed;
            }
            let per_stream = bytes as f64 / node.streams.len() as f64 / batch.as_secs_f64();
            for stream_id in &node.streams {
                report(cluster.job.stream_speed(*stream_id, per_stream, node.host.clone()));
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(batch.as_std()) => {}
            _ = shutdown.changed() => {
                tracing::info!(completed, "workload interrupted");
                return completed;
            }
        }

        let end_ms = clock.now_ms();
        for node in &cluster.hosts {
            let handled = config.handling_rate(node.index) * batch.as_secs_f64();
            let per_reporter = (handled / node.reporters.len() as f64) as u64;
            for reporter in &node.reporters {
                report(reporter.work_completed(start_ms, end_ms, per_reporter));
            }
        }
        if let Err(e) = cluster.job.cycle_finished(cycle_id, start_ms, end_ms) {
            tracing::warn!(error = %e, "job monitor gone, stopping workload");
            return completed;
        }
        completed += 1;
        tracing::debug!(%cycle_id, "batch finished");
    }
    // Let the last cycle's rebalance land before reporting back.
    tokio::time::sleep(batch.rebalance_initial_delay() + Duration::from_millis(50)).await;
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbal_app::Supervisor;

    #[tokio::test(start_paused = true)]
    async fn test_skewed_cluster_gets_rebalanced() {
        let config = SimConfig {
            hosts: 3,
            reporters_per_host: 1,
            streams_per_host: 1,
            batch_duration_ms: 1_000,
            batches: 6,
            host_skew: 1.0,
            ..SimConfig::default()
        };
        let mut supervisor = Supervisor::new();
        let cluster = Cluster::boot(&config, &mut supervisor);
        let (_tx, shutdown) = watch::channel(false);

        let completed = drive(config, &cluster, shutdown).await;
        assert_eq!(completed, 6);

        let snap = cluster.job.snapshot().await.unwrap();
        assert!(snap.cycles_published >= 1);
        let table = snap.last_ratios.unwrap();
        assert!(table.validate().is_ok());
        assert_eq!(*cluster.ratios.borrow(), table);

        cluster.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_workload() {
        let config = SimConfig {
            hosts: 2,
            batches: 0,
            ..SimConfig::default()
        };
        let mut supervisor = Supervisor::new();
        let cluster = Cluster::boot(&config, &mut supervisor);
        let (tx, shutdown) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3_500)).await;
            let _ = tx.send(true);
        });
        let completed = drive(config, &cluster, shutdown).await;
        stopper.await.unwrap();
        assert_eq!(completed, 3);
        cluster.shutdown();
    }
}
