//! In-process stand-ins for everything around the core: the job's master,
//! the data-flow controller consuming ratio tables, and the ingestion
//! receivers owning streams.

use flowbal_app::Supervisor;
use flowbal_job_monitor::JobMonitor;
use flowbal_proto::{
    DataSourceCommand, DataSourceRef, JobMonitorRef, Mailbox, MasterMsg, MasterRef, RatioSinkMsg,
    RatioSinkRef, RatioTable, ReporterRef, WorkerMonitorRef,
};
use flowbal_speed_reporter::SpeedReporter;
use flowbal_types::{HostAddress, NodeId, ReporterId, StreamId};
use flowbal_worker_monitor::WorkerMonitor;
use tokio::sync::watch;

use crate::config::SimConfig;

/// One simulated ingestion host: its node aggregator, reporters and streams.
pub struct HostNode {
    pub index: usize,
    pub host: HostAddress,
    pub node_id: NodeId,
    pub monitor: WorkerMonitorRef,
    pub reporters: Vec<ReporterRef>,
    pub streams: Vec<StreamId>,
}

pub struct Cluster {
    pub job: JobMonitorRef,
    pub hosts: Vec<HostNode>,
    /// Latest ratio table seen by the sink; empty until the first publication.
    pub ratios: watch::Receiver<RatioTable>,
}

impl Cluster {
    /// Spawn every actor and register it with its parent.
    pub fn boot(config: &SimConfig, supervisor: &mut Supervisor) -> Self {
        let (master, master_rx) = MasterRef::channel("master");
        supervisor.track("master", tokio::spawn(run_master(master_rx)));

        let (job, handle) = JobMonitor::spawn(config.job_monitor.clone(), Some(master));
        supervisor.track("job-monitor", handle);

        let (ratio_tx, ratios) = watch::channel(RatioTable::new());
        let (sink, sink_rx) = RatioSinkRef::channel("ratio-sink");
        supervisor.track("ratio-sink", tokio::spawn(run_ratio_sink(sink_rx, ratio_tx)));
        report(job.register_ratio_sink(sink));
        report(job.batch_duration(config.batch_duration()));

        let mut hosts = Vec::with_capacity(config.hosts);
        for index in 0..config.hosts {
            let host = HostAddress::new(format!("host-{:02}", index));
            let node_id = NodeId(index as u32);

            let (monitor, handle) = WorkerMonitor::spawn(
                node_id,
                host.clone(),
                config.worker_monitor.clone(),
                job.clone(),
            );
            supervisor.track(format!("worker-monitor-{}", node_id), handle);

            let reporters = (0..config.reporters_per_host)
                .map(|slot| {
                    let reporter_id = ReporterId((index * config.reporters_per_host + slot) as u64);
                    let (reporter, handle) = SpeedReporter::spawn(reporter_id, monitor.clone());
                    supervisor.track(format!("speed-reporter-{}", reporter_id), handle);
                    reporter
                })
                .collect();

            let streams = (0..config.streams_per_host)
                .map(|slot| {
                    let stream_id = StreamId((index * config.streams_per_host + slot) as u32);
                    let (source, source_rx) = DataSourceRef::channel("data-source");
                    supervisor.track(
                        format!("data-source-{}", stream_id),
                        tokio::spawn(run_data_source(stream_id, host.clone(), source_rx)),
                    );
                    report(job.register_data_source(stream_id, host.clone(), source));
                    stream_id
                })
                .collect();

            hosts.push(HostNode {
                index,
                host,
                node_id,
                monitor,
                reporters,
                streams,
            });
        }

        tracing::info!(hosts = hosts.len(), "cluster booted");
        Self { job, hosts, ratios }
    }

    /// Push the hot fields of a reloaded config to the running actors.
    pub fn apply_hot_config(&self, config: &SimConfig) {
        report(self.job.default_batch_duration(config.job_monitor.default_batch_duration()));
        let window = config.worker_monitor.reporter_stale_after();
        for node in &self.hosts {
            report(node.monitor.reporter_stale_after(window));
        }
    }

    /// Stop leaves first so their deregistrations reach live parents.
    pub fn shutdown(&self) {
        for node in &self.hosts {
            for reporter in &node.reporters {
                report(reporter.shutdown());
            }
        }
        for node in &self.hosts {
            report(node.monitor.shutdown());
        }
        report(self.job.shutdown());
    }
}

pub(crate) fn report(result: flowbal_types::Result<()>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_peer_gone() => tracing::debug!(error = %e, "peer already stopped"),
        Err(e) => tracing::warn!(error = %e, "message not delivered"),
    }
}

async fn run_master(mut mailbox: Mailbox<MasterMsg>) {
    while let Some(msg) = mailbox.recv().await {
        match msg {
            MasterMsg::RegisterJobMonitor { job_id, monitor } => {
                tracing::info!(%job_id, "job monitor registered with master");
                report(monitor.master_ack());
            }
        }
    }
}

async fn run_ratio_sink(mut mailbox: Mailbox<RatioSinkMsg>, latest: watch::Sender<RatioTable>) {
    while let Some(msg) = mailbox.recv().await {
        match msg {
            RatioSinkMsg::RegisterAck => tracing::debug!("ratio sink acknowledged"),
            RatioSinkMsg::Ratios(table) => {
                let rendered: Vec<String> = table
                    .iter()
                    .map(|(host, ratio)| format!("{}={:.3}", host, ratio))
                    .collect();
                tracing::info!(ratios = %rendered.join(" "), "applying ratio table");
                latest.send_replace(table);
            }
        }
    }
}

async fn run_data_source(stream_id: StreamId, host: HostAddress, mut mailbox: Mailbox<DataSourceCommand>) {
    let mut split = false;
    while let Some(cmd) = mailbox.recv().await {
        match cmd {
            DataSourceCommand::RegisterAck { .. } => {
                tracing::debug!(%stream_id, %host, "data source acknowledged");
            }
            DataSourceCommand::Split(msg) if msg.split && !split => {
                split = true;
                tracing::info!(%stream_id, %host, "splitting stream in two");
            }
            DataSourceCommand::Split(_) => {}
        }
    }
}
