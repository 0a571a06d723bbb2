//! Per-job coordinator: turns host backlogs and node estimates into ratio
//! tables for the data-flow controller, one rebalance cycle at a time.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use flowbal_proto::{
    CycleFinished, DataSourceRef, EstimateReply, EstimateRequest, JobMonitorMsg, JobMonitorRef,
    JobMonitorSnapshot, LinkState, Mailbox, MasterRef, RatioSinkRef, RatioTable, StreamSpeedReport,
    WorkerMonitorRef,
};
use flowbal_rebalance::{RebalancePlan, RebalancePlanner};
use flowbal_types::{BatchDuration, CycleId, HostAddress, NodeId, StreamId};
use tokio::task::JoinHandle;

use crate::config::JobMonitorConfig;
use crate::split::SplitTracker;
use crate::state::{HostBacklog, NodeEstimates, StreamOrigins};
use crate::timer::RebalanceTimer;

#[derive(Debug)]
struct WorkerMonitorEntry {
    host: HostAddress,
    monitor: WorkerMonitorRef,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    cycles_started: u64,
    cycles_published: u64,
    estimate_requests_sent: u64,
}

/// Per-job coordinator actor.
///
/// Tracks received-but-unhandled bytes per host, runs one rebalance cycle at
/// a time when a processing cycle finishes, and publishes the resulting ratio
/// table to the registered sink.
pub struct JobMonitor {
    config: JobMonitorConfig,
    me: JobMonitorRef,
    master: Option<MasterRef>,
    master_link: LinkState,
    batch_duration: Option<BatchDuration>,

    worker_monitors: BTreeMap<NodeId, WorkerMonitorEntry>,
    data_sources: BTreeMap<StreamId, DataSourceRef>,
    origins: StreamOrigins,
    ratio_sink: Option<RatioSinkRef>,

    backlog: HostBacklog,
    estimates: NodeEstimates,
    planner: RebalancePlanner,
    splits: SplitTracker,

    /// Armed while a rebalance cycle is in flight.
    timer: Option<RebalanceTimer>,
    last_ratios: Option<RatioTable>,
    counters: Counters,
}

impl JobMonitor {
    fn new(config: JobMonitorConfig, me: JobMonitorRef, master: Option<MasterRef>) -> Self {
        Self {
            planner: RebalancePlanner::new(config.rebalance_params()),
            config,
            me,
            master,
            master_link: LinkState::default(),
            batch_duration: None,
            worker_monitors: BTreeMap::new(),
            data_sources: BTreeMap::new(),
            origins: StreamOrigins::default(),
            ratio_sink: None,
            backlog: HostBacklog::default(),
            estimates: NodeEstimates::default(),
            splits: SplitTracker::default(),
            timer: None,
            last_ratios: None,
            counters: Counters::default(),
        }
    }

    /// Start the coordinator, registering with `master` when one is given.
    pub fn spawn(config: JobMonitorConfig, master: Option<MasterRef>) -> (JobMonitorRef, JoinHandle<()>) {
        let (me, mailbox) = JobMonitorRef::channel("job-monitor");
        let mut monitor = Self::new(config, me.clone(), master);
        monitor.register_with_master();
        let handle = tokio::spawn(monitor.run(mailbox));
        (me, handle)
    }

    fn register_with_master(&mut self) {
        let Some(master) = &self.master else {
            return;
        };
        match master.register_job_monitor(self.config.job_id, self.me.clone()) {
            Ok(()) => self.master_link.request_sent(),
            Err(e) => {
                tracing::warn!(job_id = %self.config.job_id, error = %e, "master unreachable");
            }
        }
    }

    async fn run(mut self, mut mailbox: Mailbox<JobMonitorMsg>) {
        tracing::info!(job_id = %self.config.job_id, "job monitor started");
        while let Some(msg) = mailbox.recv().await {
            if self.handle(msg).is_break() {
                break;
            }
        }
        self.timer = None;
        tracing::info!(
            job_id = %self.config.job_id,
            cycles_published = self.counters.cycles_published,
            "job monitor stopped"
        );
    }

    fn handle(&mut self, msg: JobMonitorMsg) -> ControlFlow<()> {
        match msg {
            JobMonitorMsg::RegisterWorkerMonitor {
                node_id,
                host,
                monitor,
            } => self.on_register_worker_monitor(node_id, host, monitor),
            JobMonitorMsg::DeregisterWorkerMonitor { node_id } => {
                if self.worker_monitors.remove(&node_id).is_some() {
                    tracing::info!(%node_id, "worker monitor deregistered");
                }
                self.estimates.remove(node_id);
            }
            JobMonitorMsg::RegisterDataSource {
                stream_id,
                host,
                source,
            } => {
                tracing::info!(%stream_id, %host, "data source registered");
                self.origins.insert(stream_id, host);
                if let Err(e) = source.register_ack(stream_id) {
                    tracing::warn!(%stream_id, error = %e, "data source ack not delivered");
                }
                self.data_sources.insert(stream_id, source);
            }
            JobMonitorMsg::DeregisterDataSource { stream_id } => {
                self.data_sources.remove(&stream_id);
                self.origins.remove(stream_id);
                self.splits.forget_stream(stream_id);
                tracing::info!(%stream_id, "data source deregistered");
            }
            JobMonitorMsg::RegisterRatioSink { sink } => {
                if let Err(e) = sink.register_ack() {
                    tracing::warn!(error = %e, "ratio sink ack not delivered");
                }
                if self.ratio_sink.replace(sink).is_some() {
                    tracing::info!("ratio sink replaced");
                } else {
                    tracing::info!("ratio sink registered");
                }
            }
            JobMonitorMsg::MasterAck => {
                if self.master_link.acknowledge() {
                    tracing::info!(job_id = %self.config.job_id, "registered with master");
                }
            }
            JobMonitorMsg::BatchDuration(duration) => self.on_batch_duration(duration),
            JobMonitorMsg::DefaultBatchDuration(duration) => self.on_default_batch_duration(duration),
            JobMonitorMsg::DataReceived(data) => self.backlog.add(data.host, data.bytes),
            JobMonitorMsg::CycleFinished(cycle) => self.on_cycle_finished(cycle),
            JobMonitorMsg::StreamSpeedReport(report) => self.on_stream_speed(report),
            JobMonitorMsg::EstimateReply(reply) => self.on_estimate_reply(reply),
            JobMonitorMsg::RebalanceTick { cycle_id } => self.on_rebalance_tick(cycle_id),
            JobMonitorMsg::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            JobMonitorMsg::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Batch duration in effect: the last reported one, else the configured default.
    fn effective_batch(&self) -> BatchDuration {
        self.batch_duration
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| self.config.default_batch_duration())
    }

    fn on_register_worker_monitor(&mut self, node_id: NodeId, host: HostAddress, monitor: WorkerMonitorRef) {
        if let Err(e) = monitor.register_ack(self.effective_batch()) {
            tracing::warn!(%node_id, error = %e, "worker monitor ack not delivered");
        }
        let previous = self
            .worker_monitors
            .insert(node_id, WorkerMonitorEntry { host: host.clone(), monitor });
        tracing::info!(%node_id, %host, replaced = previous.is_some(), "worker monitor registered");
    }

    fn on_batch_duration(&mut self, duration: BatchDuration) {
        if duration.is_zero() {
            tracing::warn!("ignoring zero batch duration");
            return;
        }
        self.batch_duration = Some(duration);
        self.push_cadence(duration);
    }

    fn on_default_batch_duration(&mut self, duration: BatchDuration) {
        if duration.is_zero() {
            tracing::warn!("ignoring zero default batch duration");
            return;
        }
        let before = self.effective_batch();
        self.config.default_batch_duration_ms = duration.as_millis();
        let after = self.effective_batch();
        tracing::info!(%duration, in_effect = %after, "default batch duration updated");
        if after != before {
            self.push_cadence(after);
        }
    }

    fn push_cadence(&self, cadence: BatchDuration) {
        for (node_id, entry) in &self.worker_monitors {
            if let Err(e) = entry.monitor.work_cadence(cadence) {
                tracing::debug!(%node_id, error = %e, "work cadence not delivered");
            }
        }
    }

    fn on_cycle_finished(&mut self, cycle: CycleFinished) {
        if self.backlog.is_empty() {
            tracing::debug!(cycle_id = %cycle.cycle_id, "no backlog, skipping rebalance");
            return;
        }
        if let Some(timer) = &self.timer {
            tracing::debug!(
                cycle_id = %cycle.cycle_id,
                in_flight = %timer.cycle_id(),
                "rebalance already in flight, trigger ignored"
            );
            return;
        }

        self.counters.cycles_started += 1;
        self.request_estimates(cycle.cycle_id);

        let batch = self.effective_batch();
        self.timer = Some(RebalanceTimer::arm(cycle.cycle_id, batch, self.me.clone()));
        tracing::debug!(
            cycle_id = %cycle.cycle_id,
            workers = self.worker_monitors.len(),
            %batch,
            "rebalance cycle started"
        );
    }

    fn request_estimates(&mut self, cycle_id: CycleId) {
        let request = EstimateRequest { cycle_id };
        for (node_id, entry) in &self.worker_monitors {
            match entry.monitor.estimate_request(request) {
                Ok(()) => self.counters.estimate_requests_sent += 1,
                Err(e) => tracing::warn!(%node_id, error = %e, "estimate request dropped"),
            }
        }
    }

    fn on_stream_speed(&mut self, report: StreamSpeedReport) {
        self.splits.record_speed(report.stream_id, report.speed);
        self.origins.insert(report.stream_id, report.host);
    }

    fn on_estimate_reply(&mut self, reply: EstimateReply) {
        tracing::debug!(
            node_id = %reply.node_id,
            host = %reply.host,
            estimated = reply.estimated_outstanding,
            bytes_handled = reply.bytes_handled,
            "estimate received"
        );
        self.backlog.subtract(&reply.host, reply.bytes_handled);
        self.estimates.record(&reply);
        self.check_split(&reply.host);
    }

    fn check_split(&mut self, host: &HostAddress) {
        if self.splits.is_host_split(host) {
            return;
        }
        let streams: Vec<StreamId> = self
            .origins
            .streams_on(host.as_str())
            .filter(|s| self.data_sources.contains_key(s))
            .collect();
        if streams.is_empty() {
            return;
        }
        let handling = self.estimates.handling_rate(host);
        for stream_id in self.splits.decide(host, &streams, handling) {
            let Some(source) = self.data_sources.get(&stream_id) else {
                continue;
            };
            match source.split(stream_id) {
                Ok(()) => tracing::info!(%stream_id, %host, "split requested"),
                Err(e) => tracing::warn!(%stream_id, error = %e, "split request dropped"),
            }
        }
    }

    fn on_rebalance_tick(&mut self, cycle_id: CycleId) {
        match &self.timer {
            Some(timer) if timer.cycle_id() == cycle_id => {}
            _ => {
                tracing::debug!(%cycle_id, "stale rebalance tick ignored");
                return;
            }
        }
        if self.estimates.is_empty() {
            // Aggregators may have registered after the cycle started.
            tracing::debug!(
                %cycle_id,
                workers = self.worker_monitors.len(),
                "no estimates yet, asking again"
            );
            self.request_estimates(cycle_id);
            return;
        }

        let totals = self.estimates.per_host_totals();
        match self.planner.plan(&totals) {
            Ok(plan) => self.publish(cycle_id, plan),
            Err(e) => {
                tracing::warn!(%cycle_id, error = %e, "rebalance produced no table, waiting for the next tick");
            }
        }
    }

    fn publish(&mut self, cycle_id: CycleId, plan: RebalancePlan) {
        if let Err(e) = plan.table.validate() {
            tracing::error!(%cycle_id, error = %e, "computed ratio table is inconsistent");
        }
        if let Some(host) = &plan.capped {
            tracing::info!(%cycle_id, %host, streak = self.planner.cooldown().streak(), "host capped");
        }
        if let Some(host) = &plan.excluded {
            tracing::info!(%cycle_id, %host, "host cooling down, excluded from this cycle");
        }

        match &self.ratio_sink {
            Some(sink) => match sink.publish(plan.table.clone()) {
                Ok(()) => tracing::info!(%cycle_id, ratios = ?plan.table, "ratio table published"),
                Err(e) => tracing::warn!(%cycle_id, error = %e, "ratio table dropped"),
            },
            None => tracing::warn!(%cycle_id, "no ratio sink registered, table not delivered"),
        }

        self.last_ratios = Some(plan.table);
        self.counters.cycles_published += 1;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    fn snapshot(&self) -> JobMonitorSnapshot {
        let cooldown = self.planner.cooldown();
        JobMonitorSnapshot {
            job_id: self.config.job_id,
            master_link: self.master_link,
            batch_duration: self.effective_batch(),
            worker_monitors: self
                .worker_monitors
                .iter()
                .map(|(id, e)| (*id, e.host.clone()))
                .collect(),
            data_sources: self
                .data_sources
                .keys()
                .filter_map(|id| self.origins.host_of(*id).map(|h| (*id, h.clone())))
                .collect(),
            has_ratio_sink: self.ratio_sink.is_some(),
            backlog: self.backlog.to_map(),
            host_estimates: self.estimates.per_host_totals(),
            rebalance_in_flight: self.timer.is_some(),
            active_cycle: self.timer.as_ref().map(|t| t.cycle_id()),
            last_ratios: self.last_ratios.clone(),
            last_capped: cooldown.last_capped().cloned(),
            cap_streak: cooldown.streak(),
            split_streams: self.splits.split_streams().clone(),
            cycles_started: self.counters.cycles_started,
            cycles_published: self.counters.cycles_published,
            estimate_requests_sent: self.counters.estimate_requests_sent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbal_proto::{DataSourceCommand, MasterMsg, RatioSinkMsg, SplitStream, WorkerMonitorMsg};
    use flowbal_types::JobId;
    use std::time::Duration;

    const BATCH_MS: u64 = 3_000;

    struct Worker {
        node_id: NodeId,
        host: HostAddress,
        rx: Mailbox<WorkerMonitorMsg>,
    }

    impl Worker {
        fn requests(&mut self) -> Vec<CycleId> {
            let mut cycles = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                if let WorkerMonitorMsg::EstimateRequest(req) = msg {
                    cycles.push(req.cycle_id);
                }
            }
            cycles
        }

        fn reply(&self, outstanding: u64, bytes_handled: u64, handling_rate: f64) -> EstimateReply {
            EstimateReply {
                estimated_outstanding: outstanding,
                bytes_handled,
                node_id: self.node_id,
                host: self.host.clone(),
                handling_rate,
            }
        }
    }

    fn config() -> JobMonitorConfig {
        JobMonitorConfig {
            job_id: JobId(1),
            default_batch_duration_ms: BATCH_MS,
            ..JobMonitorConfig::default()
        }
    }

    fn register_worker(job: &JobMonitorRef, node: u32, host: &str) -> Worker {
        let (monitor, rx) = WorkerMonitorRef::channel("worker-monitor");
        job.register_worker_monitor(NodeId(node), HostAddress::from(host), monitor)
            .unwrap();
        Worker {
            node_id: NodeId(node),
            host: HostAddress::from(host),
            rx,
        }
    }

    fn register_sink(job: &JobMonitorRef) -> Mailbox<RatioSinkMsg> {
        let (sink, rx) = RatioSinkRef::channel("ratio-sink");
        job.register_ratio_sink(sink).unwrap();
        rx
    }

    fn published(rx: &mut Mailbox<RatioSinkMsg>) -> Vec<RatioTable> {
        let mut tables = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let RatioSinkMsg::Ratios(table) = msg {
                tables.push(table);
            }
        }
        tables
    }

    fn assert_ratio(table: &RatioTable, host: &str, expected: f64) {
        let got = table.get(host).unwrap();
        assert!((got - expected).abs() < 1e-9, "{}: expected {}, got {}", host, expected, got);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registrations_are_acknowledged() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut worker = register_worker(&job, 1, "a");
        let mut sink_rx = register_sink(&job);
        let (source, mut source_rx) = DataSourceRef::channel("data-source");
        job.register_data_source(StreamId(9), HostAddress::from("a"), source)
            .unwrap();

        let snap = job.snapshot().await.unwrap();
        assert_eq!(snap.master_link, LinkState::Unregistered);
        assert_eq!(snap.worker_monitors.get(&NodeId(1)).map(|h| h.as_str()), Some("a"));
        assert_eq!(snap.data_sources.get(&StreamId(9)).map(|h| h.as_str()), Some("a"));
        assert!(snap.has_ratio_sink);

        match worker.rx.try_recv() {
            Ok(WorkerMonitorMsg::RegisterAck { cadence }) => {
                assert_eq!(cadence, BatchDuration::from_millis(BATCH_MS));
            }
            other => panic!("expected ack, got {:?}", other),
        }
        assert!(matches!(sink_rx.try_recv(), Ok(RatioSinkMsg::RegisterAck)));
        assert_eq!(
            source_rx.try_recv().unwrap(),
            DataSourceCommand::RegisterAck {
                stream_id: StreamId(9)
            }
        );

        job.deregister_worker_monitor(NodeId(1)).unwrap();
        job.deregister_data_source(StreamId(9)).unwrap();
        let snap = job.snapshot().await.unwrap();
        assert!(snap.worker_monitors.is_empty());
        assert!(snap.data_sources.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_master_handshake() {
        let (master, mut master_rx) = MasterRef::channel("master");
        let (job, _handle) = JobMonitor::spawn(config(), Some(master));
        match master_rx.try_recv() {
            Ok(MasterMsg::RegisterJobMonitor { job_id, monitor }) => {
                assert_eq!(job_id, JobId(1));
                assert!(monitor.same_actor(&job));
            }
            other => panic!("expected registration, got {:?}", other),
        }
        assert_eq!(job.snapshot().await.unwrap().master_link, LinkState::AwaitingAck);
        job.master_ack().unwrap();
        assert_eq!(job.snapshot().await.unwrap().master_link, LinkState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_backlog_no_cycle() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut worker = register_worker(&job, 1, "a");
        job.cycle_finished(CycleId(1), 0, 100).unwrap();
        let snap = job.snapshot().await.unwrap();
        assert!(!snap.rebalance_in_flight);
        assert_eq!(snap.cycles_started, 0);
        assert!(worker.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_in_flight_is_ignored() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut a = register_worker(&job, 1, "a");
        let mut b = register_worker(&job, 2, "b");
        job.data_received(HostAddress::from("a"), 1_000).unwrap();

        job.cycle_finished(CycleId(1), 0, 100).unwrap();
        job.cycle_finished(CycleId(2), 100, 200).unwrap();
        let snap = job.snapshot().await.unwrap();

        assert_eq!(a.requests(), vec![CycleId(1)]);
        assert_eq!(b.requests(), vec![CycleId(1)]);
        assert!(snap.rebalance_in_flight);
        assert_eq!(snap.active_cycle, Some(CycleId(1)));
        assert_eq!(snap.cycles_started, 1);
        assert_eq!(snap.estimate_requests_sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_publishes_capped_table() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut sink_rx = register_sink(&job);
        let workers = [
            register_worker(&job, 1, "a"),
            register_worker(&job, 2, "b"),
            register_worker(&job, 3, "c"),
        ];
        job.data_received(HostAddress::from("a"), 5_000).unwrap();
        job.cycle_finished(CycleId(1), 0, 100).unwrap();

        job.estimate_reply(workers[0].reply(900, 0, 0.0)).unwrap();
        job.estimate_reply(workers[1].reply(50, 0, 0.0)).unwrap();
        job.estimate_reply(workers[2].reply(50, 0, 0.0)).unwrap();
        job.snapshot().await.unwrap();
        assert!(published(&mut sink_rx).is_empty());

        // First tick a third of a batch in.
        tokio::time::sleep(Duration::from_millis(BATCH_MS / 3 + 10)).await;
        let snap = job.snapshot().await.unwrap();
        let tables = published(&mut sink_rx);
        assert_eq!(tables.len(), 1);
        assert_ratio(&tables[0], "a", 0.7);
        assert_ratio(&tables[0], "b", 0.15);
        assert_ratio(&tables[0], "c", 0.15);

        assert!(!snap.rebalance_in_flight);
        assert_eq!(snap.cycles_published, 1);
        assert_eq!(snap.last_capped.as_ref().map(|h| h.as_str()), Some("a"));
        assert_eq!(snap.cap_streak, 1);
        assert_eq!(snap.last_ratios.as_ref(), Some(&tables[0]));

        // The timer is gone: nothing more is published.
        tokio::time::sleep(Duration::from_millis(BATCH_MS * 5)).await;
        job.snapshot().await.unwrap();
        assert!(published(&mut sink_rx).is_empty());

        // A new trigger starts a fresh cycle.
        job.cycle_finished(CycleId(2), 100, 200).unwrap();
        assert_eq!(job.snapshot().await.unwrap().active_cycle, Some(CycleId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stays_armed_until_estimates_arrive() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut sink_rx = register_sink(&job);
        let worker = register_worker(&job, 1, "a");
        job.data_received(HostAddress::from("a"), 10).unwrap();
        job.cycle_finished(CycleId(1), 0, 100).unwrap();

        tokio::time::sleep(Duration::from_millis(BATCH_MS / 3 + 10)).await;
        let snap = job.snapshot().await.unwrap();
        assert!(snap.rebalance_in_flight);
        assert!(published(&mut sink_rx).is_empty());

        job.estimate_reply(worker.reply(100, 0, 1.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(BATCH_MS * 2)).await;
        let snap = job.snapshot().await.unwrap();
        let tables = published(&mut sink_rx);
        assert_eq!(tables.len(), 1);
        assert_ratio(&tables[0], "a", 1.0);
        assert!(!snap.rebalance_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_batch_duration_drives_timer_and_cadence() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut sink_rx = register_sink(&job);
        let mut worker = register_worker(&job, 1, "a");
        job.batch_duration(BatchDuration::from_millis(600)).unwrap();
        job.data_received(HostAddress::from("a"), 10).unwrap();
        job.cycle_finished(CycleId(1), 0, 100).unwrap();
        job.estimate_reply(worker.reply(10, 0, 1.0)).unwrap();

        tokio::time::sleep(Duration::from_millis(210)).await;
        job.snapshot().await.unwrap();
        assert_eq!(published(&mut sink_rx).len(), 1);

        let mut cadences = Vec::new();
        while let Ok(msg) = worker.rx.try_recv() {
            match msg {
                WorkerMonitorMsg::RegisterAck { cadence } | WorkerMonitorMsg::WorkCadence(cadence) => {
                    cadences.push(cadence.as_millis())
                }
                _ => {}
            }
        }
        assert_eq!(cadences, vec![BATCH_MS, 600]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloaded_default_batch_applies_until_one_is_reported() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut sink_rx = register_sink(&job);
        let mut worker = register_worker(&job, 1, "a");
        job.default_batch_duration(BatchDuration::from_millis(900))
            .unwrap();
        assert_eq!(
            job.snapshot().await.unwrap().batch_duration,
            BatchDuration::from_millis(900)
        );

        job.data_received(HostAddress::from("a"), 10).unwrap();
        job.cycle_finished(CycleId(1), 0, 100).unwrap();
        job.estimate_reply(worker.reply(10, 0, 1.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(310)).await;
        job.snapshot().await.unwrap();
        assert_eq!(published(&mut sink_rx).len(), 1);

        // A reported duration wins over the fallback.
        job.batch_duration(BatchDuration::from_millis(600)).unwrap();
        job.default_batch_duration(BatchDuration::from_millis(1_200))
            .unwrap();
        job.default_batch_duration(BatchDuration::ZERO).unwrap();
        let snap = job.snapshot().await.unwrap();
        assert_eq!(snap.batch_duration, BatchDuration::from_millis(600));

        let mut cadences = Vec::new();
        while let Ok(msg) = worker.rx.try_recv() {
            match msg {
                WorkerMonitorMsg::RegisterAck { cadence } | WorkerMonitorMsg::WorkCadence(cadence) => {
                    cadences.push(cadence.as_millis())
                }
                _ => {}
            }
        }
        assert_eq!(cadences, vec![BATCH_MS, 900, 600]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_is_ignored() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut sink_rx = register_sink(&job);
        let worker = register_worker(&job, 1, "a");
        job.data_received(HostAddress::from("a"), 10).unwrap();
        job.cycle_finished(CycleId(4), 0, 100).unwrap();
        job.estimate_reply(worker.reply(10, 0, 1.0)).unwrap();

        job.tell(JobMonitorMsg::RebalanceTick { cycle_id: CycleId(3) })
            .unwrap();
        let snap = job.snapshot().await.unwrap();
        assert!(snap.rebalance_in_flight);
        assert!(published(&mut sink_rx).is_empty());

        job.tell(JobMonitorMsg::RebalanceTick { cycle_id: CycleId(4) })
            .unwrap();
        let snap = job.snapshot().await.unwrap();
        assert!(!snap.rebalance_in_flight);
        assert_eq!(published(&mut sink_rx).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimate_reply_corrects_backlog() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let worker = register_worker(&job, 1, "a");
        job.data_received(HostAddress::from("a"), 1_000).unwrap();
        job.data_received(HostAddress::from("a"), 500).unwrap();
        job.estimate_reply(worker.reply(0, 2_000, 0.0)).unwrap();
        let snap = job.snapshot().await.unwrap();
        assert_eq!(snap.backlog.get("a"), Some(&-500));
        assert_eq!(snap.host_estimates.get("a"), Some(&0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publication_without_sink_still_completes_cycle() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let worker = register_worker(&job, 1, "a");
        job.data_received(HostAddress::from("a"), 10).unwrap();
        job.cycle_finished(CycleId(1), 0, 100).unwrap();
        job.estimate_reply(worker.reply(10, 0, 1.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(BATCH_MS / 3 + 10)).await;
        let snap = job.snapshot().await.unwrap();
        assert!(!snap.rebalance_in_flight);
        assert_eq!(snap.cycles_published, 1);
        assert!(snap.last_ratios.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overloaded_host_splits_once() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let worker = register_worker(&job, 1, "a");
        let other = register_worker(&job, 2, "b");

        let mut sources = Vec::new();
        for (stream, host) in [(1, "a"), (2, "a"), (3, "b")] {
            let (source, rx) = DataSourceRef::channel("data-source");
            job.register_data_source(StreamId(stream), HostAddress::from(host), source)
                .unwrap();
            sources.push(rx);
        }
        job.stream_speed(StreamId(1), 600.0, HostAddress::from("a")).unwrap();
        job.stream_speed(StreamId(2), 600.0, HostAddress::from("a")).unwrap();
        job.stream_speed(StreamId(3), 600.0, HostAddress::from("b")).unwrap();

        job.estimate_reply(worker.reply(0, 0, 1_000.0)).unwrap();
        job.estimate_reply(other.reply(0, 0, 5_000.0)).unwrap();
        job.estimate_reply(worker.reply(0, 0, 10.0)).unwrap();
        let snap = job.snapshot().await.unwrap();
        assert_eq!(
            snap.split_streams.iter().copied().collect::<Vec<_>>(),
            vec![StreamId(1), StreamId(2)]
        );

        let commands: Vec<Vec<DataSourceCommand>> = sources
            .iter_mut()
            .map(|rx| {
                let mut cmds = Vec::new();
                while let Ok(cmd) = rx.try_recv() {
                    cmds.push(cmd);
                }
                cmds
            })
            .collect();
        for (i, stream) in [(0, 1), (1, 2)] {
            assert_eq!(
                commands[i],
                vec![
                    DataSourceCommand::RegisterAck {
                        stream_id: StreamId(stream)
                    },
                    DataSourceCommand::Split(SplitStream {
                        stream_id: StreamId(stream),
                        split: true
                    }),
                ]
            );
        }
        assert_eq!(commands[2].len(), 1, "host b keeps up, no split");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hot_host_sits_out_after_repeated_caps() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut sink_rx = register_sink(&job);
        let workers = [
            register_worker(&job, 1, "hot"),
            register_worker(&job, 2, "b"),
            register_worker(&job, 3, "c"),
            register_worker(&job, 4, "d"),
        ];
        job.data_received(HostAddress::from("hot"), 1).unwrap();
        for (w, outstanding) in workers.iter().zip([9_000, 500, 500, 400]) {
            job.estimate_reply(w.reply(outstanding, 0, 1.0)).unwrap();
        }

        let mut tables = Vec::new();
        for cycle in 1..=5u64 {
            job.cycle_finished(CycleId(cycle), 0, 0).unwrap();
            job.tell(JobMonitorMsg::RebalanceTick { cycle_id: CycleId(cycle) })
                .unwrap();
            job.snapshot().await.unwrap();
            tables.extend(published(&mut sink_rx));
        }
        assert_eq!(tables.len(), 5);
        for table in &tables[..4] {
            assert_ratio(table, "hot", 0.7);
        }
        assert!(tables[4].get("hot").is_none());
        assert!(tables[4].get("d").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregator_registered_mid_cycle_is_asked_on_tick() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut sink_rx = register_sink(&job);
        job.data_received(HostAddress::from("a"), 100).unwrap();
        job.cycle_finished(CycleId(1), 0, 100).unwrap();
        assert_eq!(job.snapshot().await.unwrap().estimate_requests_sent, 0);

        let mut worker = register_worker(&job, 1, "a");
        tokio::time::sleep(Duration::from_millis(BATCH_MS / 3 + 10)).await;
        job.snapshot().await.unwrap();
        assert_eq!(worker.requests(), vec![CycleId(1)]);

        job.estimate_reply(worker.reply(100, 0, 1.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(BATCH_MS * 2)).await;
        let snap = job.snapshot().await.unwrap();
        let tables = published(&mut sink_rx);
        assert_eq!(tables.len(), 1);
        assert_ratio(&tables[0], "a", 1.0);
        assert!(!snap.rebalance_in_flight);

        job.cycle_finished(CycleId(2), 100, 200).unwrap();
        job.snapshot().await.unwrap();
        assert_eq!(worker.requests(), vec![CycleId(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_replies_publish_and_late_reply_counts_next_cycle() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let mut sink_rx = register_sink(&job);
        let a = register_worker(&job, 1, "a");
        let b = register_worker(&job, 2, "b");
        job.data_received(HostAddress::from("a"), 100).unwrap();

        job.cycle_finished(CycleId(1), 0, 100).unwrap();
        job.estimate_reply(a.reply(600, 0, 1.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(BATCH_MS / 3 + 10)).await;
        job.snapshot().await.unwrap();
        let tables = published(&mut sink_rx);
        assert_eq!(tables.len(), 1);
        assert_ratio(&tables[0], "a", 1.0);
        assert!(tables[0].get("b").is_none());

        // b answers after the table went out.
        job.estimate_reply(b.reply(300, 0, 1.0)).unwrap();
        job.cycle_finished(CycleId(2), 100, 200).unwrap();
        tokio::time::sleep(Duration::from_millis(BATCH_MS / 3 + 10)).await;
        let snap = job.snapshot().await.unwrap();
        let tables = published(&mut sink_rx);
        assert_eq!(tables.len(), 1);
        assert_ratio(&tables[0], "a", 2.0 / 3.0);
        assert_ratio(&tables[0], "b", 1.0 / 3.0);
        assert_eq!(snap.cycles_published, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_host_with_ingesting_stream_splits() {
        let (job, _handle) = JobMonitor::spawn(config(), None);
        let worker = register_worker(&job, 1, "a");
        let (source, mut source_rx) = DataSourceRef::channel("data-source");
        job.register_data_source(StreamId(1), HostAddress::from("a"), source)
            .unwrap();
        job.stream_speed(StreamId(1), 1_000.0, HostAddress::from("a"))
            .unwrap();

        job.estimate_reply(worker.reply(0, 0, 0.0)).unwrap();
        let snap = job.snapshot().await.unwrap();
        assert_eq!(snap.split_streams.iter().copied().collect::<Vec<_>>(), vec![StreamId(1)]);
        assert!(matches!(source_rx.try_recv(), Ok(DataSourceCommand::RegisterAck { .. })));
        assert_eq!(
            source_rx.try_recv().unwrap(),
            DataSourceCommand::Split(SplitStream {
                stream_id: StreamId(1),
                split: true
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_the_actor() {
        let (job, handle) = JobMonitor::spawn(config(), None);
        let _worker = register_worker(&job, 1, "a");
        job.data_received(HostAddress::from("a"), 10).unwrap();
        job.cycle_finished(CycleId(1), 0, 100).unwrap();
        job.shutdown().unwrap();
        handle.await.unwrap();
        assert!(job.snapshot().await.is_err());
    }
}
