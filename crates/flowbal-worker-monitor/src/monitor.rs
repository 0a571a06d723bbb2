//! Node aggregator: folds the speed reports of every task executor on one
//! host into a single handling rate and answers the coordinator's estimate
//! requests with it.

use std::ops::ControlFlow;
use std::time::Duration;

use flowbal_proto::{
    EstimateReply, EstimateRequest, JobMonitorRef, LinkState, Mailbox, WorkerMonitorMsg,
    WorkerMonitorRef, WorkerMonitorSnapshot,
};
use flowbal_types::{BatchDuration, HostAddress, NodeId};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::WorkerMonitorConfig;
use crate::state::{estimate_outstanding, NodeAggregate};

/// Per-node aggregator actor.
pub struct WorkerMonitor {
    node_id: NodeId,
    host: HostAddress,
    config: WorkerMonitorConfig,
    coordinator: JobMonitorRef,
    link: LinkState,
    cadence: BatchDuration,
    stale_after: Option<Duration>,
    aggregate: NodeAggregate,
    estimates_sent: u64,
}

impl WorkerMonitor {
    pub fn new(
        node_id: NodeId,
        host: HostAddress,
        config: WorkerMonitorConfig,
        coordinator: JobMonitorRef,
    ) -> Self {
        Self {
            node_id,
            host,
            cadence: config.default_cadence(),
            stale_after: config.reporter_stale_after(),
            config,
            coordinator,
            link: LinkState::default(),
            aggregate: NodeAggregate::new(),
            estimates_sent: 0,
        }
    }

    /// Register with the job monitor and start the actor task.
    pub fn spawn(
        node_id: NodeId,
        host: HostAddress,
        config: WorkerMonitorConfig,
        coordinator: JobMonitorRef,
    ) -> (WorkerMonitorRef, JoinHandle<()>) {
        let (me, mailbox) = WorkerMonitorRef::channel("worker-monitor");
        let mut monitor = Self::new(node_id, host, config, coordinator);
        monitor.register(me.clone());
        let handle = tokio::spawn(monitor.run(mailbox));
        (me, handle)
    }

    fn register(&mut self, me: WorkerMonitorRef) {
        match self
            .coordinator
            .register_worker_monitor(self.node_id, self.host.clone(), me)
        {
            Ok(()) => self.link.request_sent(),
            Err(e) => {
                tracing::warn!(node_id = %self.node_id, host = %self.host, error = %e, "job monitor unreachable");
            }
        }
    }

    pub async fn run(mut self, mut mailbox: Mailbox<WorkerMonitorMsg>) {
        let mut poll = tokio::time::interval_at(
            Instant::now() + self.config.poll_initial_delay(),
            self.config.poll_interval(),
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(node_id = %self.node_id, host = %self.host, "worker monitor started");
        loop {
            tokio::select! {
                msg = mailbox.recv() => {
                    let Some(msg) = msg else { break };
                    if self.handle(msg).is_break() {
                        break;
                    }
                }
                _ = poll.tick() => self.poll(),
            }
        }
        self.deregister();
        tracing::info!(node_id = %self.node_id, estimates_sent = self.estimates_sent, "worker monitor stopped");
    }

    fn handle(&mut self, msg: WorkerMonitorMsg) -> ControlFlow<()> {
        match msg {
            WorkerMonitorMsg::Register {
                reporter_id,
                reporter,
            } => {
                let fresh = self.aggregate.register(reporter_id, reporter.clone());
                tracing::debug!(node_id = %self.node_id, %reporter_id, fresh, "reporter registered");
                if let Err(e) = reporter.register_ack() {
                    tracing::warn!(%reporter_id, error = %e, "register ack not delivered");
                }
            }
            WorkerMonitorMsg::Deregister { reporter_id } => {
                if self.aggregate.deregister(reporter_id) {
                    tracing::debug!(node_id = %self.node_id, %reporter_id, "reporter deregistered");
                }
            }
            WorkerMonitorMsg::Report(sample) => {
                self.aggregate.record(sample, Instant::now());
            }
            WorkerMonitorMsg::QueryTotal(reply) => {
                let _ = reply.send(self.aggregate.total_rate());
            }
            WorkerMonitorMsg::RegisterAck { cadence } => {
                if self.link.acknowledge() {
                    tracing::info!(node_id = %self.node_id, host = %self.host, %cadence, "registered with job monitor");
                }
                self.set_cadence(cadence);
            }
            WorkerMonitorMsg::WorkCadence(cadence) => self.set_cadence(cadence),
            WorkerMonitorMsg::EstimateRequest(request) => self.on_estimate_request(request),
            WorkerMonitorMsg::ReporterStaleAfter(window) => {
                if window != self.stale_after {
                    tracing::info!(node_id = %self.node_id, ?window, "reporter eviction window updated");
                    self.stale_after = window;
                }
            }
            WorkerMonitorMsg::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            WorkerMonitorMsg::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn set_cadence(&mut self, cadence: BatchDuration) {
        if cadence.is_zero() || cadence == self.cadence {
            return;
        }
        tracing::debug!(node_id = %self.node_id, from = %self.cadence, to = %cadence, "work cadence updated");
        self.cadence = cadence;
    }

    fn on_estimate_request(&mut self, request: EstimateRequest) {
        if !self.link.is_active() {
            tracing::warn!(node_id = %self.node_id, cycle_id = %request.cycle_id, "estimate request before registration ack, ignored");
            return;
        }
        let handling_rate = self.aggregate.total_rate();
        let reply = EstimateReply {
            estimated_outstanding: estimate_outstanding(handling_rate, self.cadence),
            bytes_handled: self.aggregate.take_bytes_handled(),
            node_id: self.node_id,
            host: self.host.clone(),
            handling_rate,
        };
        tracing::debug!(
            node_id = %self.node_id,
            cycle_id = %request.cycle_id,
            estimated = reply.estimated_outstanding,
            bytes_handled = reply.bytes_handled,
            "estimate reply"
        );
        match self.coordinator.estimate_reply(reply) {
            Ok(()) => self.estimates_sent += 1,
            Err(e) => tracing::warn!(node_id = %self.node_id, error = %e, "estimate reply dropped"),
        }
    }

    fn poll(&mut self) {
        if let Some(max_age) = self.stale_after {
            for reporter_id in self.aggregate.evict_stale(Instant::now(), max_age) {
                tracing::info!(node_id = %self.node_id, %reporter_id, "evicted silent reporter");
            }
        }
        for (reporter_id, reporter) in self.aggregate.registered() {
            if let Err(e) = reporter.report_now() {
                tracing::debug!(%reporter_id, error = %e, "report-now nudge dropped");
            }
        }
    }

    fn deregister(&mut self) {
        if !self.link.has_registered() {
            return;
        }
        if let Err(e) = self.coordinator.deregister_worker_monitor(self.node_id) {
            tracing::debug!(node_id = %self.node_id, error = %e, "deregistration not delivered");
        }
        self.link = LinkState::Unregistered;
    }

    fn snapshot(&self) -> WorkerMonitorSnapshot {
        WorkerMonitorSnapshot {
            node_id: self.node_id,
            host: self.host.clone(),
            link: self.link,
            cadence: self.cadence,
            registered_reporters: self.aggregate.registered_len(),
            samples: self.aggregate.samples(),
            total_rate: self.aggregate.total_rate(),
            bytes_handled_pending: self.aggregate.bytes_handled(),
            estimates_sent: self.estimates_sent,
            reporter_stale_after_ms: self.stale_after.map_or(0, |d| d.as_millis() as u64),
        }
    }
}
