//! Leaf reporter living next to one task executor. It smooths the executor's
//! throughput and pushes it to the node aggregator once registered.

use std::ops::ControlFlow;

use flowbal_proto::{
    LinkState, Mailbox, ReporterMsg, ReporterRef, ReporterSnapshot, SpeedSample, WorkCompleted,
    WorkerMonitorRef,
};
use flowbal_types::ReporterId;
use tokio::task::JoinHandle;

use crate::rate::SmoothedRate;

/// Leaf telemetry actor attached to one task executor.
///
/// Registers with its node's worker monitor on spawn and stays silent until
/// acknowledged. Each report carries the bytes finished since the previous
/// report, so work done before the acknowledgment is not lost and a
/// poll-driven re-send never counts the same bytes twice.
pub struct SpeedReporter {
    reporter_id: ReporterId,
    aggregator: WorkerMonitorRef,
    link: LinkState,
    rate: SmoothedRate,
    unreported_bytes: u64,
    last_sample: Option<SpeedSample>,
    reports_sent: u64,
}

impl SpeedReporter {
    pub fn new(reporter_id: ReporterId, aggregator: WorkerMonitorRef) -> Self {
        Self {
            reporter_id,
            aggregator,
            link: LinkState::default(),
            rate: SmoothedRate::new(),
            unreported_bytes: 0,
            last_sample: None,
            reports_sent: 0,
        }
    }

    /// Register with the aggregator and start the actor task.
    pub fn spawn(reporter_id: ReporterId, aggregator: WorkerMonitorRef) -> (ReporterRef, JoinHandle<()>) {
        let (me, mailbox) = ReporterRef::channel("speed-reporter");
        let mut reporter = Self::new(reporter_id, aggregator);
        reporter.register(me.clone());
        let handle = tokio::spawn(reporter.run(mailbox));
        (me, handle)
    }

    fn register(&mut self, me: ReporterRef) {
        match self.aggregator.register(self.reporter_id, me) {
            Ok(()) => {
                self.link.request_sent();
                tracing::debug!(reporter_id = %self.reporter_id, "register request sent");
            }
            Err(e) => {
                tracing::warn!(reporter_id = %self.reporter_id, error = %e, "worker monitor unreachable, reporter stays unregistered");
            }
        }
    }

    pub async fn run(mut self, mut mailbox: Mailbox<ReporterMsg>) {
        while let Some(msg) = mailbox.recv().await {
            if self.handle(msg).is_break() {
                break;
            }
        }
        self.deregister();
        tracing::debug!(reporter_id = %self.reporter_id, reports_sent = self.reports_sent, "speed reporter stopped");
    }

    fn handle(&mut self, msg: ReporterMsg) -> ControlFlow<()> {
        match msg {
            ReporterMsg::WorkCompleted(work) => self.on_work_completed(work),
            ReporterMsg::ReportNow => {
                if self.last_sample.is_some() {
                    self.send_report();
                }
            }
            ReporterMsg::RegisterAck => {
                if self.link.acknowledge() {
                    tracing::info!(reporter_id = %self.reporter_id, "registered with worker monitor");
                }
            }
            ReporterMsg::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            ReporterMsg::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn on_work_completed(&mut self, work: WorkCompleted) {
        let rate = self
            .rate
            .observe(work.start_ms, work.end_ms, work.bytes_processed);
        self.unreported_bytes = self.unreported_bytes.saturating_add(work.bytes_processed);
        self.last_sample = Some(SpeedSample {
            reporter_id: self.reporter_id,
            bytes_processed: self.unreported_bytes,
            smoothed_rate: rate,
        });
        self.send_report();
    }

    fn send_report(&mut self) {
        if !self.link.is_active() {
            return;
        }
        let Some(last) = self.last_sample.as_mut() else {
            return;
        };
        let sample = SpeedSample {
            bytes_processed: self.unreported_bytes,
            ..*last
        };
        match self.aggregator.report(sample) {
            Ok(()) => {
                *last = sample;
                self.unreported_bytes = 0;
                self.reports_sent += 1;
            }
            Err(e) => {
                tracing::warn!(reporter_id = %self.reporter_id, error = %e, "speed report dropped");
            }
        }
    }

    fn deregister(&mut self) {
        if !self.link.has_registered() {
            return;
        }
        if let Err(e) = self.aggregator.deregister(self.reporter_id) {
            tracing::debug!(reporter_id = %self.reporter_id, error = %e, "deregistration not delivered");
        }
        self.link = LinkState::Unregistered;
    }

    fn snapshot(&self) -> ReporterSnapshot {
        ReporterSnapshot {
            reporter_id: self.reporter_id,
            link: self.link,
            last_sample: self.last_sample,
            reports_sent: self.reports_sent,
        }
    }
}
