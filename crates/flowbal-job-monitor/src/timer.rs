use std::time::Duration;

use flowbal_proto::{JobMonitorMsg, JobMonitorRef};
use flowbal_types::{BatchDuration, CycleId};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Repeating rebalance tick for one cycle.
///
/// Fires a third of a batch after arming, then every two batches, by posting
/// [`JobMonitorMsg::RebalanceTick`] into the job monitor's own mailbox. The
/// task is aborted when the timer is cancelled or dropped; a tick already
/// queued at that point still arrives and must be matched against the
/// current cycle by the receiver.
#[derive(Debug)]
pub struct RebalanceTimer {
    cycle_id: CycleId,
    handle: JoinHandle<()>,
}

impl RebalanceTimer {
    pub fn arm(cycle_id: CycleId, batch: BatchDuration, target: JobMonitorRef) -> Self {
        let first = Instant::now() + batch.rebalance_initial_delay();
        let period = batch.rebalance_period().max(MIN_PERIOD);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if target.tell(JobMonitorMsg::RebalanceTick { cycle_id }).is_err() {
                    break;
                }
            }
        });
        Self { cycle_id, handle }
    }

    pub fn cycle_id(&self) -> CycleId {
        self.cycle_id
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for RebalanceTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
