use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowbal_app::{Application, Supervisor};
use flowbal_config::ConfigManager;
use flowbal_logging::LogHandle;
use flowbal_types::{make_error_msg, Result, StatusCode};
use tokio::sync::oneshot;

use crate::cluster::Cluster;
use crate::config::SimConfig;
use crate::workload;

const STOP_GRACE: Duration = Duration::from_secs(2);

pub struct SimApp {
    manager: Arc<ConfigManager<SimConfig>>,
    log: Arc<LogHandle>,
    done: Option<oneshot::Sender<u64>>,
    config: Option<SimConfig>,
    supervisor: Option<Supervisor>,
    cluster: Option<Arc<Cluster>>,
}

impl SimApp {
    /// `done` fires with the number of completed batches when the workload ends on its own.
    pub fn new(manager: Arc<ConfigManager<SimConfig>>, log: Arc<LogHandle>, done: oneshot::Sender<u64>) -> Self {
        Self {
            manager,
            log,
            done: Some(done),
            config: None,
            supervisor: None,
            cluster: None,
        }
    }

    fn spawn_reloader(&self, supervisor: &mut Supervisor, interval: Duration, cluster: Arc<Cluster>) {
        if self.manager.path().is_none() {
            return;
        }
        let manager = self.manager.clone();
        let log = self.log.clone();
        supervisor.spawn_periodic("config-reload", interval, move || {
            let manager = manager.clone();
            let log = log.clone();
            let cluster = cluster.clone();
            async move {
                if let Some(config) = reload_config(&manager, &cluster) {
                    if let Err(e) = log.set_level(&config.log.level) {
                        tracing::warn!(error = %e, "cannot apply reloaded log level");
                    }
                }
            }
        });
    }
}

/// Re-read the config file and hand its hot fields to the running cluster.
fn reload_config(manager: &ConfigManager<SimConfig>, cluster: &Cluster) -> Option<Arc<SimConfig>> {
    if let Err(e) = manager.reload() {
        tracing::warn!(error = %e, "config reload failed, keeping current config");
        return None;
    }
    let config = Arc::clone(&*manager.get());
    cluster.apply_hot_config(&config);
    Some(config)
}

#[async_trait]
impl Application for SimApp {
    type Config = SimConfig;

    fn name(&self) -> &str {
        "flowbal-sim"
    }

    async fn init(&mut self, config: &SimConfig) -> Result<()> {
        let mut supervisor = Supervisor::new();
        let cluster = Arc::new(Cluster::boot(config, &mut supervisor));
        if config.reload_interval_secs > 0 {
            self.spawn_reloader(
                &mut supervisor,
                Duration::from_secs(config.reload_interval_secs),
                cluster.clone(),
            );
        }
        self.cluster = Some(cluster);
        self.supervisor = Some(supervisor);
        self.config = Some(config.clone());
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let (Some(supervisor), Some(cluster), Some(config)) =
            (self.supervisor.as_mut(), self.cluster.clone(), self.config.clone())
        else {
            return make_error_msg(StatusCode::FOUND_BUG, "start called before init");
        };
        let done = self.done.take();
        tracing::info!(
            hosts = config.hosts,
            batches = config.batches,
            batch = %config.batch_duration(),
            "starting workload"
        );
        supervisor.spawn("workload", move |shutdown| async move {
            let completed = workload::drive(config, &cluster, shutdown).await;
            tracing::info!(completed, "workload finished");
            if let Some(done) = done {
                let _ = done.send(completed);
            }
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(cluster) = self.cluster.take() {
            match cluster.job.snapshot().await {
                Ok(snap) => {
                    let summary = serde_json::to_string(&snap)
                        .unwrap_or_else(|e| format!("<unserializable: {}>", e));
                    tracing::info!(%summary, "final job monitor state");
                }
                Err(e) => tracing::warn!(error = %e, "job monitor already gone"),
            }
            cluster.shutdown();
        }
        if let Some(supervisor) = self.supervisor.take() {
            let failed = supervisor.shutdown(STOP_GRACE).await;
            if failed > 0 {
                tracing::warn!(failed, "some tasks did not stop cleanly");
            }
        }
        Ok(())
    }
}
