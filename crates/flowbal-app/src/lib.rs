mod supervisor;

pub use supervisor::Supervisor;

use async_trait::async_trait;
use flowbal_types::{Result, UtcTime};
use serde::{Deserialize, Serialize};

/// Metadata describing a running process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub hostname: String,
    pub pid: u32,
    pub started_at: UtcTime,
}

impl AppInfo {
    pub fn current(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into()),
            pid: std::process::id(),
            started_at: UtcTime::now(),
        }
    }
}

/// Lifecycle of a flowbal process.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    type Config: flowbal_config::Config + Clone;

    fn name(&self) -> &str;
    async fn init(&mut self, config: &Self::Config) -> Result<()>;
    async fn start(&mut self) -> Result<()>;
    async fn stop(&mut self) -> Result<()>;
}

/// Wait for CTRL+C or SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => { tracing::info!("received CTRL+C"); }
                    _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
                }
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM, waiting for CTRL+C only");
            }
        }
    }

    if let Err(e) = ctrl_c.await {
        tracing::error!(error = %e, "cannot listen for CTRL+C");
    }
}

/// Drive an application through init, start, `until`, and stop.
///
/// `until` is usually [`wait_for_shutdown_signal`]; a run that ends on its
/// own passes its completion future instead.
pub async fn run_application<A, F>(mut app: A, config: A::Config, until: F) -> Result<()>
where
    A: Application,
    F: std::future::Future<Output = ()> + Send,
{
    tracing::info!(app = app.name(), "initializing");
    app.init(&config).await?;
    app.start().await?;
    tracing::info!(app = app.name(), "started");
    until.await;
    tracing::info!(app = app.name(), "stopping");
    app.stop().await?;
    Ok(())
}
