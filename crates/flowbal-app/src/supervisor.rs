use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owns a process's long-running tasks and stops them together.
///
/// Actor tasks stop when told to over their own mailbox and are only
/// tracked here; helper tasks started through [`Supervisor::spawn`] or
/// [`Supervisor::spawn_periodic`] watch the shared shutdown signal.
pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn track(&mut self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.tasks.push((name.into(), handle));
    }

    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let rx = self.shutdown_tx.subscribe();
        self.track(name, tokio::spawn(f(rx)));
    }

    /// Run `f` every `interval` until shutdown. The first run happens after one interval.
    pub fn spawn_periodic<F, Fut>(&mut self, name: impl Into<String>, interval: Duration, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => { f().await; }
                    _ = rx.changed() => { break; }
                }
            }
        });
        self.track(name, handle);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal shutdown and wait up to `grace` per task; stragglers are aborted.
    ///
    /// Returns how many tasks panicked or had to be aborted.
    pub async fn shutdown(self, grace: Duration) -> usize {
        let _ = self.shutdown_tx.send(true);
        let mut failed = 0;
        for (name, mut handle) in self.tasks {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(task = %name, error = %e, "task ended abnormally");
                    failed += 1;
                }
                Err(_) => {
                    tracing::warn!(task = %name, grace_ms = grace.as_millis() as u64, "task did not stop in time, aborting");
                    handle.abort();
                    failed += 1;
                }
            }
        }
        failed
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
