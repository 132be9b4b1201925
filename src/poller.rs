//! Background task keeping the registry in step with the container source.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backoff::{RetryConfig, RetryManager};
use crate::discovery::ContainerManager;
use crate::source::{self, ContainerSource};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Pause between two iterations.
    pub tick: Duration,
    pub full_refresh_interval: Duration,
    pub incremental_interval: Duration,
    /// Period of the summary broadcast. The first iteration never broadcasts.
    pub broadcast_interval: Duration,
    /// How long `stop` waits for the task.
    pub shutdown_grace: Duration,
    /// Period of the reconciliation pass driven by the binary.
    pub discovery_tick: Duration,
    /// Pacing of full refreshes after a failed one.
    pub retry: RetryConfig,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(3),
            full_refresh_interval: Duration::from_secs(3600),
            incremental_interval: Duration::from_secs(1),
            broadcast_interval: Duration::from_secs(43200),
            shutdown_grace: Duration::from_secs(5),
            discovery_tick: Duration::from_secs(3),
            retry: RetryConfig::default(),
        }
    }
}

/// Handle of the running poll loop.
pub struct Poller {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
    grace: Duration,
}

impl Poller {
    /// Spawns the poll loop on the current tokio runtime.
    pub fn start(
        manager: Arc<ContainerManager>,
        source: Arc<dyn ContainerSource>,
        settings: PollerSettings,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let grace = settings.shutdown_grace;
        let handle = tokio::spawn(poll_loop(manager, source, settings, stop_rx));
        log::info!("container poller started");
        Self {
            handle,
            stop_tx,
            grace,
        }
    }

    /// Signals the loop and waits at most the shutdown grace for it to finish.
    pub async fn stop(mut self) {
        // The loop may already be gone; that counts as stopped.
        let _ = self.stop_tx.send(true);
        match tokio::time::timeout(self.grace, &mut self.handle).await {
            Ok(Ok(())) => log::info!("container poller stopped"),
            Ok(Err(err)) => log::error!("container poller failed: {}", err),
            Err(_) => {
                log::warn!(
                    "container poller forced to stop after {:?}",
                    self.grace
                );
                self.handle.abort();
            }
        }
    }
}

async fn run_blocking<F>(what: &str, f: F) -> Option<source::Result<bool>>
where
    F: FnOnce() -> source::Result<bool> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => Some(result),
        Err(err) => {
            log::error!("{} task failed: {}", what, err);
            None
        }
    }
}

async fn poll_loop(
    manager: Arc<ContainerManager>,
    source: Arc<dyn ContainerSource>,
    settings: PollerSettings,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut retry = RetryManager::new(settings.retry);
    let mut last_full: Option<Instant> = None;
    let mut last_incremental = Instant::now();
    let mut last_broadcast = Instant::now();

    loop {
        let now = Instant::now();
        let full_due = if retry.failures() > 0 {
            retry.should_retry(now)
        } else {
            last_full.is_none_or(|at| now.duration_since(at) >= settings.full_refresh_interval)
        };

        if full_due {
            last_full = Some(now);
            let (manager, source) = (Arc::clone(&manager), Arc::clone(&source));
            let result = run_blocking("full refresh", move || {
                manager.refresh_all_containers_snapshot(source.as_ref())
            })
            .await;
            match result {
                Some(Ok(_)) => retry.reset(),
                Some(Err(err)) => {
                    log::error!("failed to refresh container snapshot: {}", err);
                    retry.record_failure(Instant::now());
                }
                None => {}
            }
        } else if now.duration_since(last_incremental) >= settings.incremental_interval {
            last_incremental = now;
            let (manager, source) = (Arc::clone(&manager), Arc::clone(&source));
            let result = run_blocking("incremental update", move || {
                manager.incrementally_update_containers_snapshot(source.as_ref())
            })
            .await;
            if let Some(Err(err)) = result {
                log::warn!("failed to apply container delta: {}", err);
            }
        }

        if now.duration_since(last_broadcast) >= settings.broadcast_interval {
            last_broadcast = now;
            manager.send_all_matched_container_info();
        }

        tokio::select! {
            _ = tokio::time::sleep(settings.tick) => {}
            _ = stop_rx.changed() => break,
        }
    }
    log::debug!("container poll loop exited");
}
