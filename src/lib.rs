//! Creo Discovery: keeps, for every monitored log configuration, the set of containers
//! whose metadata satisfies its filters.
//!
//! The registry mirrors what the container source reports. Configurations reconcile
//! against it and hand their diffs to the file-collection side.

use std::sync::Arc;

use discovery::{ContainerInfoListener, ContainerManager, LogListener};
use error::ResultOkLogExt;
use persistence::JsonFilePersister;
use poller::{Poller, PollerSettings};
use registry::ContainerRegistry;
use source::FileSource;
use telemetry::LogSink;

pub mod api;
pub mod backoff;
pub mod config;
pub mod container;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod fsutil;
mod params;
pub mod persistence;
pub mod poller;
pub mod registry;
pub mod source;
pub mod telemetry;

/// Runs the discovery agent until Ctrl-C.
///
/// Registers the configurations listed in the configurations file, restores the persisted
/// registry, starts the poller and the API, and drives the reconciliation pass. On
/// shutdown the registry is saved.
///
/// # Errors
///
/// Possible errors include:
/// - An invalid `CREO_API_ADDR`.
/// - A missing or malformed configurations file.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = config::Settings::from_env()?;
    let configs = config::load_pipeline_configs(&settings.configs_file)?;

    let listener: Arc<dyn ContainerInfoListener> = Arc::new(LogListener);
    let manager = Arc::new(
        ContainerManager::new(Arc::new(ContainerRegistry::default()))
            .with_listener(Arc::clone(&listener))
            .with_host_root(settings.host_root.clone()),
    );
    for config in configs {
        manager
            .register_config(
                config.context(),
                config.input,
                config.base_path.clone(),
                &config.options,
            )
            .ok_log();
    }
    manager.attach_self_monitor(Arc::new(LogSink), 0);

    let persister = JsonFilePersister::new(&settings.state_file);
    if manager.load_container_info(&persister) {
        log::info!("restored container state from `{}`", settings.state_file.display());
    }

    let poller_settings = PollerSettings::default();
    let source = Arc::new(FileSource::new(
        settings.snapshot_file.clone(),
        settings.diff_file.clone(),
    ));
    let poller = Poller::start(Arc::clone(&manager), source, poller_settings.clone());
    {
        let api = api::APIServer::new(Arc::clone(&manager));
        let addr = settings.api_addr;
        tokio::spawn(async move { api.listen(addr).await.ok_log() });
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(poller_settings.discovery_tick);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            res = &mut shutdown => {
                res.ok_log();
                break;
            }
        }

        let manager = Arc::clone(&manager);
        let listener = Arc::clone(&listener);
        tokio::task::spawn_blocking(move || {
            if manager.check_container_diff_for_all_configs() {
                log::debug!("configurations changed, applying diffs");
            }
            manager.apply_container_diffs();
            for event in manager.get_container_stopped_events() {
                listener.container_stopped(&event);
            }
        })
        .await
        .ok_log();
    }

    log::info!("shutting down");
    poller.stop().await;
    manager.save_container_info(&persister).ok_log();
    Ok(())
}
