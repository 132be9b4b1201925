use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::container::{ContainerDiff, ContainerID, ContainerInfo};
use crate::persistence::{self, PersistedState, StatePersister};
use crate::registry::{self, ContainerMap, ContainerRegistry};
use crate::source::{self, ContainerSource};
use crate::telemetry::{MatchedContainerInfo, SelfMonitorSink, SelfMonitorTarget};

use super::config::{MonitoredConfig, PipelineContext};
use super::listener::{ContainerInfoListener, ContainerStoppedEvent, LogListener};
use super::options::{ContainerDiscoveryOptions, InputKind};
use super::Result;

/// Which tracked views to repoint after the registry changed.
#[derive(Debug, Clone, Copy)]
pub enum PointerScope<'a> {
    All,
    Only(&'a [ContainerID]),
}

/// Read-only view of one configuration, as served by the API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConfigSummary {
    pub context: PipelineContext,
    pub matched_container_ids: Vec<ContainerID>,
    pub matched_container_info: Option<MatchedContainerInfo>,
}

enum Notification {
    Upsert(ContainerInfo),
    Delete(ContainerID),
}

/// Keeps every configuration's matched containers in step with the registry.
pub struct ContainerManager {
    registry: Arc<ContainerRegistry>,
    configs: DashMap<String, MonitoredConfig>,
    pending_diffs: Mutex<BTreeMap<String, ContainerDiff>>,
    self_monitor: SelfMonitorTarget,
    listener: Arc<dyn ContainerInfoListener>,
    host_root: String,
}

impl ContainerManager {
    pub fn new(registry: Arc<ContainerRegistry>) -> Self {
        Self {
            registry,
            configs: DashMap::new(),
            pending_diffs: Mutex::default(),
            self_monitor: SelfMonitorTarget::default(),
            listener: Arc::new(LogListener),
            host_root: String::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ContainerInfoListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Prefix prepended to every translated base dir.
    pub fn with_host_root(mut self, host_root: impl Into<String>) -> Self {
        self.host_root = host_root.into();
        self
    }

    pub fn registry(&self) -> &Arc<ContainerRegistry> {
        &self.registry
    }

    /// Starts matching containers for a configuration, replacing any previous one of the
    /// same name.
    ///
    /// # Arguments
    ///
    /// * `context` - Pipeline identity; its `config_name` keys the configuration.
    /// * `input` - Whether the configuration reads files or stdio.
    /// * `base_path` - Directory read inside the container, for file inputs.
    /// * `options` - Plugin options holding `ContainerFilters` and tag mappings.
    ///
    /// # Errors
    ///
    /// Returns [`super::Error::InvalidFilters`] if a filter pattern does not compile. The
    /// configuration is not registered then.
    pub fn register_config(
        &self,
        context: PipelineContext,
        input: InputKind,
        base_path: impl Into<String>,
        options: &Value,
    ) -> Result<()> {
        let name = context.config_name.clone();
        let options = ContainerDiscoveryOptions::from_json(options, &name, input)?;
        log::info!("config `{}`: container filters {}", name, options.filters);
        let config = MonitoredConfig::new(context, options, base_path);
        if let Some(previous) = self.configs.insert(name.clone(), config) {
            self.pending_diffs.lock().remove(&name);
            for id in previous.container_infos.keys() {
                self.listener.delete_container_info(&name, id);
            }
        }
        Ok(())
    }

    /// Stops matching for `name`. Returns whether it was registered.
    pub fn unregister_config(&self, name: &str) -> bool {
        self.pending_diffs.lock().remove(name);
        match self.configs.remove(name) {
            Some((name, config)) => {
                for id in config.container_infos.keys() {
                    self.listener.delete_container_info(&name, id);
                }
                true
            }
            None => false,
        }
    }

    pub fn config_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.configs.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    /// The current view of `name`'s matched containers.
    pub fn container_infos(&self, name: &str) -> Option<Vec<ContainerInfo>> {
        self.configs
            .get(name)
            .map(|config| config.container_infos().cloned().collect())
    }

    pub fn matched_container_info(&self, name: &str) -> Option<MatchedContainerInfo> {
        self.configs
            .get(name)
            .and_then(|config| config.matched_container_info.clone())
    }

    pub fn summaries(&self) -> Vec<ConfigSummary> {
        let mut out: Vec<_> = self
            .configs
            .iter()
            .map(|config| ConfigSummary {
                context: config.context.clone(),
                matched_container_ids: config.container_infos.keys().cloned().collect(),
                matched_container_info: config.matched_container_info.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.context.config_name.cmp(&b.context.config_name));
        out
    }

    pub fn attach_self_monitor(&self, sink: Arc<dyn SelfMonitorSink>, input_index: usize) {
        self.self_monitor.attach(sink, input_index);
    }

    pub fn detach_self_monitor(&self) {
        self.self_monitor.detach();
    }

    /// Replaces the registry with the source's full snapshot.
    ///
    /// Returns `Ok(false)` when the source had nothing to report.
    ///
    /// # Errors
    ///
    /// Returns the source's error, or [`source::Error::Malformed`] for an unparsable
    /// snapshot. The registry is untouched in both cases.
    pub fn refresh_all_containers_snapshot(
        &self,
        source: &dyn ContainerSource,
    ) -> source::Result<bool> {
        let json = source.all_containers_meta()?;
        let Some(containers) = source::decode_all(&json)? else {
            log::debug!("container source reported no containers");
            return Ok(false);
        };
        log::info!("refreshing registry with {} container(s)", containers.len());
        self.registry.replace_all(containers);
        self.update_container_pointers(PointerScope::All);
        Ok(true)
    }

    /// Applies the source's delta to the registry.
    ///
    /// Returns whether the registry changed.
    ///
    /// # Errors
    ///
    /// Returns the source's error, or [`source::Error::Malformed`] for an unparsable delta.
    pub fn incrementally_update_containers_snapshot(
        &self,
        source: &dyn ContainerSource,
    ) -> source::Result<bool> {
        let json = source.diff_containers_meta()?;
        let delta = source::decode_diff(&json)?;
        if delta.is_empty() {
            return Ok(false);
        }
        log::debug!(
            "container delta: {} updated, {} deleted, {} stopped",
            delta.updated.len(),
            delta.deleted.len(),
            delta.stopped.len()
        );
        match self.registry.apply_delta(delta) {
            Some(updated) => {
                self.update_container_pointers(PointerScope::Only(&updated));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Points every tracked view in `scope` at the registry's current record.
    pub fn update_container_pointers(&self, scope: PointerScope<'_>) {
        match scope {
            PointerScope::All => {
                let containers = self.registry.snapshot();
                for mut entry in self.configs.iter_mut() {
                    let config = &mut *entry;
                    for (id, info) in config.container_infos.iter_mut() {
                        match containers.get(id) {
                            Some(current) => info.raw = Arc::clone(current),
                            None => log::warn!(
                                "config `{}`: tracked container {} is missing from the registry",
                                config.context.config_name,
                                id
                            ),
                        }
                    }
                }
            }
            PointerScope::Only(ids) => {
                for id in ids {
                    let Some(current) = self.registry.get(id.as_ref()) else {
                        log::warn!("updated container {} is missing from the registry", id);
                        continue;
                    };
                    for mut config in self.configs.iter_mut() {
                        config.repoint(&current);
                    }
                }
            }
        }
    }

    /// Reconciles every configuration and queues the non-empty diffs.
    ///
    /// Returns whether any configuration's matched set changed.
    pub fn check_container_diff_for_all_configs(&self) -> bool {
        // Both readings precede the snapshot, so a change landing after the copy is
        // stamped no earlier than `snapshot_time` and the next pass picks it up.
        let snapshot_time = registry::unix_time_secs();
        let registry_update_time = self.registry.last_update_time();
        let containers = self.registry.snapshot();
        let mut updated = false;
        for mut config in self.configs.iter_mut() {
            let Some(diff) = config.check_diff(&containers, registry_update_time, snapshot_time)
            else {
                continue;
            };
            if diff.is_empty() {
                continue;
            }
            updated = true;
            self.pending_diffs
                .lock()
                .entry(config.key().clone())
                .or_default()
                .merge(diff);
        }
        updated
    }

    /// Applies queued diffs to each configuration's view, notifies the listener and pushes
    /// refreshed summaries of configurations collecting container metadata.
    pub fn apply_container_diffs(&self) {
        let pending = std::mem::take(&mut *self.pending_diffs.lock());
        let mut results = Vec::new();
        for (name, diff) in pending {
            let mut notifications = Vec::new();
            {
                let Some(mut config) = self.configs.get_mut(&name) else {
                    continue;
                };
                log::info!("config `{}`: applying diff {}", name, diff);
                for raw in diff.added.into_iter().chain(diff.modified) {
                    let info = config.upsert(raw, &self.host_root);
                    notifications.push(Notification::Upsert(info.clone()));
                }
                for id in diff.removed {
                    if config.delete(&id) {
                        notifications.push(Notification::Delete(id));
                    }
                }
                if config.options().collecting_containers_meta {
                    let matched = config.build_matched_container_info();
                    log::debug!("config `{}`: {}", name, matched);
                    config.matched_container_info = Some(matched.clone());
                    results.push(matched);
                }
            }
            for notification in notifications {
                match notification {
                    Notification::Upsert(info) => self.listener.upsert_container_info(&name, &info),
                    Notification::Delete(id) => self.listener.delete_container_info(&name, &id),
                }
            }
        }
        self.self_monitor.send(&results);
    }

    /// Pushes the latest summary of every configuration collecting container metadata.
    pub fn send_all_matched_container_info(&self) {
        let mut results: Vec<_> = self
            .configs
            .iter()
            .filter(|config| config.options().collecting_containers_meta)
            .filter_map(|config| config.matched_container_info.clone())
            .collect();
        results.sort_by(|a, b| a.config_name.cmp(&b.config_name));
        self.self_monitor.send(&results);
    }

    /// Turns the ids reported as stopped into one event per matching configuration and
    /// marks the records stopped.
    pub fn get_container_stopped_events(&self) -> Vec<ContainerStoppedEvent> {
        let stopped = self.registry.drain_stopped();
        if stopped.is_empty() {
            return Vec::new();
        }
        log::info!(
            "stopped containers: {}",
            stopped
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut events = Vec::new();
        for id in &stopped {
            let current = self.registry.mark_stopped(id);
            for mut entry in self.configs.iter_mut() {
                let config = &mut *entry;
                let Some(info) = config.container_infos.get_mut(id) else {
                    continue;
                };
                events.push(ContainerStoppedEvent {
                    config_name: config.context.config_name.clone(),
                    container_id: id.clone(),
                    real_base_dir: info.real_base_dir.clone(),
                });
                info.raw = match &current {
                    Some(current) => Arc::clone(current),
                    None => {
                        let mut copy = (*info.raw).clone();
                        copy.stopped = true;
                        Arc::new(copy)
                    }
                };
                log::debug!(
                    "config `{}`: container {} stopped",
                    config.context.config_name,
                    id
                );
            }
        }
        events
    }

    /// Writes the registry through `persister`.
    ///
    /// # Errors
    ///
    /// Returns the persister's error.
    pub fn save_container_info(&self, persister: &dyn StatePersister) -> persistence::Result<()> {
        let containers: Vec<_> = self.registry.snapshot().into_values().collect();
        persister.save(&containers)
    }

    /// Restores the registry from `persister` and reconciles every configuration.
    ///
    /// Returns `false` when nothing was restored. A missing or malformed document is
    /// logged and leaves the registry as it was.
    pub fn load_container_info(&self, persister: &dyn StatePersister) -> bool {
        let state = match persister.load() {
            Ok(state) => state,
            Err(err) => {
                log::warn!("no container state restored: {}", err);
                return false;
            }
        };

        match state {
            PersistedState::Legacy(entries) => {
                let mut containers = ContainerMap::new();
                let mut per_config: BTreeMap<String, Vec<ContainerID>> = BTreeMap::new();
                for entry in entries {
                    if !entry.config_name.is_empty() {
                        per_config
                            .entry(entry.config_name)
                            .or_default()
                            .push(entry.container.id.clone());
                    }
                    containers.insert(entry.container.id.clone(), Arc::new(entry.container));
                }
                if containers.is_empty() {
                    return false;
                }

                let mut seeded = Vec::new();
                for (name, ids) in per_config {
                    let Some(mut config) = self.configs.get_mut(&name) else {
                        log::debug!("restored containers of unknown config `{}`", name);
                        continue;
                    };
                    let mut diff = ContainerDiff::default();
                    for id in ids {
                        if let Some(info) = containers.get(&id) {
                            config.full_container_ids.insert(id);
                            diff.added.push(Arc::clone(info));
                        }
                    }
                    seeded.push((name, diff));
                }
                self.registry.replace_all(containers);
                self.update_container_pointers(PointerScope::All);
                let mut pending = self.pending_diffs.lock();
                for (name, diff) in seeded {
                    pending.entry(name).or_default().merge(diff);
                }
            }
            PersistedState::Current(infos) => {
                if infos.is_empty() {
                    return false;
                }
                let containers = infos
                    .into_iter()
                    .map(|info| (info.id.clone(), Arc::new(info)))
                    .collect();
                self.registry.replace_all(containers);
                self.update_container_pointers(PointerScope::All);
            }
        }

        self.check_container_diff_for_all_configs();
        self.apply_container_diffs();
        true
    }
}
