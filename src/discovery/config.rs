use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::container::{ContainerDiff, ContainerID, ContainerInfo, RawContainerInfo};
use crate::registry::{self, ContainerMap};
use crate::telemetry::{self, MatchedContainerInfo};

use super::options::ContainerDiscoveryOptions;
use super::path::real_base_dir;

/// Identity of the pipeline a configuration belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineContext {
    pub config_name: String,
    pub project: String,
    pub logstore: String,
    pub region: String,
}

/// One configuration's discovery state.
#[derive(Debug)]
pub struct MonitoredConfig {
    pub(crate) context: PipelineContext,
    pub(crate) options: ContainerDiscoveryOptions,
    pub(crate) base_path: String,
    /// Every id this configuration has evaluated, matched or not.
    pub(crate) full_container_ids: BTreeSet<ContainerID>,
    pub(crate) container_infos: BTreeMap<ContainerID, ContainerInfo>,
    pub(crate) last_container_update_time: u64,
    pub(crate) matched_container_info: Option<MatchedContainerInfo>,
}

impl MonitoredConfig {
    pub fn new(
        context: PipelineContext,
        options: ContainerDiscoveryOptions,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            context,
            options,
            base_path: base_path.into(),
            full_container_ids: BTreeSet::new(),
            container_infos: BTreeMap::new(),
            last_container_update_time: 0,
            matched_container_info: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.context.config_name
    }

    pub fn options(&self) -> &ContainerDiscoveryOptions {
        &self.options
    }

    pub fn container_infos(&self) -> impl Iterator<Item = &ContainerInfo> {
        self.container_infos.values()
    }

    /// Reconciles against `containers` unless nothing changed since the last pass.
    ///
    /// `registry_update_time` is the registry's last change time and `snapshot_time` the
    /// clock reading taken before `containers` was copied out of the registry. Any change
    /// missing from `containers` is stamped no earlier than `snapshot_time`.
    pub(crate) fn check_diff(
        &mut self,
        containers: &ContainerMap,
        registry_update_time: u64,
        snapshot_time: u64,
    ) -> Option<ContainerDiff> {
        if self.last_container_update_time > registry_update_time {
            return None;
        }
        let diff = registry::compute_diff(
            containers,
            &mut self.full_container_ids,
            &self.container_infos,
            &self.options.filters,
            self.options.is_stdio,
        );
        self.last_container_update_time = snapshot_time;
        log::debug!("config `{}`: computed diff {}", self.name(), diff);
        Some(diff)
    }

    /// Inserts or repoints the view of `raw`, recomputing its base dir and tags.
    pub(crate) fn upsert(&mut self, raw: Arc<RawContainerInfo>, host_root: &str) -> &ContainerInfo {
        let mut info = ContainerInfo::new(raw);
        info.real_base_dir = real_base_dir(
            &info.raw,
            &self.base_path,
            self.options.is_stdio,
            host_root,
        );
        info.extra_tags = self.options.extra_tags(&info.raw);
        self.full_container_ids.insert(info.id().clone());

        let id = info.id().clone();
        self.container_infos.insert(id.clone(), info);
        &self.container_infos[&id]
    }

    pub(crate) fn delete(&mut self, id: &ContainerID) -> bool {
        self.container_infos.remove(id).is_some()
    }

    /// Points a tracked view at `raw`. Returns whether the id was tracked.
    pub(crate) fn repoint(&mut self, raw: &Arc<RawContainerInfo>) -> bool {
        match self.container_infos.get_mut(&raw.id) {
            Some(info) => {
                info.raw = Arc::clone(raw);
                true
            }
            None => false,
        }
    }

    /// Summarizes the current matched set.
    pub(crate) fn build_matched_container_info(&self) -> MatchedContainerInfo {
        let (exist, not_exist): (Vec<_>, Vec<_>) = self
            .container_infos
            .values()
            .partition(|info| Path::new(&info.real_base_dir).exists());

        let (source_address, input_type, container_file) = if self.options.is_stdio {
            ("stdout".to_owned(), "input_docker_stdout", "")
        } else {
            (self.base_path.clone(), "input_file", "true")
        };

        MatchedContainerInfo {
            data_type: telemetry::DATA_TYPE_CONTAINER_CONFIG_RESULT.to_owned(),
            project: self.context.project.clone(),
            logstore: self.context.logstore.clone(),
            config_name: self.context.config_name.clone(),
            path_exist_container_ids: telemetry::join_short_ids(
                exist.into_iter().map(ContainerInfo::id),
            ),
            path_not_exist_container_ids: telemetry::join_short_ids(
                not_exist.into_iter().map(ContainerInfo::id),
            ),
            source_address,
            input_type: input_type.to_owned(),
            input_is_container_file: container_file.to_owned(),
            flusher_type: telemetry::FLUSHER_TYPE.to_owned(),
            flusher_target_address: format!("{}/{}", self.context.project, self.context.logstore),
        }
    }
}
