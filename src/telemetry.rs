//! Self-monitoring summaries of what each configuration currently matches.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::container::ContainerID;
use crate::registry::unix_time_secs;

pub const DATA_TYPE_CONTAINER_CONFIG_RESULT: &str = "container_config_result";
pub const FLUSHER_TYPE: &str = "flusher_sls";

/// Joins the short form of each id with `;`.
pub fn join_short_ids<'a>(ids: impl IntoIterator<Item = &'a ContainerID>) -> String {
    ids.into_iter()
        .map(ContainerID::short)
        .collect::<Vec<_>>()
        .join(";")
}

/// The part of a configuration name after its first `$`, if anything follows it.
fn display_config_name(name: &str) -> &str {
    match name.split_once('$') {
        Some((_, rest)) if !rest.is_empty() => rest,
        _ => name,
    }
}

/// Flattened view of one configuration's matched containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MatchedContainerInfo {
    pub data_type: String,
    pub project: String,
    pub logstore: String,
    pub config_name: String,
    pub path_exist_container_ids: String,
    pub path_not_exist_container_ids: String,
    pub source_address: String,
    pub input_type: String,
    pub input_is_container_file: String,
    pub flusher_type: String,
    pub flusher_target_address: String,
}

impl MatchedContainerInfo {
    pub fn to_record(&self, timestamp: u64) -> TelemetryRecord {
        let contents = [
            ("type", self.data_type.as_str()),
            ("project", self.project.as_str()),
            ("logstore", self.logstore.as_str()),
            ("config_name", display_config_name(&self.config_name)),
            ("input.source_addresses", self.source_address.as_str()),
            ("input.path_exist_container_ids", self.path_exist_container_ids.as_str()),
            (
                "input.path_not_exist_container_ids",
                self.path_not_exist_container_ids.as_str(),
            ),
            ("input.type", self.input_type.as_str()),
            ("input.container_file", self.input_is_container_file.as_str()),
            ("flusher.type", self.flusher_type.as_str()),
            ("flusher.target_addresses", self.flusher_target_address.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_owned()))
        .collect();
        TelemetryRecord {
            timestamp,
            contents,
        }
    }
}

impl fmt::Display for MatchedContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config={} project={} logstore={} path_exist=[{}] path_not_exist=[{}] input={} flusher={}",
            self.config_name,
            self.project,
            self.logstore,
            self.path_exist_container_ids,
            self.path_not_exist_container_ids,
            self.input_type,
            self.flusher_target_address
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TelemetryRecord {
    pub timestamp: u64,
    pub contents: BTreeMap<&'static str, String>,
}

/// Receives self-monitoring records.
pub trait SelfMonitorSink: Send + Sync {
    fn push(&self, input_index: usize, records: Vec<TelemetryRecord>);
}

/// Writes each record to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl SelfMonitorSink for LogSink {
    fn push(&self, input_index: usize, records: Vec<TelemetryRecord>) {
        for record in records {
            match serde_json::to_string(&record) {
                Ok(json) => log::info!(target: "self monitor", "input={} {}", input_index, json),
                Err(err) => log::error!("failed to serialize telemetry record: {}", err),
            }
        }
    }
}

struct Target {
    sink: Arc<dyn SelfMonitorSink>,
    input_index: usize,
}

/// Where matched-container summaries go. Attached and detached at runtime.
#[derive(Default)]
pub struct SelfMonitorTarget {
    target: RwLock<Option<Target>>,
}

impl SelfMonitorTarget {
    pub fn attach(&self, sink: Arc<dyn SelfMonitorSink>, input_index: usize) {
        *self.target.write() = Some(Target { sink, input_index });
    }

    pub fn detach(&self) {
        *self.target.write() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.target.read().is_some()
    }

    /// Pushes one record per summary. Without a target, or with nothing to send, this is a
    /// no-op.
    pub fn send(&self, infos: &[MatchedContainerInfo]) {
        let guard = self.target.read();
        let Some(target) = guard.as_ref() else {
            return;
        };
        if infos.is_empty() {
            return;
        }
        let now = unix_time_secs();
        let records = infos.iter().map(|info| info.to_record(now)).collect();
        target.sink.push(target.input_index, records);
    }
}

impl fmt::Debug for SelfMonitorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfMonitorTarget")
            .field("attached", &self.is_attached())
            .finish()
    }
}
