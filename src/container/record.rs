//! JSON form of a container, shared by the container source, the state file and the API.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{ContainerID, Error, K8sInfo, Mount, RawContainerInfo};

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A string map where `null` means empty and entries with non-string values are dropped.
pub(crate) fn lenient_string_map<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: Map<String, Value> = null_as_default(deserializer)?;
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(value) => Some((key, value)),
            other => {
                log::debug!("dropping non-string value of `{}`: {}", key, other);
                None
            }
        })
        .collect())
}

/// Metadata arrives either as alternating key/value strings or as an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaDatas {
    Pairs(Vec<String>),
    Object(Map<String, Value>),
}

impl MetaDatas {
    /// Key/value pairs in document order. A dangling key or a non-string value is dropped.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        match self {
            MetaDatas::Pairs(items) => items
                .chunks_exact(2)
                .map(|pair| (pair[0].as_str(), pair[1].as_str()))
                .collect(),
            MetaDatas::Object(map) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct K8sRecord {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub paused_container: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerRecord {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub upper_dir: String,
    #[serde(default)]
    pub log_path: String,
    #[serde(default)]
    pub stopped: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mounts: Vec<Mount>,
    #[serde(rename = "MetaDatas", default, skip_serializing_if = "Option::is_none")]
    pub metadatas: Option<MetaDatas>,
    #[serde(rename = "K8sInfo", default, deserialize_with = "null_as_default")]
    pub k8s_info: K8sRecord,
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub env: HashMap<String, String>,
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub container_labels: HashMap<String, String>,
}

impl TryFrom<ContainerRecord> for RawContainerInfo {
    type Error = Error;

    fn try_from(record: ContainerRecord) -> std::result::Result<Self, Self::Error> {
        let mut info = RawContainerInfo::new(ContainerID::new(&record.id)?);
        info.name = record.name;
        info.upper_dir = record.upper_dir;
        info.log_path = record.log_path;
        info.stopped = record.stopped;
        info.status = record.status;
        info.mounts = record.mounts;
        if let Some(metadatas) = &record.metadatas {
            for (key, value) in metadatas.pairs() {
                info.add_metadata(key, value);
            }
        }
        info.k8s = K8sInfo {
            namespace: record.k8s_info.namespace,
            pod: record.k8s_info.pod,
            container_name: record.k8s_info.container_name,
            labels: record.k8s_info.labels,
            paused_container: record.k8s_info.paused_container,
        };
        info.env = record.env;
        info.container_labels = record.container_labels;
        Ok(info)
    }
}

impl From<&RawContainerInfo> for ContainerRecord {
    fn from(info: &RawContainerInfo) -> Self {
        let metadatas = info
            .all_metadata()
            .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
            .collect();
        Self {
            id: info.id.to_string(),
            name: info.name.clone(),
            upper_dir: info.upper_dir.clone(),
            log_path: info.log_path.clone(),
            stopped: info.stopped,
            status: info.status.clone(),
            mounts: info.mounts.clone(),
            metadatas: Some(MetaDatas::Object(metadatas)),
            k8s_info: K8sRecord {
                namespace: info.k8s.namespace.clone(),
                pod: info.k8s.pod.clone(),
                container_name: info.k8s.container_name.clone(),
                labels: info.k8s.labels.clone(),
                paused_container: info.k8s.paused_container,
            },
            env: info.env.clone(),
            container_labels: info.container_labels.clone(),
        }
    }
}
