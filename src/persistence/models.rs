use serde_json::Value;

use crate::container::{ContainerID, ContainerRecord, Mount, RawContainerInfo, null_as_default};

use super::{Error, Result};

/// Version written by the current format.
pub const CURRENT_VERSION: &str = "1.0.0";
/// Per-configuration format written by older agents.
pub const LEGACY_VERSION: &str = "0.1.0";

/// A restored container together with the configuration that had matched it.
#[derive(Debug, Clone)]
pub struct LegacyEntry {
    pub config_name: String,
    pub container: RawContainerInfo,
}

/// A decoded state document. Both formats restore the same registry shape.
#[derive(Debug, Clone)]
pub enum PersistedState {
    Legacy(Vec<LegacyEntry>),
    Current(Vec<RawContainerInfo>),
}

impl PersistedState {
    pub fn version(&self) -> &'static str {
        match self {
            PersistedState::Legacy(_) => LEGACY_VERSION,
            PersistedState::Current(_) => CURRENT_VERSION,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PersistedState::Legacy(entries) => entries.len(),
            PersistedState::Current(containers) => containers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, serde::Serialize)]
struct StateDocument<'a> {
    version: &'a str,
    #[serde(rename = "Containers")]
    containers: Vec<ContainerRecord>,
}

#[derive(Debug, serde::Deserialize)]
struct LegacyDetail {
    #[serde(default, deserialize_with = "null_as_default")]
    config_name: String,
    params: String,
}

#[derive(Debug, serde::Deserialize)]
struct LegacyParams {
    #[serde(rename = "ID", default, deserialize_with = "null_as_default")]
    id: String,
    #[serde(rename = "UpperDir", default, deserialize_with = "null_as_default")]
    upper_dir: String,
    #[serde(rename = "LogPath", default, deserialize_with = "null_as_default")]
    log_path: String,
    #[serde(rename = "Mounts", default, deserialize_with = "null_as_default")]
    mounts: Vec<Mount>,
    #[serde(rename = "MetaDatas", default, deserialize_with = "null_as_default")]
    metadatas: Vec<Value>,
}

/// Serializes containers in the current format, ordered by id.
pub fn encode<'a>(containers: impl IntoIterator<Item = &'a RawContainerInfo>) -> Result<String> {
    let mut containers: Vec<ContainerRecord> =
        containers.into_iter().map(ContainerRecord::from).collect();
    containers.sort_by(|a, b| a.id.cmp(&b.id));
    serde_json::to_string_pretty(&StateDocument {
        version: CURRENT_VERSION,
        containers,
    })
    .map_err(Error::Serialize)
}

/// Parses a state document, choosing the format by its `version` tag.
///
/// A missing or non-string tag means the current format. Defective entries are skipped.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the text is not a JSON object and
/// [`Error::MissingSection`] if the format's container array is absent.
pub fn decode(json: &str) -> Result<PersistedState> {
    let root: serde_json::Map<String, Value> =
        serde_json::from_str(json).map_err(Error::Malformed)?;
    let version = root
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(CURRENT_VERSION);

    if version == LEGACY_VERSION {
        let Some(Value::Array(detail)) = root.get("detail") else {
            return Err(Error::MissingSection {
                version: LEGACY_VERSION,
                section: "detail",
            });
        };
        Ok(PersistedState::Legacy(
            detail.iter().filter_map(decode_legacy_entry).collect(),
        ))
    } else {
        let Some(Value::Array(containers)) = root.get("Containers") else {
            return Err(Error::MissingSection {
                version: CURRENT_VERSION,
                section: "Containers",
            });
        };
        Ok(PersistedState::Current(
            containers.iter().filter_map(decode_current_entry).collect(),
        ))
    }
}

fn decode_current_entry(value: &Value) -> Option<RawContainerInfo> {
    let record = serde_json::from_value::<ContainerRecord>(value.clone())
        .map_err(|err| log::warn!("skipping malformed persisted container: {}", err))
        .ok()?;
    RawContainerInfo::try_from(record)
        .map_err(|err| log::warn!("skipping persisted container: {}", err))
        .ok()
}

fn decode_legacy_entry(value: &Value) -> Option<LegacyEntry> {
    let detail = serde_json::from_value::<LegacyDetail>(value.clone())
        .map_err(|err| log::warn!("skipping malformed detail entry: {}", err))
        .ok()?;
    let params = serde_json::from_str::<LegacyParams>(&detail.params)
        .map_err(|err| {
            log::warn!(
                "skipping detail entry of config `{}` with invalid params: {}",
                detail.config_name,
                err
            )
        })
        .ok()?;

    let id = ContainerID::new(&params.id)
        .map_err(|err| log::warn!("skipping detail entry: {}", err))
        .ok()?;
    let mut info = RawContainerInfo::new(id);
    info.upper_dir = params.upper_dir;
    info.log_path = params.log_path;
    info.mounts = params.mounts;

    for pair in params.metadatas.chunks_exact(2) {
        let (Some(key), Some(value)) = (pair[0].as_str(), pair[1].as_str()) else {
            continue;
        };
        info.add_metadata(key, value);
        match key {
            "_namespace_" => info.k8s.namespace = value.to_owned(),
            "_pod_name_" => info.k8s.pod = value.to_owned(),
            "_container_name_" => info.k8s.container_name = value.to_owned(),
            "_image_name_" | "_container_ip_" => {
                info.container_labels.insert(key.to_owned(), value.to_owned());
            }
            "_pod_uid_" => {
                info.k8s.labels.insert("pod-uid".to_owned(), value.to_owned());
            }
            _ => {}
        }
    }

    Some(LegacyEntry {
        config_name: detail.config_name,
        container: info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MetadataKey;

    fn populated(id: &str) -> RawContainerInfo {
        let mut info = RawContainerInfo::new(ContainerID::new(id).unwrap());
        info.name = format!("/{id}");
        info.log_path = format!("/var/lib/docker/containers/{id}/{id}-json.log");
        info.upper_dir = format!("/var/lib/docker/overlay2/{id}/diff");
        info.status = "running".to_owned();
        info.stopped = true;
        info.mounts = vec![Mount::new("/b", "/y"), Mount::new("/a", "/x")];
        info.add_metadata("_namespace_", "default");
        info.add_metadata("custom", "value");
        info.k8s.namespace = "default".to_owned();
        info.k8s.pod = "pod-0".to_owned();
        info.k8s.container_name = "app".to_owned();
        info.k8s.paused_container = false;
        info.k8s.labels.insert("app".to_owned(), "web".to_owned());
        info.env.insert("PATH".to_owned(), "/bin".to_owned());
        info.container_labels.insert("team".to_owned(), "infra".to_owned());
        info
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let originals = vec![populated("one"), populated("two")];
        let json = encode(&originals).unwrap();
        let PersistedState::Current(restored) = decode(&json).unwrap() else {
            panic!("expected current format");
        };

        assert_eq!(restored.len(), 2);
        for (original, restored) in originals.iter().zip(&restored) {
            assert_eq!(original, restored);
            assert_eq!(original.mounts, restored.mounts);
            assert_eq!(original.stopped, restored.stopped);
            assert_eq!(original.k8s, restored.k8s);
            assert_eq!(original.metadata(), restored.metadata());
            assert_eq!(original.custom_metadata(), restored.custom_metadata());
        }
    }

    #[test]
    fn test_encode_shape() {
        let json = encode(&[populated("one")]).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], "1.0.0");
        let container = &value["Containers"][0];
        for field in [
            "ID", "Name", "UpperDir", "LogPath", "Stopped", "Status", "Mounts", "MetaDatas",
            "K8sInfo", "Env", "ContainerLabels",
        ] {
            assert!(container.get(field).is_some(), "missing {field}");
        }
        assert_eq!(container["Mounts"][0]["Source"], "/b");
        assert_eq!(container["MetaDatas"]["_namespace_"], "default");
        assert_eq!(container["K8sInfo"]["Labels"]["app"], "web");
    }

    #[test]
    fn test_decode_legacy_format() {
        let params = serde_json::json!({
            "ID": "legacy1",
            "UpperDir": "/upper/legacy1",
            "LogPath": "/log/legacy1.log",
            "Mounts": [{"Source": "/src", "Destination": "/dst"}],
            "MetaDatas": [
                "_namespace_", "ns", "_pod_name_", "pod", "_container_name_", "c",
                "_image_name_", "img", "_pod_uid_", "uid", "extra", "x", "dangling"
            ]
        })
        .to_string();
        let doc = serde_json::json!({
            "version": "0.1.0",
            "detail": [
                {"config_name": "cfg", "params": params},
                {"config_name": "broken", "params": "{not json"}
            ]
        })
        .to_string();

        let PersistedState::Legacy(entries) = decode(&doc).unwrap() else {
            panic!("expected legacy format");
        };
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.config_name, "cfg");
        let info = &entry.container;
        assert_eq!(info.id.as_ref(), "legacy1");
        assert_eq!(info.upper_dir, "/upper/legacy1");
        assert_eq!(info.mounts, vec![Mount::new("/src", "/dst")]);
        assert_eq!(info.k8s.namespace, "ns");
        assert_eq!(info.k8s.pod, "pod");
        assert_eq!(info.k8s.container_name, "c");
        assert_eq!(info.k8s.labels["pod-uid"], "uid");
        assert_eq!(info.container_labels["_image_name_"], "img");
        assert_eq!(
            &info.metadata()[..3],
            &[
                (MetadataKey::Namespace, "ns".to_owned()),
                (MetadataKey::PodName, "pod".to_owned()),
                (MetadataKey::ContainerName, "c".to_owned()),
            ]
        );
        assert_eq!(info.custom_metadata(), &[("extra".to_owned(), "x".to_owned())]);
    }

    #[test]
    fn test_decode_legacy_null_fields() {
        let params = serde_json::json!({
            "ID": "legacy1",
            "UpperDir": null,
            "LogPath": "/log/legacy1.log",
            "Mounts": null,
            "MetaDatas": null
        })
        .to_string();
        let doc = serde_json::json!({
            "version": "0.1.0",
            "detail": [{"config_name": "cfg", "params": params}]
        })
        .to_string();

        let PersistedState::Legacy(entries) = decode(&doc).unwrap() else {
            panic!("expected legacy format");
        };
        assert_eq!(entries.len(), 1);
        let info = &entries[0].container;
        assert_eq!(info.id.as_ref(), "legacy1");
        assert_eq!(info.log_path, "/log/legacy1.log");
        assert!(info.upper_dir.is_empty());
        assert!(info.mounts.is_empty());
        assert!(info.metadata().is_empty());
    }

    #[test]
    fn test_decode_defaults_to_current_version() {
        let doc = r#"{"Containers": [{"ID": "a"}, {"Name": "no id"}]}"#;
        let state = decode(doc).unwrap();
        assert_eq!(state.version(), "1.0.0");
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode("[]"), Err(Error::Malformed(_))));
        assert!(matches!(
            decode(r#"{"version": "0.1.0"}"#),
            Err(Error::MissingSection { section: "detail", .. })
        ));
        assert!(matches!(
            decode(r#"{"version": "1.0.0", "Containers": {}}"#),
            Err(Error::MissingSection { section: "Containers", .. })
        ));
    }
}
