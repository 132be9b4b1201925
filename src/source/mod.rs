//! The collaborator that enumerates containers, and decoding of what it reports.
//!
//! A full snapshot looks like `{"All": [record, ...]}` and a delta like
//! `{"Update": [record, ...], "Delete": [id, ...], "Stop": [id, ...]}`. An empty response
//! means there is nothing to report.

use std::sync::Arc;

use serde_json::Value;

use crate::container::{ContainerID, ContainerRecord, RawContainerInfo, null_as_default};
use crate::registry::{ContainerDelta, ContainerMap};

mod error;
mod file;

pub use error::{Error, Result};
pub use file::FileSource;

/// Query surface of the container collaborator.
pub trait ContainerSource: Send + Sync {
    /// The complete set of known containers.
    fn all_containers_meta(&self) -> Result<String>;

    /// Changes since the previous call.
    fn diff_containers_meta(&self) -> Result<String>;
}

#[derive(Debug, Default, serde::Deserialize)]
struct AllContainers {
    #[serde(rename = "All", default, deserialize_with = "null_as_default")]
    all: Vec<Value>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct DiffContainers {
    #[serde(rename = "Update", default, deserialize_with = "null_as_default")]
    update: Vec<Value>,
    #[serde(rename = "Delete", default, deserialize_with = "null_as_default")]
    delete: Vec<Value>,
    #[serde(rename = "Stop", default, deserialize_with = "null_as_default")]
    stop: Vec<Value>,
}

fn decode_records(values: Vec<Value>) -> Vec<RawContainerInfo> {
    values
        .into_iter()
        .filter_map(|value| {
            let record = match serde_json::from_value::<ContainerRecord>(value) {
                Ok(record) => record,
                Err(err) => {
                    log::warn!("skipping malformed container record: {}", err);
                    return None;
                }
            };
            match RawContainerInfo::try_from(record) {
                Ok(info) => Some(info),
                Err(err) => {
                    log::warn!("skipping container record: {}", err);
                    None
                }
            }
        })
        .collect()
}

/// Ids may be reported as strings or numbers.
fn decode_ids(values: Vec<Value>, field: &str) -> Vec<ContainerID> {
    values
        .into_iter()
        .filter_map(|value| {
            let raw = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => {
                    log::warn!("skipping non-scalar id in `{}`: {}", field, other);
                    return None;
                }
            };
            ContainerID::new(&raw)
                .map_err(|err| log::warn!("skipping id in `{}`: {}", field, err))
                .ok()
        })
        .collect()
}

/// Decodes a full snapshot. Returns `None` for an empty response or an empty `All` list.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the document itself cannot be parsed. Individual
/// defective records are skipped.
pub fn decode_all(json: &str) -> Result<Option<ContainerMap>> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    let message: AllContainers = serde_json::from_str(json).map_err(Error::Malformed)?;
    if message.all.is_empty() {
        return Ok(None);
    }
    let containers = decode_records(message.all)
        .into_iter()
        .map(|info| (info.id.clone(), Arc::new(info)))
        .collect();
    Ok(Some(containers))
}

/// Decodes a delta. An empty response decodes to an empty delta.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the document itself cannot be parsed.
pub fn decode_diff(json: &str) -> Result<ContainerDelta> {
    if json.trim().is_empty() {
        return Ok(ContainerDelta::default());
    }
    let message: DiffContainers = serde_json::from_str(json).map_err(Error::Malformed)?;
    Ok(ContainerDelta {
        updated: decode_records(message.update),
        deleted: decode_ids(message.delete, "Delete"),
        stopped: decode_ids(message.stop, "Stop"),
    })
}


#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::{ContainerSource, Result};

    /// Serves a fixed snapshot and a queue of deltas.
    #[derive(Debug, Default)]
    pub(crate) struct MemorySource {
        pub(crate) all: Mutex<String>,
        pub(crate) diffs: Mutex<VecDeque<String>>,
    }

    impl MemorySource {
        pub(crate) fn with_snapshot(all: impl Into<String>) -> Self {
            Self {
                all: Mutex::new(all.into()),
                diffs: Mutex::default(),
            }
        }

        pub(crate) fn push_diff(&self, diff: impl Into<String>) {
            self.diffs.lock().push_back(diff.into());
        }
    }

    impl ContainerSource for MemorySource {
        fn all_containers_meta(&self) -> Result<String> {
            Ok(self.all.lock().clone())
        }

        fn diff_containers_meta(&self) -> Result<String> {
            Ok(self.diffs.lock().pop_front().unwrap_or_default())
        }
    }
}
