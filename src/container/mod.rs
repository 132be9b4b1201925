use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod diff;
mod error;
mod record;

pub use diff::ContainerDiff;
pub use error::{Error, Result};
pub use record::{ContainerRecord, K8sRecord, MetaDatas};
pub(crate) use record::null_as_default;

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Number of characters kept by [`ContainerID::short`].
const SHORT_ID_LEN: usize = 12;

/// Runtime status reported for containers that are up.
pub const STATUS_RUNNING: &str = "running";

/// A validated container identifier.
///
/// # Examples
///
/// ```
/// # use creo_discovery::container::ContainerID;
/// let container_id = ContainerID::new("abc123abc123abc123").unwrap();
/// assert_eq!(container_id.as_ref(), "abc123abc123abc123");
/// assert_eq!(container_id.short(), "abc123abc123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty or its length exceeds
    /// [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// The leading 12 characters, as shown by container runtimes.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for ContainerID {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A bind or volume mount, as seen from the host (`source`) and the container (`destination`).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Mount {
    #[serde(rename = "Source", default)]
    pub source: String,
    #[serde(rename = "Destination", default)]
    pub destination: String,
}

impl Mount {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Metadata keys with a fixed meaning across collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    ImageName,
    ContainerName,
    PodName,
    Namespace,
    PodUid,
    ContainerIp,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 6] = [
        MetadataKey::ImageName,
        MetadataKey::ContainerName,
        MetadataKey::PodName,
        MetadataKey::Namespace,
        MetadataKey::PodUid,
        MetadataKey::ContainerIp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKey::ImageName => "_image_name_",
            MetadataKey::ContainerName => "_container_name_",
            MetadataKey::PodName => "_pod_name_",
            MetadataKey::Namespace => "_namespace_",
            MetadataKey::PodUid => "_pod_uid_",
            MetadataKey::ContainerIp => "_container_ip_",
        }
    }
}

impl FromStr for MetadataKey {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MetadataKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::UnknownMetadataKey(s.to_owned()))
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kubernetes identity of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct K8sInfo {
    pub namespace: String,
    pub pod: String,
    pub container_name: String,
    pub labels: HashMap<String, String>,
    /// Sandbox ("pause") containers never match a configuration.
    pub paused_container: bool,
}

/// The registry's description of one container.
///
/// Records are shared between the registry and every configuration that matches them, so
/// they are never changed after being published. Use [`Clone`] and publish a new record
/// instead.
///
/// Equality covers everything a configuration reacts to. `stopped` and the metadata lists
/// are not compared.
#[derive(Debug, Clone)]
pub struct RawContainerInfo {
    pub id: ContainerID,
    pub name: String,
    pub log_path: String,
    pub upper_dir: String,
    pub mounts: Vec<Mount>,
    metadata: Vec<(MetadataKey, String)>,
    custom_metadata: Vec<(String, String)>,
    pub k8s: K8sInfo,
    pub env: HashMap<String, String>,
    pub container_labels: HashMap<String, String>,
    pub status: String,
    pub stopped: bool,
}

impl RawContainerInfo {
    pub fn new(id: ContainerID) -> Self {
        Self {
            id,
            name: String::new(),
            log_path: String::new(),
            upper_dir: String::new(),
            mounts: Vec::new(),
            metadata: Vec::new(),
            custom_metadata: Vec::new(),
            k8s: K8sInfo::default(),
            env: HashMap::new(),
            container_labels: HashMap::new(),
            status: String::new(),
            stopped: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == STATUS_RUNNING
    }

    /// Appends a metadata pair, routing well-known keys to [`RawContainerInfo::metadata`]
    /// and everything else to [`RawContainerInfo::custom_metadata`].
    pub fn add_metadata(&mut self, key: &str, value: impl Into<String>) {
        match key.parse::<MetadataKey>() {
            Ok(key) => self.metadata.push((key, value.into())),
            Err(_) => self.custom_metadata.push((key.to_owned(), value.into())),
        }
    }

    pub fn metadata(&self) -> &[(MetadataKey, String)] {
        &self.metadata
    }

    pub fn custom_metadata(&self) -> &[(String, String)] {
        &self.custom_metadata
    }

    /// Iterates over all metadata pairs, well-known keys first.
    pub fn all_metadata(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .chain(
                self.custom_metadata
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            )
    }
}

impl PartialEq for RawContainerInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.log_path == other.log_path
            && self.upper_dir == other.upper_dir
            && self.mounts == other.mounts
            && self.k8s.namespace == other.k8s.namespace
            && self.k8s.pod == other.k8s.pod
            && self.k8s.container_name == other.k8s.container_name
            && self.k8s.labels == other.k8s.labels
            && self.env == other.env
            && self.container_labels == other.container_labels
            && self.status == other.status
    }
}

impl Eq for RawContainerInfo {}

/// A configuration's view of a matched container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Always the registry's current record for this id once a refresh has completed.
    pub raw: Arc<RawContainerInfo>,
    /// Directory the owning configuration scans, translated into the host's view.
    pub real_base_dir: String,
    pub extra_tags: Vec<(String, String)>,
}

impl ContainerInfo {
    pub fn new(raw: Arc<RawContainerInfo>) -> Self {
        Self {
            raw,
            real_base_dir: String::new(),
            extra_tags: Vec::new(),
        }
    }

    pub fn id(&self) -> &ContainerID {
        &self.raw.id
    }
}
