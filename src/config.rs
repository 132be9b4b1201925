//! Agent settings and the file listing monitored configurations.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::discovery::{InputKind, PipelineContext};
use crate::fsutil;

mod error;

pub use error::{Error, Result};

pub const STATE_FILE_VAR: &str = "CREO_STATE_FILE";
pub const CONFIGS_FILE_VAR: &str = "CREO_CONFIGS_FILE";
pub const SNAPSHOT_FILE_VAR: &str = "CREO_SNAPSHOT_FILE";
pub const DIFF_FILE_VAR: &str = "CREO_DIFF_FILE";
pub const API_ADDR_VAR: &str = "CREO_API_ADDR";
pub const HOST_ROOT_VAR: &str = "CREO_HOST_ROOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub state_file: PathBuf,
    pub configs_file: PathBuf,
    pub snapshot_file: PathBuf,
    pub diff_file: PathBuf,
    pub api_addr: SocketAddr,
    pub host_root: String,
}

impl Settings {
    /// Reads the settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddr`] if `CREO_API_ADDR` is not a socket address.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the settings through `lookup`, falling back to the defaults for unset
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddr`] if the API address does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = |name: &str, default: &str| {
            PathBuf::from(lookup(name).unwrap_or_else(|| default.to_owned()))
        };
        let api_addr = lookup(API_ADDR_VAR).unwrap_or_else(|| "0.0.0.0:3000".to_owned());
        let api_addr = api_addr.parse::<SocketAddr>().map_err(|source| Error::InvalidAddr {
            name: API_ADDR_VAR,
            value: api_addr.clone(),
            source,
        })?;

        let settings = Self {
            state_file: path(STATE_FILE_VAR, "/var/lib/creo/docker_path_config.json"),
            configs_file: path(CONFIGS_FILE_VAR, "/etc/creo/configs.json"),
            snapshot_file: path(SNAPSHOT_FILE_VAR, "/var/run/creo/containers_all.json"),
            diff_file: path(DIFF_FILE_VAR, "/var/run/creo/containers_diff.json"),
            api_addr,
            host_root: lookup(HOST_ROOT_VAR).unwrap_or_default(),
        };
        log::debug!("settings: {:?}", settings);
        Ok(settings)
    }
}

/// One monitored configuration as listed in the configurations file.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub project: String,
    pub logstore: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub input: InputKind,
    #[serde(default)]
    pub base_path: String,
    /// Plugin options, handed to container discovery as is.
    #[serde(default)]
    pub options: Value,
}

impl PipelineConfig {
    pub fn context(&self) -> PipelineContext {
        PipelineContext {
            config_name: self.name.clone(),
            project: self.project.clone(),
            logstore: self.logstore.clone(),
            region: self.region.clone(),
        }
    }
}

/// Reads the JSON array of configurations at `path`.
///
/// # Errors
///
/// Returns [`Error::Open`] if the file cannot be opened and [`Error::Malformed`] if it
/// is not an array of configurations.
pub fn load_pipeline_configs(path: impl AsRef<Path>) -> Result<Vec<PipelineConfig>> {
    let path = path.as_ref();
    let reader = fsutil::open_file_reader(path)?;
    let configs: Vec<PipelineConfig> =
        serde_json::from_reader(reader).map_err(|source| Error::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    log::info!(
        "loaded {} configuration(s) from `{}`",
        configs.len(),
        path.display()
    );
    Ok(configs)
}
