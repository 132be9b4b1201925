use std::collections::HashMap;

use serde_json::Value;

use crate::container::RawContainerInfo;
use crate::filter::{ContainerFilterConfig, ContainerFilters};
use crate::params;

use super::{Error, Result};

/// What a configuration collects from matched containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Files inside the container filesystem.
    #[default]
    File,
    /// The runtime's stdout/stderr log. Non-running containers still match.
    Stdio,
}

/// Container discovery settings of one configuration.
#[derive(Debug, Clone, Default)]
pub struct ContainerDiscoveryOptions {
    pub filter_config: ContainerFilterConfig,
    pub filters: ContainerFilters,
    /// K8s label key to tag key.
    pub external_k8s_label_tag: HashMap<String, String>,
    /// Env key to tag key.
    pub external_env_tag: HashMap<String, String>,
    pub collecting_containers_meta: bool,
    pub is_stdio: bool,
}

impl ContainerDiscoveryOptions {
    /// Parses the plugin options of `config_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilters`] if a filter pattern fails to compile. Every other
    /// defect is logged and the affected parameter is ignored.
    pub fn from_json(config: &Value, config_name: &str, input: InputKind) -> Result<Self> {
        let mut options = Self {
            is_stdio: input == InputKind::Stdio,
            ..Default::default()
        };
        if config.is_null() {
            return Ok(options);
        }
        let Value::Object(obj) = config else {
            log::warn!(
                "config `{}`: container discovery options are not an object, using defaults",
                config_name
            );
            return Ok(options);
        };

        if let Some(filters) = obj.get("ContainerFilters") {
            options.filter_config = ContainerFilterConfig::from_json(filters, config_name);
            options.filters =
                ContainerFilters::compile(&options.filter_config).map_err(|source| {
                    Error::InvalidFilters {
                        config: config_name.to_owned(),
                        source,
                    }
                })?;
        }
        if let Some(tags) = params::string_map_param(obj, "ExternalK8sLabelTag", config_name) {
            options.external_k8s_label_tag = tags;
        }
        if let Some(tags) = params::string_map_param(obj, "ExternalEnvTag", config_name) {
            options.external_env_tag = tags;
        }
        if let Some(flag) = params::bool_param(obj, "CollectingContainersMeta", config_name) {
            options.collecting_containers_meta = flag;
        }
        Ok(options)
    }

    /// Tags resolved from the container's env and K8s labels, env first, each group sorted
    /// by tag key.
    pub fn extra_tags(&self, info: &RawContainerInfo) -> Vec<(String, String)> {
        fn resolve(
            mapping: &HashMap<String, String>,
            source: &HashMap<String, String>,
        ) -> Vec<(String, String)> {
            let mut tags: Vec<_> = mapping
                .iter()
                .filter_map(|(key, tag)| source.get(key).map(|v| (tag.clone(), v.clone())))
                .collect();
            tags.sort();
            tags
        }

        let mut tags = resolve(&self.external_env_tag, &info.env);
        tags.extend(resolve(&self.external_k8s_label_tag, &info.k8s.labels));
        tags
    }
}
