use std::collections::HashMap;

use serde_json::Value;

use crate::params;

/// Uncompiled filter settings, shaped like the `ContainerFilters` object of a configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilterConfig {
    pub k8s_namespace_regex: String,
    pub k8s_pod_regex: String,
    pub k8s_container_regex: String,
    pub include_k8s_label: HashMap<String, String>,
    pub exclude_k8s_label: HashMap<String, String>,
    pub include_env: HashMap<String, String>,
    pub exclude_env: HashMap<String, String>,
    pub include_container_label: HashMap<String, String>,
    pub exclude_container_label: HashMap<String, String>,
}

impl ContainerFilterConfig {
    /// Reads the `ContainerFilters` object. Mistyped entries are logged and skipped.
    pub fn from_json(value: &Value, config_name: &str) -> Self {
        let mut config = Self::default();
        let Value::Object(obj) = value else {
            log::warn!(
                "config `{}`: ignoring param `ContainerFilters`: expected object",
                config_name
            );
            return config;
        };

        let strings = [
            ("K8sNamespaceRegex", &mut config.k8s_namespace_regex),
            ("K8sPodRegex", &mut config.k8s_pod_regex),
            ("K8sContainerRegex", &mut config.k8s_container_regex),
        ];
        for (key, slot) in strings {
            if let Some(v) = params::string_param(obj, key, config_name) {
                *slot = v;
            }
        }

        let maps = [
            ("IncludeK8sLabel", &mut config.include_k8s_label),
            ("ExcludeK8sLabel", &mut config.exclude_k8s_label),
            ("IncludeEnv", &mut config.include_env),
            ("ExcludeEnv", &mut config.exclude_env),
            ("IncludeContainerLabel", &mut config.include_container_label),
            ("ExcludeContainerLabel", &mut config.exclude_container_label),
        ];
        for (key, slot) in maps {
            if let Some(v) = params::string_map_param(obj, key, config_name) {
                *slot = v;
            }
        }

        config
    }
}
