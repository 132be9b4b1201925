//! Include/exclude matching over a container's Kubernetes identity, environment and labels.
//!
//! A pattern starting with `^` is a regex that must match the whole value; anything else is
//! compared literally, with an empty value matching any value of a present key.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::container::{K8sInfo, RawContainerInfo};

mod config;
mod error;

pub use config::ContainerFilterConfig;
pub use error::{Error, Result};

/// A regex that only matches when it covers the whole subject.
#[derive(Debug, Clone)]
pub struct FullMatchRegex {
    pattern: String,
    regex: Regex,
}

impl FullMatchRegex {
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] tagged with `field` if `pattern` does not compile.
    pub fn new(field: &'static str, pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            Error::InvalidPattern {
                field,
                pattern: pattern.to_owned(),
                source: Box::new(source),
            }
        })?;
        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
        })
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }

    /// The pattern as written in the configuration.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Compiled patterns for one include or exclude map.
#[derive(Debug, Clone, Default)]
pub struct FieldFilter {
    pub static_values: HashMap<String, String>,
    pub regex_values: HashMap<String, FullMatchRegex>,
}

impl FieldFilter {
    pub fn compile(field: &'static str, patterns: &HashMap<String, String>) -> Result<Self> {
        let mut filter = Self::default();
        for (key, pattern) in patterns {
            if pattern.starts_with('^') {
                filter
                    .regex_values
                    .insert(key.clone(), FullMatchRegex::new(field, pattern)?);
            } else {
                filter.static_values.insert(key.clone(), pattern.clone());
            }
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.static_values.is_empty() && self.regex_values.is_empty()
    }

    /// Whether any entry matches `subject`.
    pub fn matches(&self, subject: &HashMap<String, String>) -> bool {
        let static_hit = self.static_values.iter().any(|(key, expected)| {
            subject
                .get(key)
                .is_some_and(|value| expected.is_empty() || value == expected)
        });
        static_hit
            || self.regex_values.iter().any(|(key, regex)| {
                subject.get(key).is_some_and(|value| regex.is_match(value))
            })
    }
}

/// An include and an exclude [`FieldFilter`] over the same key space.
#[derive(Debug, Clone, Default)]
pub struct MatchCriteriaFilter {
    pub include: FieldFilter,
    pub exclude: FieldFilter,
}

impl MatchCriteriaFilter {
    pub fn compile(
        include_field: &'static str,
        include: &HashMap<String, String>,
        exclude_field: &'static str,
        exclude: &HashMap<String, String>,
    ) -> Result<Self> {
        Ok(Self {
            include: FieldFilter::compile(include_field, include)?,
            exclude: FieldFilter::compile(exclude_field, exclude)?,
        })
    }

    /// A non-empty include set must be hit; any exclude hit rejects.
    pub fn evaluate(&self, subject: &HashMap<String, String>) -> bool {
        if !self.include.is_empty() && !self.include.matches(subject) {
            return false;
        }
        !self.exclude.matches(subject)
    }
}

#[derive(Debug, Clone, Default)]
pub struct K8sFilter {
    pub namespace_regex: Option<FullMatchRegex>,
    pub pod_regex: Option<FullMatchRegex>,
    pub container_regex: Option<FullMatchRegex>,
    pub label_filter: MatchCriteriaFilter,
}

impl K8sFilter {
    pub fn evaluate(&self, k8s: &K8sInfo) -> bool {
        if k8s.paused_container {
            return false;
        }
        let checks = [
            (&self.namespace_regex, &k8s.namespace),
            (&self.pod_regex, &k8s.pod),
            (&self.container_regex, &k8s.container_name),
        ];
        for (regex, value) in checks {
            if let Some(regex) = regex {
                if !regex.is_match(value) {
                    return false;
                }
            }
        }
        self.label_filter.evaluate(&k8s.labels)
    }
}

/// The compiled filter set of one configuration.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    pub k8s: K8sFilter,
    pub env: MatchCriteriaFilter,
    pub container_label: MatchCriteriaFilter,
}

impl ContainerFilters {
    /// Compiles every pattern of `config`.
    ///
    /// Kubernetes namespace, pod and container patterns are always regexes. A blank one
    /// matches everything.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::InvalidPattern`] encountered. Nothing is partially built.
    pub fn compile(config: &ContainerFilterConfig) -> Result<Self> {
        let optional_regex = |field: &'static str, pattern: &str| {
            if pattern.is_empty() {
                Ok(None)
            } else {
                FullMatchRegex::new(field, pattern).map(Some)
            }
        };

        let k8s = K8sFilter {
            namespace_regex: optional_regex("K8sNamespaceRegex", &config.k8s_namespace_regex)?,
            pod_regex: optional_regex("K8sPodRegex", &config.k8s_pod_regex)?,
            container_regex: optional_regex("K8sContainerRegex", &config.k8s_container_regex)?,
            label_filter: MatchCriteriaFilter::compile(
                "IncludeK8sLabel",
                &config.include_k8s_label,
                "ExcludeK8sLabel",
                &config.exclude_k8s_label,
            )?,
        };
        let env = MatchCriteriaFilter::compile(
            "IncludeEnv",
            &config.include_env,
            "ExcludeEnv",
            &config.exclude_env,
        )?;
        let container_label = MatchCriteriaFilter::compile(
            "IncludeContainerLabel",
            &config.include_container_label,
            "ExcludeContainerLabel",
            &config.exclude_container_label,
        )?;

        Ok(Self {
            k8s,
            env,
            container_label,
        })
    }

    /// Container labels first, then env, then Kubernetes.
    pub fn matches(&self, info: &RawContainerInfo) -> bool {
        self.container_label.evaluate(&info.container_labels)
            && self.env.evaluate(&info.env)
            && self.k8s.evaluate(&info.k8s)
    }
}

impl fmt::Display for FieldFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self
            .static_values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .chain(
                self.regex_values
                    .iter()
                    .map(|(k, v)| format!("{k}~{}", v.as_str())),
            )
            .collect();
        keys.sort();
        write!(f, "{{{}}}", keys.join(", "))
    }
}

impl fmt::Display for ContainerFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let regex = |r: &Option<FullMatchRegex>| r.as_ref().map_or("", FullMatchRegex::as_str).to_owned();
        write!(
            f,
            "k8s(namespace={}, pod={}, container={}, include={}, exclude={}) env(include={}, exclude={}) labels(include={}, exclude={})",
            regex(&self.k8s.namespace_regex),
            regex(&self.k8s.pod_regex),
            regex(&self.k8s.container_regex),
            self.k8s.label_filter.include,
            self.k8s.label_filter.exclude,
            self.env.include,
            self.env.exclude,
            self.container_label.include,
            self.container_label.exclude,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerID;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_anchored_patterns_compile_as_regex() {
        let filter = FieldFilter::compile(
            "IncludeEnv",
            &map(&[
                ("a", "^web.*$"),
                ("b", "^web.*"),
                ("c", "web.*$"),
                ("d", "exact-match"),
            ]),
        )
        .unwrap();

        assert!(filter.regex_values.contains_key("a"));
        assert!(filter.regex_values.contains_key("b"));
        assert_eq!(filter.static_values.get("c").map(String::as_str), Some("web.*$"));
        assert_eq!(
            filter.static_values.get("d").map(String::as_str),
            Some("exact-match")
        );
        assert_eq!(filter.regex_values["a"].as_str(), "^web.*$");
    }

    #[test]
    fn test_regex_is_full_match() {
        let regex = FullMatchRegex::new("K8sPodRegex", "^pod1$").unwrap();
        assert!(regex.is_match("pod1"));
        assert!(!regex.is_match("pod1x"));

        let unanchored = FullMatchRegex::new("K8sPodRegex", "pod").unwrap();
        assert!(unanchored.is_match("pod"));
        assert!(!unanchored.is_match("mypod1"));
    }

    #[test]
    fn test_invalid_regex_names_field() {
        let config = ContainerFilterConfig {
            include_env: map(&[("a", "^(unclosed")]),
            ..Default::default()
        };
        let err = ContainerFilters::compile(&config).unwrap_err();
        match &err {
            Error::InvalidPattern { field, pattern, .. } => {
                assert_eq!(*field, "IncludeEnv");
                assert_eq!(pattern, "^(unclosed");
            }
        }
        assert!(err.to_string().contains("IncludeEnv"));

        let config = ContainerFilterConfig {
            k8s_namespace_regex: "(".to_owned(),
            ..Default::default()
        };
        assert!(ContainerFilters::compile(&config).is_err());
    }

    #[test]
    fn test_static_empty_value_matches_present_key() {
        let filter = FieldFilter::compile("IncludeEnv", &map(&[("test", "")])).unwrap();
        assert!(filter.matches(&map(&[("test", "anything")])));
        assert!(!filter.matches(&map(&[("other", "x")])));
    }

    #[test]
    fn test_include_and_exclude() {
        let include_only =
            MatchCriteriaFilter::compile("IncludeEnv", &map(&[("test", "test")]), "ExcludeEnv", &HashMap::new())
                .unwrap();
        assert!(include_only.evaluate(&map(&[("test", "test")])));
        assert!(!include_only.evaluate(&map(&[("test", "test2")])));
        assert!(!include_only.evaluate(&HashMap::new()));

        let exclude_only =
            MatchCriteriaFilter::compile("IncludeEnv", &HashMap::new(), "ExcludeEnv", &map(&[("test", "test")]))
                .unwrap();
        assert!(!exclude_only.evaluate(&map(&[("test", "test")])));
        assert!(exclude_only.evaluate(&map(&[("test", "test2")])));
        assert!(exclude_only.evaluate(&HashMap::new()));

        assert!(MatchCriteriaFilter::default().evaluate(&map(&[("x", "y")])));
    }

    #[test]
    fn test_exclude_overrides_include() {
        let filter = MatchCriteriaFilter::compile(
            "IncludeContainerLabel",
            &map(&[("app", "^web.*")]),
            "ExcludeContainerLabel",
            &map(&[("debug", "true")]),
        )
        .unwrap();
        assert!(filter.evaluate(&map(&[("app", "web-1")])));
        assert!(!filter.evaluate(&map(&[("app", "web-1"), ("debug", "true")])));
    }

    #[test]
    fn test_k8s_filter() {
        let config = ContainerFilterConfig {
            k8s_namespace_regex: "default".to_owned(),
            k8s_pod_regex: "^pod1$".to_owned(),
            include_k8s_label: map(&[("app", "web")]),
            ..Default::default()
        };
        let filters = ContainerFilters::compile(&config).unwrap();

        let mut k8s = K8sInfo {
            namespace: "default".to_owned(),
            pod: "pod1".to_owned(),
            container_name: "anything".to_owned(),
            labels: map(&[("app", "web")]),
            paused_container: false,
        };
        assert!(filters.k8s.evaluate(&k8s));

        k8s.pod = "pod1x".to_owned();
        assert!(!filters.k8s.evaluate(&k8s));

        k8s.pod = "pod1".to_owned();
        k8s.namespace = "default2".to_owned();
        assert!(!filters.k8s.evaluate(&k8s));

        k8s.namespace = "default".to_owned();
        k8s.paused_container = true;
        assert!(!filters.k8s.evaluate(&k8s));

        k8s.paused_container = false;
        k8s.labels = map(&[("app", "db")]);
        assert!(!filters.k8s.evaluate(&k8s));
    }

    #[test]
    fn test_container_filters_require_all_groups() {
        let config = ContainerFilterConfig {
            k8s_container_regex: "^app$".to_owned(),
            include_env: map(&[("env", "prod")]),
            include_container_label: map(&[("team", "")]),
            ..Default::default()
        };
        let filters = ContainerFilters::compile(&config).unwrap();

        let mut info = RawContainerInfo::new(ContainerID::new("1").unwrap());
        info.env = map(&[("env", "prod")]);
        info.container_labels = map(&[("team", "infra")]);
        info.k8s.container_name = "app".to_owned();
        assert!(filters.matches(&info));

        let mut wrong_env = info.clone();
        wrong_env.env = map(&[("env", "dev")]);
        assert!(!filters.matches(&wrong_env));

        let mut no_label = info.clone();
        no_label.container_labels.clear();
        assert!(!filters.matches(&no_label));

        let mut wrong_container = info;
        wrong_container.k8s.container_name = "sidecar".to_owned();
        assert!(!filters.matches(&wrong_container));
    }

    #[test]
    fn test_display() {
        let config = ContainerFilterConfig {
            k8s_pod_regex: "^pod1$".to_owned(),
            include_env: map(&[("b", "^x"), ("a", "1")]),
            ..Default::default()
        };
        let filters = ContainerFilters::compile(&config).unwrap();
        let text = filters.to_string();
        assert!(text.contains("pod=^pod1$"));
        assert!(text.contains("env(include={a=1, b~^x}"));
    }
}
