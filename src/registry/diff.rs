use std::collections::{BTreeMap, BTreeSet};

use crate::container::{ContainerDiff, ContainerID, ContainerInfo};
use crate::filter::ContainerFilters;

use super::ContainerMap;

/// Reconciles one configuration against a registry snapshot.
///
/// `full_ids` holds every id the configuration has already evaluated, matched or not, and
/// is updated in place. `matched` is the configuration's current view. Passes run in order:
/// removals, modifications, then additions.
///
/// # Arguments
///
/// * `containers` - Registry snapshot to compare against.
/// * `full_ids` - Ids already evaluated by this configuration.
/// * `matched` - Containers currently matched by this configuration.
/// * `filters` - The configuration's compiled filters.
/// * `allow_non_running` - Whether containers whose status is not `running` are evaluated.
pub fn compute_diff(
    containers: &ContainerMap,
    full_ids: &mut BTreeSet<ContainerID>,
    matched: &BTreeMap<ContainerID, ContainerInfo>,
    filters: &ContainerFilters,
    allow_non_running: bool,
) -> ContainerDiff {
    let mut diff = ContainerDiff::default();

    full_ids.retain(|id| {
        if containers.contains_key(id) {
            return true;
        }
        if matched.contains_key(id) {
            diff.removed.push(id.clone());
        }
        false
    });

    for (id, info) in matched {
        if let Some(current) = containers.get(id) {
            if *current != info.raw {
                diff.modified.push(current.clone());
            }
        }
    }

    let mut candidates: Vec<_> = containers
        .iter()
        .filter(|(id, _)| !full_ids.contains(*id))
        .collect();
    candidates.sort_unstable_by(|a, b| a.0.cmp(b.0));
    for (id, info) in candidates {
        full_ids.insert(id.clone());
        if !allow_non_running && !info.is_running() {
            continue;
        }
        if filters.matches(info) {
            diff.added.push(info.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::container::RawContainerInfo;
    use crate::filter::ContainerFilterConfig;

    fn id(s: &str) -> ContainerID {
        ContainerID::new(s).unwrap()
    }

    fn running(s: &str) -> RawContainerInfo {
        let mut info = RawContainerInfo::new(id(s));
        info.status = "running".to_owned();
        info
    }

    fn registry_of(infos: Vec<RawContainerInfo>) -> ContainerMap {
        infos
            .into_iter()
            .map(|info| (info.id.clone(), Arc::new(info)))
            .collect()
    }

    fn env_filters(include: &[(&str, &str)], exclude: &[(&str, &str)]) -> ContainerFilters {
        let to_map = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        ContainerFilters::compile(&ContainerFilterConfig {
            include_env: to_map(include),
            exclude_env: to_map(exclude),
            ..Default::default()
        })
        .unwrap()
    }

    fn env_registry() -> ContainerMap {
        let mut a = running("123");
        a.env.insert("test".to_owned(), "test".to_owned());
        let mut b = running("1234");
        b.env.insert("test".to_owned(), "test2".to_owned());
        registry_of(vec![a, b])
    }

    fn added_ids(diff: &ContainerDiff) -> Vec<&str> {
        diff.added.iter().map(|info| info.id.as_ref()).collect()
    }

    #[test]
    fn test_env_include() {
        let containers = env_registry();
        let mut full_ids = BTreeSet::new();
        let diff = compute_diff(
            &containers,
            &mut full_ids,
            &BTreeMap::new(),
            &env_filters(&[("test", "test")], &[]),
            false,
        );
        assert_eq!(added_ids(&diff), vec!["123"]);
        assert_eq!(full_ids.len(), 2);
    }

    #[test]
    fn test_env_exclude() {
        let containers = env_registry();
        let mut full_ids = BTreeSet::new();
        let diff = compute_diff(
            &containers,
            &mut full_ids,
            &BTreeMap::new(),
            &env_filters(&[], &[("test", "test")]),
            false,
        );
        assert_eq!(added_ids(&diff), vec!["1234"]);
    }

    #[test]
    fn test_evaluated_ids_are_not_reevaluated() {
        let containers = env_registry();
        let filters = env_filters(&[("test", "test")], &[]);
        let mut full_ids = BTreeSet::new();
        compute_diff(&containers, &mut full_ids, &BTreeMap::new(), &filters, false);
        let second = compute_diff(&containers, &mut full_ids, &BTreeMap::new(), &filters, false);
        assert!(second.is_empty());
    }

    #[test]
    fn test_status_policy() {
        let mut exited = running("1");
        exited.status = "exited".to_owned();
        let containers = registry_of(vec![exited]);
        let filters = ContainerFilters::default();

        let mut full_ids = BTreeSet::new();
        let diff = compute_diff(&containers, &mut full_ids, &BTreeMap::new(), &filters, false);
        assert!(diff.added.is_empty());
        assert!(full_ids.contains("1"));

        let mut full_ids = BTreeSet::new();
        let diff = compute_diff(&containers, &mut full_ids, &BTreeMap::new(), &filters, true);
        assert_eq!(added_ids(&diff), vec!["1"]);
    }

    #[test]
    fn test_removed_and_modified() {
        let old_a = Arc::new(running("a"));
        let old_b = Arc::new(running("b"));
        let mut matched = BTreeMap::new();
        matched.insert(id("a"), ContainerInfo::new(Arc::clone(&old_a)));
        matched.insert(id("b"), ContainerInfo::new(Arc::clone(&old_b)));
        let mut full_ids: BTreeSet<_> = [id("a"), id("b"), id("c")].into_iter().collect();

        // "a" is gone, "b" changed, "c" was evaluated but never matched and is gone too.
        let mut new_b = running("b");
        new_b.log_path = "/var/log/b.log".to_owned();
        let containers = registry_of(vec![new_b, running("d")]);

        let diff = compute_diff(
            &containers,
            &mut full_ids,
            &matched,
            &ContainerFilters::default(),
            false,
        );
        assert_eq!(diff.removed, vec![id("a")]);
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].log_path, "/var/log/b.log");
        assert_eq!(added_ids(&diff), vec!["d"]);
        let tracked: Vec<&str> = full_ids.iter().map(|id| id.as_ref()).collect();
        assert_eq!(tracked, vec!["b", "d"]);
    }

    #[test]
    fn test_diff_partitions_ids() {
        let mut matched = BTreeMap::new();
        let mut full_ids = BTreeSet::new();
        for s in ["a", "b", "c"] {
            matched.insert(id(s), ContainerInfo::new(Arc::new(running(s))));
            full_ids.insert(id(s));
        }
        let mut changed = running("b");
        changed.name = "renamed".to_owned();
        let containers = registry_of(vec![changed, running("c"), running("d"), running("e")]);

        let diff = compute_diff(
            &containers,
            &mut full_ids,
            &matched,
            &ContainerFilters::default(),
            false,
        );

        let added: BTreeSet<_> = diff.added.iter().map(|i| i.id.clone()).collect();
        let modified: BTreeSet<_> = diff.modified.iter().map(|i| i.id.clone()).collect();
        let removed: BTreeSet<_> = diff.removed.iter().cloned().collect();
        assert!(added.is_disjoint(&removed));
        assert!(added.is_disjoint(&modified));
        assert!(modified.is_disjoint(&removed));
        assert_eq!(removed, [id("a")].into_iter().collect());
        assert_eq!(modified, [id("b")].into_iter().collect());
        assert_eq!(added, [id("d"), id("e")].into_iter().collect());
    }
}
