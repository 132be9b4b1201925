//! The authoritative set of containers on this node.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::container::{ContainerID, RawContainerInfo};

mod diff;

pub use diff::compute_diff;

pub type ContainerMap = HashMap<ContainerID, Arc<RawContainerInfo>>;

/// An incremental update reported by the container source.
#[derive(Debug, Clone, Default)]
pub struct ContainerDelta {
    pub updated: Vec<RawContainerInfo>,
    pub deleted: Vec<ContainerID>,
    pub stopped: Vec<ContainerID>,
}

impl ContainerDelta {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty() && self.stopped.is_empty()
    }
}

/// Seconds since the Unix epoch, saturating to 0 for clocks set before it.
pub(crate) fn unix_time_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Container records keyed by id, plus the ids reported as stopped but not yet consumed.
///
/// Each lock is held only for the map operation itself. Callers needing a consistent view
/// across several lookups take a [`ContainerRegistry::snapshot`].
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    containers: Mutex<ContainerMap>,
    stopped: Mutex<Vec<ContainerID>>,
    last_update_time: AtomicU64,
}

impl ContainerRegistry {
    /// Swaps in a complete set of containers. A full refresh always counts as a change.
    pub fn replace_all(&self, containers: ContainerMap) {
        let previous = std::mem::replace(&mut *self.containers.lock(), containers);
        self.touch();
        // Drop the old records outside the lock.
        drop(previous);
    }

    /// Upserts, erases and queues stops.
    ///
    /// Returns the ids of the upserted records when anything changed, `None` otherwise.
    /// Erasing an unknown id is not a change; a stop always is.
    pub fn apply_delta(&self, delta: ContainerDelta) -> Option<Vec<ContainerID>> {
        let mut changed = false;
        let mut updated_ids = Vec::with_capacity(delta.updated.len());
        {
            let mut containers = self.containers.lock();
            for info in delta.updated {
                updated_ids.push(info.id.clone());
                containers.insert(info.id.clone(), Arc::new(info));
                changed = true;
            }
            for id in &delta.deleted {
                changed |= containers.remove(id).is_some();
            }
        }
        if !delta.stopped.is_empty() {
            self.stopped.lock().extend(delta.stopped);
            changed = true;
        }

        if changed {
            self.touch();
            Some(updated_ids)
        } else {
            None
        }
    }

    /// Publishes a copy of the record for `id` with `stopped` set.
    pub fn mark_stopped(&self, id: &ContainerID) -> Option<Arc<RawContainerInfo>> {
        let mut containers = self.containers.lock();
        let current = containers.get_mut(id)?;
        if !current.stopped {
            let mut copy = (**current).clone();
            copy.stopped = true;
            *current = Arc::new(copy);
        }
        Some(Arc::clone(current))
    }

    pub fn get(&self, id: &str) -> Option<Arc<RawContainerInfo>> {
        self.containers.lock().get(id).cloned()
    }

    /// A copy of the map. Records are shared, not cloned.
    pub fn snapshot(&self) -> ContainerMap {
        self.containers.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.containers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes all ids reported as stopped since the last call.
    pub fn drain_stopped(&self) -> Vec<ContainerID> {
        std::mem::take(&mut *self.stopped.lock())
    }

    /// Unix time, in seconds, of the latest change. Zero before the first one.
    pub fn last_update_time(&self) -> u64 {
        self.last_update_time.load(Ordering::Acquire)
    }

    fn touch(&self) {
        // Never zero once something changed, even with a broken clock.
        self.last_update_time
            .store(unix_time_secs().max(1), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> RawContainerInfo {
        let mut info = RawContainerInfo::new(ContainerID::new(id).unwrap());
        info.status = "running".to_owned();
        info
    }

    fn id(s: &str) -> ContainerID {
        ContainerID::new(s).unwrap()
    }

    #[test]
    fn test_replace_all_swaps_and_touches() {
        let registry = ContainerRegistry::default();
        assert_eq!(registry.last_update_time(), 0);

        let mut map = ContainerMap::new();
        map.insert(id("a"), Arc::new(info("a")));
        registry.replace_all(map);

        assert_eq!(registry.len(), 1);
        assert!(registry.get("a").is_some());
        assert!(registry.last_update_time() > 0);

        registry.replace_all(ContainerMap::new());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_noop_delta_keeps_timestamp() {
        let registry = ContainerRegistry::default();
        assert_eq!(registry.apply_delta(ContainerDelta::default()), None);
        assert_eq!(registry.last_update_time(), 0);

        let delta = ContainerDelta {
            deleted: vec![id("missing")],
            ..Default::default()
        };
        assert_eq!(registry.apply_delta(delta), None);
        assert_eq!(registry.last_update_time(), 0);
    }

    #[test]
    fn test_apply_delta() {
        let registry = ContainerRegistry::default();
        let delta = ContainerDelta {
            updated: vec![info("a"), info("b")],
            ..Default::default()
        };
        assert_eq!(registry.apply_delta(delta), Some(vec![id("a"), id("b")]));
        assert_eq!(registry.len(), 2);
        assert!(registry.last_update_time() > 0);

        let delta = ContainerDelta {
            deleted: vec![id("a")],
            stopped: vec![id("b")],
            ..Default::default()
        };
        assert_eq!(registry.apply_delta(delta), Some(Vec::new()));
        assert!(registry.get("a").is_none());
        assert_eq!(registry.drain_stopped(), vec![id("b")]);
        assert!(registry.drain_stopped().is_empty());
    }

    #[test]
    fn test_mark_stopped_publishes_copy() {
        let registry = ContainerRegistry::default();
        registry.apply_delta(ContainerDelta {
            updated: vec![info("a")],
            ..Default::default()
        });
        let before = registry.get("a").unwrap();
        let after = registry.mark_stopped(&id("a")).unwrap();

        assert!(!before.stopped);
        assert!(after.stopped);
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&after, &registry.get("a").unwrap()));
        assert!(registry.mark_stopped(&id("missing")).is_none());
    }
}
