use std::fmt;
use std::sync::Arc;

use super::{ContainerID, RawContainerInfo};

/// Outcome of reconciling one configuration against the registry.
#[derive(Debug, Clone, Default)]
pub struct ContainerDiff {
    pub added: Vec<Arc<RawContainerInfo>>,
    pub modified: Vec<Arc<RawContainerInfo>>,
    pub removed: Vec<ContainerID>,
}

impl ContainerDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Appends `other`, which was computed after `self`.
    pub fn merge(&mut self, other: ContainerDiff) {
        self.added.extend(other.added);
        self.modified.extend(other.modified);
        self.removed.extend(other.removed);
    }
}

impl fmt::Display for ContainerDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_ids<'a>(
            f: &mut fmt::Formatter<'_>,
            label: &str,
            ids: impl Iterator<Item = &'a ContainerID>,
        ) -> fmt::Result {
            write!(f, "{label}: [")?;
            for (idx, id) in ids.enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{id}")?;
            }
            f.write_str("]")
        }

        write_ids(f, "added", self.added.iter().map(|info| &info.id))?;
        f.write_str(" ")?;
        write_ids(f, "modified", self.modified.iter().map(|info| &info.id))?;
        f.write_str(" ")?;
        write_ids(f, "removed", self.removed.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_ids() {
        let id = |s: &str| ContainerID::new(s).unwrap();
        let diff = ContainerDiff {
            added: vec![Arc::new(RawContainerInfo::new(id("a"))), Arc::new(RawContainerInfo::new(id("b")))],
            modified: Vec::new(),
            removed: vec![id("c")],
        };
        assert!(!diff.is_empty());
        assert_eq!(diff.to_string(), "added: [a, b] modified: [] removed: [c]");
        assert!(ContainerDiff::default().is_empty());
    }

    #[test]
    fn test_merge_keeps_order() {
        let id = |s: &str| ContainerID::new(s).unwrap();
        let mut first = ContainerDiff {
            removed: vec![id("a")],
            ..Default::default()
        };
        first.merge(ContainerDiff {
            added: vec![Arc::new(RawContainerInfo::new(id("b")))],
            removed: vec![id("c")],
            ..Default::default()
        });
        assert_eq!(first.removed, vec![id("a"), id("c")]);
        assert_eq!(first.added.len(), 1);
    }
}
