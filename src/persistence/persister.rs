use std::sync::Arc;

use crate::container::RawContainerInfo;

use super::{PersistedState, Result};

/// Stores the registry across restarts.
pub trait StatePersister: Send + Sync {
    fn save(&self, containers: &[Arc<RawContainerInfo>]) -> Result<()>;

    fn load(&self) -> Result<PersistedState>;
}
