use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::container::RawContainerInfo;
use crate::fsutil;

use super::{Error, PersistedState, Result, StatePersister, models};

/// Keeps the state document in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFilePersister {
    path: PathBuf,
}

impl JsonFilePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatePersister for JsonFilePersister {
    fn save(&self, containers: &[Arc<RawContainerInfo>]) -> Result<()> {
        let json = models::encode(containers.iter().map(|info| info.as_ref()))?;
        fsutil::overwrite_file(&self.path, json.as_bytes())?;
        log::info!(
            "saved {} container(s) to `{}`",
            containers.len(),
            self.path.display()
        );
        Ok(())
    }

    fn load(&self) -> Result<PersistedState> {
        let mut reader = fsutil::open_file_reader(&self.path)?;
        let mut json = String::new();
        reader.read_to_string(&mut json).map_err(Error::Read)?;
        let state = models::decode(&json)?;
        log::info!(
            "loaded {} container(s) from `{}` (version {})",
            state.len(),
            self.path.display(),
            state.version()
        );
        Ok(state)
    }
}
