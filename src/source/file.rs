use std::io::Read;
use std::path::{Path, PathBuf};

use crate::fsutil;

use super::{ContainerSource, Error, Result};

/// Reads collaborator reports dropped on disk.
///
/// The snapshot file is re-read on every call. The delta file is claimed by renaming it
/// before reading, so each delta is applied once even if a new one is written meanwhile.
#[derive(Debug, Clone)]
pub struct FileSource {
    all_path: PathBuf,
    diff_path: PathBuf,
}

impl FileSource {
    pub fn new(all_path: impl Into<PathBuf>, diff_path: impl Into<PathBuf>) -> Self {
        Self {
            all_path: all_path.into(),
            diff_path: diff_path.into(),
        }
    }
}

fn read_if_exists(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    let mut reader = fsutil::open_file_reader(path)?;
    let mut out = String::new();
    reader
        .read_to_string(&mut out)
        .map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(out)
}

impl ContainerSource for FileSource {
    fn all_containers_meta(&self) -> Result<String> {
        read_if_exists(&self.all_path)
    }

    fn diff_containers_meta(&self) -> Result<String> {
        let claimed = self.diff_path.with_extension("claimed");
        match std::fs::rename(&self.diff_path, &claimed) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(source) => {
                return Err(Error::Io {
                    path: self.diff_path.clone(),
                    source,
                });
            }
        }
        let out = read_if_exists(&claimed)?;
        if let Err(err) = std::fs::remove_file(&claimed) {
            log::warn!("failed to remove `{}`: {}", claimed.display(), err);
        }
        Ok(out)
    }
}
