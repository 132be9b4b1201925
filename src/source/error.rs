use std::path::PathBuf;

use crate::fsutil::FileOpenError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] FileOpenError),
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed container message: {0}")]
    Malformed(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
