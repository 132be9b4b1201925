use crate::fsutil::{FileOpenError, FileWriteError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] FileOpenError),
    #[error(transparent)]
    Write(#[from] FileWriteError),
    #[error("failed to read state file: {0}")]
    Read(#[source] std::io::Error),
    #[error("malformed state document: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("state document version {version} has no `{section}` array")]
    MissingSection {
        version: &'static str,
        section: &'static str,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
