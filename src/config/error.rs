use std::net::AddrParseError;
use std::path::PathBuf;

use crate::fsutil::FileOpenError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{name}`: {source}")]
    InvalidAddr {
        name: &'static str,
        value: String,
        #[source]
        source: AddrParseError,
    },
    #[error(transparent)]
    Open(#[from] FileOpenError),
    #[error("malformed configurations file `{path}`: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
