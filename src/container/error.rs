#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid container id: `{0}`")]
    InvalidContainerID(String),
    #[error("unknown metadata key: {0}")]
    UnknownMetadataKey(String),
}

pub type Result<T> = std::result::Result<T, Error>;
