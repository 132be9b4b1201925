use crate::filter;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config `{config}` has invalid container filters: {source}")]
    InvalidFilters {
        config: String,
        #[source]
        source: filter::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
