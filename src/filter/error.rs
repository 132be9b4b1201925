#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid regex pattern `{pattern}` in the config for {field}: {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
