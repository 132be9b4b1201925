//! Versioned on-disk form of the container registry.

mod error;
mod file;
mod models;
mod persister;

pub use error::{Error, Result};
pub use file::JsonFilePersister;
pub use models::{CURRENT_VERSION, LEGACY_VERSION, LegacyEntry, PersistedState, decode, encode};
pub use persister::StatePersister;
