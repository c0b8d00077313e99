//! Error types for the mock configuration store.

use egeria_config_store::{ConfigStoreError, ConfigStoreErrorKind};
use thiserror::Error;

/// Error type for the mock configuration store.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// No engine is stored under this name or GUID.
    #[error("Engine not found: {0}")]
    EngineNotFound(String),

    /// No action is stored under this GUID.
    #[error("Engine action not found: {0}")]
    ActionNotFound(String),

    /// An outage was injected for this call.
    #[error("Configuration store unavailable: {0}")]
    Unavailable(String),

    /// Error when loading or parsing the seed file.
    #[error("Seed file error: {0}")]
    SeedFile(String),
}

impl ConfigStoreError for Error {
    fn kind(&self) -> ConfigStoreErrorKind {
        match self {
            Self::EngineNotFound(_) | Self::ActionNotFound(_) => ConfigStoreErrorKind::NotFound,
            Self::Unavailable(_) => ConfigStoreErrorKind::Unavailable,
            Self::SeedFile(_) => ConfigStoreErrorKind::Malformed,
        }
    }
}
