use fleet_core::{ConfigError, ServiceError, StoreError};
use thiserror::Error;

/// Errors that stop a scenario or the live run from completing.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Setup failed: {0}")]
    Setup(String),
}
