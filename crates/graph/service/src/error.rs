use framegraph_estimation::EstimationError;
use framegraph_store::StoreError;
use framegraph_types::GlobalId;
use thiserror::Error;

/// Service-level errors.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("estimation error: {0}")]
    Estimation(#[from] EstimationError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown estimation strategy: {0}")]
    UnknownStrategy(String),

    #[error("global id not found: {0}")]
    GlobalIdNotFound(GlobalId),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
