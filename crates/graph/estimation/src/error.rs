use framegraph_store::StoreError;
use framegraph_types::FrameId;
use thiserror::Error;

/// Request-local failures of estimation queries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("origin frame not found: {0}")]
    OriginNotFound(FrameId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, EstimationError>;
