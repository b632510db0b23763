use framegraph_types::{FrameId, LinkId, TransactionId, TypesError};
use thiserror::Error;

/// Request-local failures of store operations.
///
/// None of these affect other in-flight transactions; the failing call
/// leaves its transaction Active and unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("frame not found: {0}")]
    FrameNotFound(FrameId),

    #[error("link not found: {0}")]
    LinkNotFound(LinkId),

    #[error("frame name already in use: {name} (bound to {owner})")]
    DuplicateName { name: String, owner: FrameId },

    #[error("frame names must not be empty")]
    InvalidName,

    #[error("link endpoints must differ, got {0} twice")]
    SelfLink(FrameId),

    #[error("link confidence must lie in [0, 1], got {0}")]
    InvalidConfidence(f64),

    #[error("invalid link transformation: {0}")]
    InvalidTransform(TypesError),

    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("transaction {0} is no longer active")]
    TransactionNotActive(TransactionId),

    #[error("snapshot version {0} is no longer retained")]
    SnapshotUnavailable(u64),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
