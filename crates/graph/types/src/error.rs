use thiserror::Error;

/// Errors raised while constructing or converting core types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypesError {
    #[error("matrix is not a rigid transform: {0}")]
    NotRigid(String),

    #[error("matrix has non-finite entries")]
    NonFinite,

    #[error("covariance is not a valid variance matrix: {0}")]
    InvalidCovariance(String),

    #[error("global id must be 32 bytes, got {0}")]
    InvalidGlobalIdLength(usize),

    #[error("timestamp out of range")]
    TimeOutOfRange,
}
