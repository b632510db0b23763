use framegraph_types::{FrameId, LinkId, TriggerId};
use thiserror::Error;

/// Reasons a watch registration is refused. Callers see
/// [`TriggerId::INVALID`]; the reason is logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriggerError {
    #[error("frame not found: {0}")]
    FrameNotFound(FrameId),

    #[error("link not found: {0}")]
    LinkNotFound(LinkId),

    #[error("a watch needs at least one entity")]
    EmptyWatch,

    #[error("trigger not found: {0}")]
    TriggerNotFound(TriggerId),

    #[error("trigger {0} watches a different kind of change")]
    KindMismatch(TriggerId),

    #[error("trigger {trigger} is relative to {existing}, not {requested}")]
    OriginMismatch {
        trigger: TriggerId,
        existing: FrameId,
        requested: FrameId,
    },
}

pub type Result<T> = std::result::Result<T, TriggerError>;
