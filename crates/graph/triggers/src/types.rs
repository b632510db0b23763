use framegraph_types::{DataType, FrameId, LinkId, TriggerId};
use serde::{Deserialize, Serialize};

/// Subscriber identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub uuid::Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a trigger watches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchKind {
    Links,
    EstimatedTransforms,
    FrameData,
    LinkData,
}

/// Change reported by a trigger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Links touching watched frames were added (or replaced) or removed
    LinksChanged {
        added: Vec<LinkId>,
        removed: Vec<LinkId>,
    },
    /// Estimated poses of watched frames moved past epsilon or changed
    /// reachability
    EstimatedFramesMoved { frames: Vec<FrameId>, origin: FrameId },
    FrameDataChanged {
        frames: Vec<FrameId>,
        data_type: DataType,
    },
    LinkDataChanged {
        links: Vec<LinkId>,
        data_type: DataType,
    },
}

/// A notification addressed by the trigger that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMessage {
    pub trigger: TriggerId,
    /// Version whose commit caused the notification
    pub version: u64,
    pub notification: Notification,
}
