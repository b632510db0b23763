use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::geometry::{Transform, UncertainTransform};
use crate::ids::{FrameId, LinkId};
use crate::time::{TimeInterval, TimeStamp};

/// Key under which an opaque blob is attached to a frame or link.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataType(pub String);

impl DataType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DataType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque user payload. Cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataBlob(pub Bytes);

impl DataBlob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for DataBlob {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&'static str> for DataBlob {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

/// One value per data type; setting a type again overwrites it.
pub type DataMap = BTreeMap<DataType, DataBlob>;

/// A coordinate frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub name: Option<String>,
    #[serde(default)]
    pub data: DataMap,
}

impl Frame {
    pub fn new(id: FrameId) -> Self {
        Self {
            id,
            name: None,
            data: DataMap::new(),
        }
    }
}

/// Everything a client supplies to create or replace a link.
///
/// The transformation maps `child` coordinates into `parent` coordinates,
/// i.e. it is the pose of `child` as seen from `parent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkContent {
    pub child: FrameId,
    pub parent: FrameId,
    pub label: String,
    pub time: TimeStamp,
    pub transformation: UncertainTransform,
    /// Belief that the relation exists at all, in `[0, 1]`
    pub confidence: f64,
}

impl LinkContent {
    /// A fully confident, exact link stamped with the current time.
    pub fn new(parent: FrameId, child: FrameId, transform: Transform) -> Self {
        Self {
            child,
            parent,
            label: String::new(),
            time: TimeStamp::now(),
            transformation: UncertainTransform::certain(transform),
            confidence: 1.0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_time(mut self, time: TimeStamp) -> Self {
        self.time = time;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_transformation(mut self, transformation: UncertainTransform) -> Self {
        self.transformation = transformation;
        self
    }

    pub fn touches(&self, frame: FrameId) -> bool {
        self.child == frame || self.parent == frame
    }

    /// The endpoint opposite `frame`, if `frame` is an endpoint.
    pub fn other_end(&self, frame: FrameId) -> Option<FrameId> {
        if self.parent == frame {
            Some(self.child)
        } else if self.child == frame {
            Some(self.parent)
        } else {
            None
        }
    }
}

/// A stored link: content plus identity and attached data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub content: LinkContent,
    #[serde(default)]
    pub data: DataMap,
}

/// Poses produced by relaxing a sub-graph relative to an origin frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatedFrameSet {
    pub origin: FrameId,
    /// Span of the link timestamps that contributed; `None` when no link was used
    pub time: Option<TimeInterval>,
    /// Sorted by frame id; the origin is always present at identity
    pub frames: Vec<(FrameId, Transform)>,
}

impl EstimatedFrameSet {
    /// A set containing only the origin.
    pub fn origin_only(origin: FrameId) -> Self {
        Self {
            origin,
            time: None,
            frames: vec![(origin, Transform::identity())],
        }
    }

    pub fn get(&self, frame: FrameId) -> Option<&Transform> {
        self.frames
            .binary_search_by_key(&frame, |(id, _)| *id)
            .ok()
            .map(|idx| &self.frames[idx].1)
    }

    pub fn contains(&self, frame: FrameId) -> bool {
        self.get(frame).is_some()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame_ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.frames.iter().map(|(id, _)| *id)
    }
}
