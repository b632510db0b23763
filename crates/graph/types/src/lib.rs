//! Core type definitions for FrameGraph.
//!
//! This crate provides the shared vocabulary of the store: identifiers,
//! timestamps, uncertain transforms, frames, links, attached data and the
//! declarative link filters. No business logic, just types.
//! Every FrameGraph crate depends on this crate.

pub mod entity;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod global_id;
pub mod ids;
pub mod time;

// Re-export primary types at crate root for ergonomic use.
pub use entity::{DataBlob, DataMap, DataType, EstimatedFrameSet, Frame, Link, LinkContent};
pub use error::TypesError;
pub use filter::{select_links, LabelFilter, LabelStrategy, TimeFilter, TimeStrategy};
pub use geometry::{
    BoundingBox, Covariance, Epsilon, PoseDelta, Sphere, Transform, UncertainTransform,
};
pub use global_id::{GlobalId, HostId, IdMapper};
pub use ids::{FrameId, LinkId, TransactionId, TriggerId};
pub use time::{TimeInterval, TimeStamp};
