//! Pose estimation for FrameGraph.
//!
//! Links carry uncertain, possibly redundant relative transforms. The
//! [`EstimationEngine`] selects a sub-graph (explicit links, a box or
//! sphere around the origin, or a hop-limited neighbourhood) and hands it
//! to a [`RelaxationStrategy`] that produces one deterministic pose per
//! reachable frame, relative to the origin.
//!
//! Strategies are chosen by name through the [`StrategyRegistry`]:
//! - `min_uncertainty` (default): least accumulated covariance, weighted
//!   by link confidence
//! - `spanning_tree`: breadth-first tree preferring confident links

pub mod engine;
pub mod error;
pub mod select;
pub mod strategy;

pub use engine::EstimationEngine;
pub use error::{EstimationError, Result};
pub use select::Region;
pub use strategy::{
    MinUncertainty, RelaxationStrategy, SpanningTree, StrategyRegistry, DEFAULT_STRATEGY,
};
