//! Versioned graph store for FrameGraph.
//!
//! The store keeps an arena of immutable [`GraphVersion`]s. Each transaction
//! reads from the version that was head when it started, buffers writes in
//! a private draft, and on commit is validated optimistically against
//! everything committed since (first committer wins). A successful commit
//! installs a new head and returns a [`CommitDiff`] describing the change.
//!
//! ```text
//! start ──► reads / buffered writes ──► commit ──► new head + CommitDiff
//!                                   └──► abort  ──► draft discarded
//! ```
//!
//! [`SpatialIndex`] answers link and neighbourhood queries against any
//! version; [`NameRegistry`] is the per-version name bijection.

pub mod arena;
pub mod diff;
pub mod error;
pub mod names;
pub mod spatial;
pub mod store;
pub mod txn;
pub mod version;

pub use arena::EntityKey;
pub use diff::CommitDiff;
pub use error::{Result, StoreError};
pub use names::NameRegistry;
pub use spatial::SpatialIndex;
pub use store::{GraphStore, DEFAULT_RETENTION_WARNING};
pub use txn::{CommitOutcome, StoreStats};
pub use version::GraphVersion;
