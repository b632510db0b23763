//! Change watches and asynchronous notifications for FrameGraph.
//!
//! A trigger watches one kind of change on a fixed set of entities:
//! links touching frames, estimated poses relative to an origin, or data
//! attached to frames or links. After each commit the [`TriggerManager`]
//! evaluates every watch against the commit's diff and routes the
//! resulting [`TriggerMessage`]s to subscribers.
//!
//! ```text
//! commit ──► CommitDiff ──► TriggerManager::on_commit
//!                              │  evaluate each Watch
//!                              ▼
//!                        NotificationRouter ──► subscriber channels
//! ```
//!
//! Registration never fails loudly: invalid requests return
//! [`TriggerId::INVALID`](framegraph_types::TriggerId::INVALID).

pub mod error;
pub mod manager;
pub mod router;
pub mod types;
pub mod watch;

pub use error::{Result, TriggerError};
pub use manager::TriggerManager;
pub use router::{NotificationRouter, DEFAULT_CHANNEL_CAPACITY};
pub use types::{Notification, SubscriberId, TriggerMessage, WatchKind};
pub use watch::Watch;
