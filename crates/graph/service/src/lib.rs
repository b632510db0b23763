//! FrameGraph service facade.
//!
//! [`FrameGraphService`] wires the store, the estimation engine and the
//! trigger manager together and exposes every RPC as an `async fn`. The
//! transport is left to the embedding application; all request and
//! response types are serde-serialisable.
//!
//! # Example
//!
//! ```no_run
//! use framegraph_service::{FrameGraphConfig, FrameGraphService};
//! use framegraph_types::{LinkContent, Transform};
//!
//! # async fn demo() -> framegraph_service::Result<()> {
//! let service = FrameGraphService::new(&FrameGraphConfig::default())?;
//! let tx = service.start_transaction().await;
//! let world = service.create_frame(tx, Some("world")).await?;
//! let robot = service.create_frame(tx, Some("robot")).await?;
//! let link = service
//!     .set_link(tx, LinkContent::new(world, robot, Transform::from_translation(1.0, 0.0, 0.0)), None)
//!     .await?;
//! let poses = service.estimate_frames(tx, &[link], world, "").await?;
//! assert!(poses.contains(robot));
//! let (committed, _) = service.commit_transaction(tx).await;
//! assert!(committed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod service;

pub use config::{EstimationConfig, FrameGraphConfig, LoggingConfig, StoreConfig, TriggerConfig};
pub use error::{Result, ServiceError};
pub use service::{FrameGraphService, ServiceStats};
