use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use framegraph_estimation::EstimationEngine;
use framegraph_store::{CommitDiff, GraphStore, GraphVersion};
use framegraph_types::{Epsilon, FrameId, LinkId, TriggerId};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Result, TriggerError};
use crate::router::NotificationRouter;
use crate::types::{SubscriberId, TriggerMessage, WatchKind};
use crate::watch::{watched_poses, Watch};

/// Registers watches and turns commit diffs into notifications.
///
/// Registration and deletion bypass transactions and validate against the
/// latest committed version. Evaluation runs after a commit has been
/// installed; notifications go out through the [`NotificationRouter`].
pub struct TriggerManager {
    store: Arc<GraphStore>,
    engine: Arc<EstimationEngine>,
    watches: RwLock<BTreeMap<TriggerId, Watch>>,
    router: NotificationRouter,
    next_id: AtomicU64,
}

impl TriggerManager {
    pub fn new(store: Arc<GraphStore>, engine: Arc<EstimationEngine>, channel_capacity: usize) -> Self {
        Self {
            store,
            engine,
            watches: RwLock::new(BTreeMap::new()),
            router: NotificationRouter::new(channel_capacity),
            next_id: AtomicU64::new(1),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Watch links touching `frames`.
    pub async fn watch_links(&self, frames: &[FrameId], reuse: Option<TriggerId>) -> TriggerId {
        let head = self.store.head();
        let result = require_frames(&head, frames).map(|frames| Watch::Links { frames });
        self.install(result, reuse, "links").await
    }

    /// Watch the estimated poses of `frames` relative to `origin`.
    pub async fn watch_estimated_transforms(
        &self,
        frames: &[FrameId],
        origin: FrameId,
        epsilon: Epsilon,
        strategy: &str,
        reuse: Option<TriggerId>,
    ) -> TriggerId {
        let head = self.store.head();
        let result = require_frames(&head, &[origin])
            .and_then(|_| require_frames(&head, frames))
            .map(|frames| Watch::EstimatedTransforms {
                frames,
                origin,
                epsilon,
                strategy: strategy.to_string(),
                baseline: BTreeMap::new(),
            });
        self.install(result, reuse, "estimated_transforms").await
    }

    /// Watch data attached to `frames`.
    pub async fn watch_frame_data(&self, frames: &[FrameId], reuse: Option<TriggerId>) -> TriggerId {
        let head = self.store.head();
        let result = require_frames(&head, frames).map(|frames| Watch::FrameData { frames });
        self.install(result, reuse, "frame_data").await
    }

    /// Watch data attached to `links`.
    pub async fn watch_link_data(&self, links: &[LinkId], reuse: Option<TriggerId>) -> TriggerId {
        let head = self.store.head();
        let result = require_links(&head, links).map(|links| Watch::LinkData { links });
        self.install(result, reuse, "link_data").await
    }

    /// Remove triggers. Unknown ids are ignored.
    pub async fn delete_triggers(&self, ids: &[TriggerId]) {
        let mut watches = self.watches.write().await;
        let removed = ids.iter().filter(|id| watches.remove(id).is_some()).count();
        debug!(requested = ids.len(), removed, "Triggers deleted");
    }

    pub async fn kind_of(&self, id: TriggerId) -> Option<WatchKind> {
        self.watches.read().await.get(&id).map(Watch::kind)
    }

    pub async fn trigger_count(&self) -> usize {
        self.watches.read().await.len()
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Subscribe to notifications of the given triggers (None = all).
    pub async fn subscribe(
        &self,
        triggers: Option<Vec<TriggerId>>,
    ) -> (SubscriberId, mpsc::Receiver<TriggerMessage>) {
        self.router.subscribe(triggers).await
    }

    pub async fn unsubscribe(&self, id: &SubscriberId) {
        self.router.unsubscribe(id).await
    }

    /// Evaluate every watch against a committed diff and the version that
    /// commit produced, then route the resulting messages. Returns the
    /// number of messages produced.
    pub async fn on_commit(&self, diff: &CommitDiff, version: &GraphVersion) -> usize {
        let messages: Vec<TriggerMessage> = {
            let mut watches = self.watches.write().await;
            watches
                .iter_mut()
                .flat_map(|(id, watch)| {
                    watch
                        .evaluate(diff, version, &self.engine)
                        .into_iter()
                        .map(move |notification| TriggerMessage {
                            trigger: *id,
                            version: diff.version,
                            notification,
                        })
                })
                .collect()
        };

        for message in &messages {
            let delivered = self.router.route(message).await;
            debug!(trigger = %message.trigger, version = message.version, delivered, "Notification routed");
        }
        if !messages.is_empty() {
            info!(version = diff.version, messages = messages.len(), "Triggers fired");
        }
        messages.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn install(&self, watch: Result<Watch>, reuse: Option<TriggerId>, kind: &str) -> TriggerId {
        let outcome = match watch {
            Ok(watch) => self.insert_or_merge(watch, reuse).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(id) => {
                info!(trigger = %id, kind, reused = reuse.is_some_and(|r| r.is_valid()), "Trigger registered");
                id
            }
            Err(e) => {
                warn!(kind, error = %e, "Trigger registration refused");
                TriggerId::INVALID
            }
        }
    }

    async fn insert_or_merge(&self, mut watch: Watch, reuse: Option<TriggerId>) -> Result<TriggerId> {
        let head = self.store.head();
        let mut watches = self.watches.write().await;

        let reuse = reuse.filter(|id| id.is_valid());
        let id = match reuse {
            Some(id) => {
                let existing = watches.get(&id).ok_or(TriggerError::TriggerNotFound(id))?;
                watch = merge(id, existing, watch)?;
                id
            }
            None => TriggerId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        };

        if let Watch::EstimatedTransforms {
            frames,
            origin,
            strategy,
            baseline,
            ..
        } = &mut watch
        {
            *baseline = watched_poses(&self.engine, &head, *origin, strategy, frames);
        }
        watches.insert(id, watch);
        Ok(id)
    }
}

/// Combine an existing watch with a new registration of the same kind.
/// Estimated watches must share the origin; the new epsilon and strategy
/// apply to the merged watch.
fn merge(id: TriggerId, existing: &Watch, new: Watch) -> Result<Watch> {
    match (existing, new) {
        (Watch::Links { frames: old }, Watch::Links { mut frames }) => {
            frames.extend(old.iter().copied());
            Ok(Watch::Links { frames })
        }
        (Watch::FrameData { frames: old }, Watch::FrameData { mut frames }) => {
            frames.extend(old.iter().copied());
            Ok(Watch::FrameData { frames })
        }
        (Watch::LinkData { links: old }, Watch::LinkData { mut links }) => {
            links.extend(old.iter().copied());
            Ok(Watch::LinkData { links })
        }
        (
            Watch::EstimatedTransforms {
                frames: old,
                origin: existing,
                ..
            },
            Watch::EstimatedTransforms {
                mut frames,
                origin,
                epsilon,
                strategy,
                baseline,
            },
        ) => {
            if *existing != origin {
                return Err(TriggerError::OriginMismatch {
                    trigger: id,
                    existing: *existing,
                    requested: origin,
                });
            }
            frames.extend(old.iter().copied());
            Ok(Watch::EstimatedTransforms {
                frames,
                origin,
                epsilon,
                strategy,
                baseline,
            })
        }
        _ => Err(TriggerError::KindMismatch(id)),
    }
}

fn require_frames(version: &GraphVersion, frames: &[FrameId]) -> Result<BTreeSet<FrameId>> {
    if frames.is_empty() {
        return Err(TriggerError::EmptyWatch);
    }
    match frames.iter().find(|f| !version.has_frame(**f)) {
        Some(missing) => Err(TriggerError::FrameNotFound(*missing)),
        None => Ok(frames.iter().copied().collect()),
    }
}

fn require_links(version: &GraphVersion, links: &[LinkId]) -> Result<BTreeSet<LinkId>> {
    if links.is_empty() {
        return Err(TriggerError::EmptyWatch);
    }
    match links.iter().find(|l| !version.has_link(**l)) {
        Some(missing) => Err(TriggerError::LinkNotFound(*missing)),
        None => Ok(links.iter().copied().collect()),
    }
}
