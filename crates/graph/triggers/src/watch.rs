use std::collections::{BTreeMap, BTreeSet};

use framegraph_estimation::EstimationEngine;
use framegraph_store::{CommitDiff, GraphVersion};
use framegraph_types::{Epsilon, FrameId, LinkId, Transform};

use crate::types::{Notification, WatchKind};

/// A registered watch and its evaluation state.
#[derive(Clone, Debug, PartialEq)]
pub enum Watch {
    Links {
        frames: BTreeSet<FrameId>,
    },
    EstimatedTransforms {
        frames: BTreeSet<FrameId>,
        origin: FrameId,
        epsilon: Epsilon,
        strategy: String,
        /// Poses of the watched frames when the watch last fired (or was
        /// registered); absent frames were unreachable
        baseline: BTreeMap<FrameId, Transform>,
    },
    FrameData {
        frames: BTreeSet<FrameId>,
    },
    LinkData {
        links: BTreeSet<LinkId>,
    },
}

impl Watch {
    pub fn kind(&self) -> WatchKind {
        match self {
            Watch::Links { .. } => WatchKind::Links,
            Watch::EstimatedTransforms { .. } => WatchKind::EstimatedTransforms,
            Watch::FrameData { .. } => WatchKind::FrameData,
            Watch::LinkData { .. } => WatchKind::LinkData,
        }
    }

    /// Notifications this watch emits for `diff`, with `version` the state
    /// after the commit. Estimated watches update their baseline when
    /// they fire.
    pub fn evaluate(
        &mut self,
        diff: &CommitDiff,
        version: &GraphVersion,
        engine: &EstimationEngine,
    ) -> Vec<Notification> {
        match self {
            Watch::Links { frames } => {
                let (added, removed) = diff.links_touching(frames);
                if added.is_empty() && removed.is_empty() {
                    Vec::new()
                } else {
                    vec![Notification::LinksChanged { added, removed }]
                }
            }
            Watch::FrameData { frames } => diff
                .frame_data_changed
                .iter()
                .filter_map(|(data_type, changed)| {
                    let hit: Vec<FrameId> = changed.intersection(frames).copied().collect();
                    (!hit.is_empty()).then(|| Notification::FrameDataChanged {
                        frames: hit,
                        data_type: data_type.clone(),
                    })
                })
                .collect(),
            Watch::LinkData { links } => diff
                .link_data_changed
                .iter()
                .filter_map(|(data_type, changed)| {
                    let hit: Vec<LinkId> = changed.intersection(links).copied().collect();
                    (!hit.is_empty()).then(|| Notification::LinkDataChanged {
                        links: hit,
                        data_type: data_type.clone(),
                    })
                })
                .collect(),
            Watch::EstimatedTransforms {
                frames,
                origin,
                epsilon,
                strategy,
                baseline,
            } => {
                if !diff.touches_links() && diff.frames_removed.is_empty() {
                    return Vec::new();
                }
                let current = watched_poses(engine, version, *origin, strategy, frames);
                let moved = moved_frames(frames, baseline, &current, epsilon);
                if moved.is_empty() {
                    return Vec::new();
                }
                *baseline = current;
                vec![Notification::EstimatedFramesMoved {
                    frames: moved,
                    origin: *origin,
                }]
            }
        }
    }
}

/// Current poses of `frames` relative to `origin`, over every link
/// connected to the origin. A missing origin leaves nothing reachable.
pub(crate) fn watched_poses(
    engine: &EstimationEngine,
    version: &GraphVersion,
    origin: FrameId,
    strategy: &str,
    frames: &BTreeSet<FrameId>,
) -> BTreeMap<FrameId, Transform> {
    match engine.estimate_connected(version, origin, strategy) {
        Ok(set) => set
            .frames
            .into_iter()
            .filter(|(frame, _)| frames.contains(frame))
            .collect(),
        Err(_) => BTreeMap::new(),
    }
}

/// Watched frames whose pose moved past `epsilon` or whose reachability
/// changed between `before` and `after`.
fn moved_frames(
    frames: &BTreeSet<FrameId>,
    before: &BTreeMap<FrameId, Transform>,
    after: &BTreeMap<FrameId, Transform>,
    epsilon: &Epsilon,
) -> Vec<FrameId> {
    frames
        .iter()
        .copied()
        .filter(|frame| match (before.get(frame), after.get(frame)) {
            (Some(old), Some(new)) => epsilon.exceeded_by(&old.delta(new)),
            (None, None) => false,
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use framegraph_types::DataType;

    fn set(ids: &[u64]) -> BTreeSet<FrameId> {
        ids.iter().map(|i| FrameId(*i)).collect()
    }

    #[test]
    fn frame_data_watch_reports_per_type() {
        let mut diff = CommitDiff::default();
        diff.frame_data_changed
            .insert(DataType::from("mesh"), set(&[1, 2]));
        diff.frame_data_changed.insert(DataType::from("tag"), set(&[3]));

        let mut watch = Watch::FrameData { frames: set(&[2, 3]) };
        let out = watch.evaluate(&diff, &GraphVersion::genesis(), &EstimationEngine::new());
        assert_eq!(
            out,
            vec![
                Notification::FrameDataChanged {
                    frames: vec![FrameId(2)],
                    data_type: DataType::from("mesh"),
                },
                Notification::FrameDataChanged {
                    frames: vec![FrameId(3)],
                    data_type: DataType::from("tag"),
                },
            ]
        );
    }

    #[test]
    fn moved_frames_uses_epsilon_and_reachability() {
        let frames = set(&[1, 2, 3, 4]);
        let before = BTreeMap::from([
            (FrameId(1), Transform::from_translation(0.0, 0.0, 0.0)),
            (FrameId(2), Transform::from_translation(1.0, 0.0, 0.0)),
            (FrameId(3), Transform::identity()),
        ]);
        let after = BTreeMap::from([
            (FrameId(1), Transform::from_translation(0.01, 0.0, 0.0)),
            (FrameId(2), Transform::from_translation(2.0, 0.0, 0.0)),
            (FrameId(4), Transform::identity()),
        ]);
        let moved = moved_frames(&frames, &before, &after, &Epsilon::new(0.1, 0.1));
        assert_eq!(moved, vec![FrameId(2), FrameId(3), FrameId(4)]);
    }

    #[test]
    fn estimated_watch_ignores_data_only_commits() {
        let mut diff = CommitDiff::default();
        diff.frame_data_changed.insert(DataType::from("mesh"), set(&[1]));
        let mut watch = Watch::EstimatedTransforms {
            frames: set(&[1]),
            origin: FrameId(1),
            epsilon: Epsilon::new(0.0, 0.0),
            strategy: String::new(),
            baseline: BTreeMap::new(),
        };
        assert!(watch
            .evaluate(&diff, &GraphVersion::genesis(), &EstimationEngine::new())
            .is_empty());
        assert_eq!(watch.kind(), WatchKind::EstimatedTransforms);
    }
}
