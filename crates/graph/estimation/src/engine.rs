use framegraph_store::{GraphVersion, SpatialIndex, StoreError};
use framegraph_types::{
    BoundingBox, EstimatedFrameSet, FrameId, LabelFilter, Link, LinkId, Sphere, TimeFilter,
    Transform,
};
use tracing::debug;

use crate::error::{EstimationError, Result};
use crate::select::Region;
use crate::strategy::StrategyRegistry;

/// Turns selected sub-graphs of a graph version into pose estimates.
///
/// The engine is stateless apart from its strategy registry: every call is
/// a pure function of the version, the selection arguments and the
/// strategy. Callers pick the version (a transaction view or the head).
pub struct EstimationEngine {
    registry: StrategyRegistry,
}

impl EstimationEngine {
    pub fn new() -> Self {
        Self::with_registry(StrategyRegistry::new())
    }

    pub fn with_registry(registry: StrategyRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.registry
    }

    /// Relax exactly the given links.
    pub fn estimate_frames(
        &self,
        version: &GraphVersion,
        links: &[LinkId],
        origin: FrameId,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        require_origin(version, origin)?;
        let selected = links
            .iter()
            .map(|id| version.link(*id).ok_or(StoreError::LinkNotFound(*id)))
            .collect::<std::result::Result<Vec<&Link>, _>>()?;
        Ok(self.relax(&selected, origin, strategy))
    }

    /// Frames whose estimated position relative to `origin` lies in `bbox`.
    pub fn estimate_frames_within_box(
        &self,
        version: &GraphVersion,
        origin: FrameId,
        bbox: &BoundingBox,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        self.estimate_within(version, origin, Region::Box(*bbox), time, label, strategy)
    }

    /// Frames whose estimated position relative to `origin` lies in `sphere`.
    pub fn estimate_frames_within_sphere(
        &self,
        version: &GraphVersion,
        origin: FrameId,
        sphere: &Sphere,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        self.estimate_within(version, origin, Region::Sphere(*sphere), time, label, strategy)
    }

    /// Frames within `max_link_count` filtered links of `origin`, relaxed
    /// over the filtered links among them.
    pub fn estimate_neighboring_frames(
        &self,
        version: &GraphVersion,
        origin: FrameId,
        max_link_count: usize,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        require_origin(version, origin)?;
        let (_, links) = SpatialIndex::new(version).neighbourhood(origin, max_link_count, time, label);
        Ok(self.relax(&links, origin, strategy))
    }

    /// Every frame connected to `origin`, over all links of the version.
    pub fn estimate_connected(
        &self,
        version: &GraphVersion,
        origin: FrameId,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        require_origin(version, origin)?;
        let links = SpatialIndex::new(version).component_links(origin, None, None);
        Ok(self.relax(&links, origin, strategy))
    }

    /// Relax the filtered component of `origin`, then keep the origin and
    /// the frames inside `region`. Frames outside still carry connectivity.
    fn estimate_within(
        &self,
        version: &GraphVersion,
        origin: FrameId,
        region: Region,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
        strategy: &str,
    ) -> Result<EstimatedFrameSet> {
        require_origin(version, origin)?;
        let links = SpatialIndex::new(version).component_links(origin, time, label);
        let mut set = self.relax(&links, origin, strategy);
        set.frames
            .retain(|(frame, pose)| *frame == origin || region.contains(pose));
        debug!(origin = %origin, kept = set.frames.len(), ?region, "Spatial selection applied");
        Ok(set)
    }

    fn relax(&self, links: &[&Link], origin: FrameId, strategy: &str) -> EstimatedFrameSet {
        let strategy = self.registry.resolve(strategy);
        let set = normalise(strategy.relax(links, origin), origin);
        debug!(
            strategy = strategy.name(),
            origin = %origin,
            links = links.len(),
            frames = set.frames.len(),
            "Relaxation complete"
        );
        set
    }
}

impl Default for EstimationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn require_origin(version: &GraphVersion, origin: FrameId) -> Result<()> {
    if version.has_frame(origin) {
        Ok(())
    } else {
        Err(EstimationError::OriginNotFound(origin))
    }
}

/// Sort by frame id, drop duplicates and pin the origin at identity, so
/// custom strategies cannot break the output contract.
fn normalise(mut set: EstimatedFrameSet, origin: FrameId) -> EstimatedFrameSet {
    set.origin = origin;
    set.frames.sort_by_key(|(frame, _)| *frame);
    set.frames.dedup_by_key(|(frame, _)| *frame);
    match set.frames.binary_search_by_key(&origin, |(frame, _)| *frame) {
        Ok(idx) => set.frames[idx].1 = Transform::identity(),
        Err(idx) => set.frames.insert(idx, (origin, Transform::identity())),
    }
    set
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use framegraph_store::GraphStore;
    use framegraph_types::{LinkContent, TimeStamp};

    use super::*;
    use crate::strategy::RelaxationStrategy;

    /// Line of frames along x: 1 -(1m)- 2 -(1m)- 3 -(1m)- 4, plus an
    /// island frame 5. Links are stamped 1, 2, 3 and labelled "odom",
    /// except 3 -> 4 which is "gps".
    fn line() -> (Arc<GraphStore>, Vec<FrameId>, Vec<LinkId>) {
        let store = Arc::new(GraphStore::new());
        let tx = store.start_transaction();
        let frames: Vec<FrameId> = (0..5).map(|_| store.create_frame(tx, None).unwrap()).collect();
        let mut links = Vec::new();
        for i in 0..3 {
            let content = LinkContent::new(frames[i], frames[i + 1], Transform::from_translation(1.0, 0.0, 0.0))
                .with_label(if i == 2 { "gps" } else { "odom" })
                .with_time(TimeStamp::from_secs(i as i64 + 1));
            links.push(store.set_link(tx, content, None).unwrap());
        }
        store.commit_transaction(tx).unwrap();
        (store, frames, links)
    }

    #[test]
    fn committed_link_estimates_to_its_transform() {
        let (store, frames, links) = line();
        let engine = EstimationEngine::new();
        let set = engine
            .estimate_frames(&store.head(), &links[..1], frames[0], "")
            .unwrap();
        assert_eq!(set.get(frames[0]), Some(&Transform::identity()));
        assert_relative_eq!(set.get(frames[1]).unwrap().translation().x, 1.0, epsilon = 1e-12);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn request_local_errors() {
        let (store, frames, _) = line();
        let engine = EstimationEngine::new();
        let head = store.head();
        assert_eq!(
            engine.estimate_frames(&head, &[LinkId(99)], frames[0], ""),
            Err(EstimationError::Store(StoreError::LinkNotFound(LinkId(99))))
        );
        assert_eq!(
            engine.estimate_frames(&head, &[], FrameId(99), ""),
            Err(EstimationError::OriginNotFound(FrameId(99)))
        );
    }

    #[test]
    fn box_keeps_frames_inside_but_uses_outer_links() {
        let (store, frames, _) = line();
        let engine = EstimationEngine::new();
        // Only frames 1 and 4 (x = 0 and x = 3) fall inside
        let bbox = BoundingBox::from_corners([2.5, -1.0, -1.0], [3.5, 1.0, 1.0]);
        let set = engine
            .estimate_frames_within_box(&store.head(), frames[0], &bbox, None, None, "spanning_tree")
            .unwrap();
        assert_eq!(set.frame_ids().collect::<Vec<_>>(), vec![frames[0], frames[3]]);
        assert_relative_eq!(set.get(frames[3]).unwrap().translation().x, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn sphere_with_label_filter() {
        let (store, frames, _) = line();
        let engine = EstimationEngine::new();
        let sphere = Sphere::new([0.0, 0.0, 0.0], 10.0);
        let odom = LabelFilter::include(["odom"]);
        let set = engine
            .estimate_frames_within_sphere(&store.head(), frames[0], &sphere, None, Some(&odom), "")
            .unwrap();
        assert_eq!(set.frame_ids().collect::<Vec<_>>(), vec![frames[0], frames[1], frames[2]]);
        assert_eq!(set.time.map(|t| (t.start.sec, t.end.sec)), Some((1, 2)));
    }

    #[test]
    fn neighbourhood_limited_by_hops() {
        let (store, frames, _) = line();
        let engine = EstimationEngine::new();
        let set = engine
            .estimate_neighboring_frames(&store.head(), frames[1], 1, None, None, "")
            .unwrap();
        assert_eq!(set.frame_ids().collect::<Vec<_>>(), vec![frames[0], frames[1], frames[2]]);
        assert_relative_eq!(set.get(frames[0]).unwrap().translation().x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn connected_component_skips_islands() {
        let (store, frames, _) = line();
        let engine = EstimationEngine::new();
        let set = engine.estimate_connected(&store.head(), frames[0], "").unwrap();
        assert_eq!(set.len(), 4);
        assert!(!set.contains(frames[4]));
    }

    #[test]
    fn custom_strategy_output_is_normalised() {
        struct Sloppy;
        impl RelaxationStrategy for Sloppy {
            fn name(&self) -> &str {
                "sloppy"
            }
            fn relax(&self, _links: &[&Link], origin: FrameId) -> EstimatedFrameSet {
                EstimatedFrameSet {
                    origin,
                    time: None,
                    frames: vec![
                        (FrameId(9), Transform::identity()),
                        (FrameId(3), Transform::identity()),
                        (FrameId(9), Transform::identity()),
                    ],
                }
            }
        }

        let (store, frames, _) = line();
        let engine = EstimationEngine::new();
        engine.registry().register(Arc::new(Sloppy));
        let set = engine.estimate_frames(&store.head(), &[], frames[0], "sloppy").unwrap();
        let ids: Vec<FrameId> = set.frame_ids().collect();
        let mut expected = vec![frames[0], FrameId(3), FrameId(9)];
        expected.sort();
        expected.dedup();
        assert_eq!(ids, expected);
    }
}
