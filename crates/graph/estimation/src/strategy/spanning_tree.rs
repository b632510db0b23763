use std::collections::{BTreeMap, VecDeque};

use framegraph_types::{EstimatedFrameSet, FrameId, Link, Transform};

use super::{adjacency, assemble, traverse, RelaxationStrategy};

/// Breadth-first spanning tree from the origin. Each frame is reached over
/// the fewest links; among the links leaving a frame, higher confidence
/// wins, then the lower link id. Covariances are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpanningTree;

impl SpanningTree {
    pub const NAME: &'static str = "spanning_tree";
}

impl RelaxationStrategy for SpanningTree {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn relax(&self, links: &[&Link], origin: FrameId) -> EstimatedFrameSet {
        let adj = adjacency(links);
        let mut poses: BTreeMap<FrameId, Transform> = BTreeMap::new();
        let mut used: Vec<&Link> = Vec::new();
        let mut queue = VecDeque::from([origin]);
        poses.insert(origin, Transform::identity());

        while let Some(frame) = queue.pop_front() {
            let Some(base) = poses.get(&frame).copied() else {
                continue;
            };
            let mut outgoing: Vec<&Link> = adj.get(&frame).cloned().unwrap_or_default();
            outgoing.sort_by(|a, b| {
                b.content
                    .confidence
                    .total_cmp(&a.content.confidence)
                    .then_with(|| a.id.cmp(&b.id))
            });

            for link in outgoing {
                let Some((next, step)) = traverse(link, frame) else {
                    continue;
                };
                if poses.contains_key(&next) {
                    continue;
                }
                poses.insert(next, base.compose(&step));
                used.push(link);
                queue.push_back(next);
            }
        }

        assemble(origin, poses, &used)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::strategy::fixtures::link;

    #[test]
    fn fewest_hops_win_over_precision() {
        let direct = link(1, 1, 3, Transform::from_translation(5.0, 0.0, 0.0), 1.0, 1.0);
        let a = link(2, 1, 2, Transform::from_translation(1.0, 0.0, 0.0), 0.0, 1.0);
        let b = link(3, 2, 3, Transform::from_translation(1.0, 0.0, 0.0), 0.0, 1.0);
        let set = SpanningTree.relax(&[&direct, &a, &b], FrameId(1));
        assert_relative_eq!(set.get(FrameId(3)).unwrap().translation().x, 5.0, epsilon = 1e-12);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn parallel_links_prefer_confidence_then_id() {
        let weak = link(1, 1, 2, Transform::from_translation(1.0, 0.0, 0.0), 0.0, 0.4);
        let strong = link(5, 1, 2, Transform::from_translation(2.0, 0.0, 0.0), 0.0, 0.9);
        let twin = link(3, 2, 1, Transform::from_translation(-3.0, 0.0, 0.0), 0.0, 0.9);
        let set = SpanningTree.relax(&[&weak, &strong, &twin], FrameId(1));
        // `twin` ties with `strong` on confidence and has the lower id
        assert_relative_eq!(set.get(FrameId(2)).unwrap().translation().x, 3.0, epsilon = 1e-12);
        assert_eq!(set.time.map(|t| (t.start.sec, t.end.sec)), Some((3, 3)));
    }

    #[test]
    fn chains_compose_rotations() {
        let turn = Transform::from_xyz_rpy(1.0, 0.0, 0.0, 0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let a = link(1, 1, 2, turn, 0.0, 1.0);
        let b = link(2, 2, 3, Transform::from_translation(1.0, 0.0, 0.0), 0.0, 1.0);
        let set = SpanningTree.relax(&[&a, &b], FrameId(1));
        let p = set.get(FrameId(3)).unwrap().translation();
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
    }
}
