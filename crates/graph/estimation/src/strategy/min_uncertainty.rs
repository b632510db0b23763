use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use framegraph_types::{EstimatedFrameSet, FrameId, Link, LinkId, Transform};

use super::{adjacency, assemble, traverse, RelaxationStrategy};

/// Shortest-path relaxation: every frame takes its pose along the path from
/// the origin with the least accumulated uncertainty.
///
/// Edge cost is `(trace(Σ) + 1e-9) / max(confidence, 1e-6)`, so exact
/// links still cost something and doubtful links cost a lot. Equal-cost
/// paths are settled in frame id order and prefer the lower predecessor
/// frame, then the lower link id.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinUncertainty;

impl MinUncertainty {
    pub const NAME: &'static str = "min_uncertainty";
}

fn edge_cost(link: &Link) -> f64 {
    (link.content.transformation.covariance.trace() + 1e-9) / link.content.confidence.max(1e-6)
}

/// Heap entry ordered so that `BinaryHeap` pops the lowest cost, then the
/// lowest frame id.
#[derive(Debug, PartialEq)]
struct Candidate {
    cost: f64,
    frame: FrameId,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.frame.cmp(&self.frame))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Best known way to reach a frame.
#[derive(Clone, Copy)]
struct Route<'a> {
    cost: f64,
    via: Option<(FrameId, &'a Link)>,
}

impl Route<'_> {
    /// Whether arriving at `cost` from `from` over `link` beats this route.
    fn is_beaten_by(&self, cost: f64, from: FrameId, link: LinkId) -> bool {
        if cost != self.cost {
            return cost < self.cost;
        }
        match self.via {
            Some((prev, current)) => (from, link) < (prev, current.id),
            None => false,
        }
    }
}

impl RelaxationStrategy for MinUncertainty {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn relax(&self, links: &[&Link], origin: FrameId) -> EstimatedFrameSet {
        let adj = adjacency(links);
        let mut routes: BTreeMap<FrameId, Route<'_>> = BTreeMap::new();
        let mut poses: BTreeMap<FrameId, Transform> = BTreeMap::new();
        let mut used: Vec<&Link> = Vec::new();
        let mut heap = BinaryHeap::new();

        routes.insert(origin, Route { cost: 0.0, via: None });
        heap.push(Candidate { cost: 0.0, frame: origin });

        while let Some(Candidate { cost, frame }) = heap.pop() {
            if poses.contains_key(&frame) {
                continue;
            }
            let Some(route) = routes.get(&frame).copied() else {
                continue;
            };
            if cost > route.cost {
                continue;
            }

            let pose = match route.via {
                None => Transform::identity(),
                Some((prev, link)) => {
                    let Some((_, step)) = traverse(link, prev) else {
                        continue;
                    };
                    let Some(base) = poses.get(&prev) else {
                        continue;
                    };
                    used.push(link);
                    base.compose(&step)
                }
            };
            poses.insert(frame, pose);

            for &link in adj.get(&frame).into_iter().flatten() {
                let Some((next, _)) = traverse(link, frame) else {
                    continue;
                };
                if poses.contains_key(&next) {
                    continue;
                }
                let next_cost = cost + edge_cost(link);
                let improves = routes
                    .get(&next)
                    .map_or(true, |r| r.is_beaten_by(next_cost, frame, link.id));
                if improves {
                    routes.insert(
                        next,
                        Route {
                            cost: next_cost,
                            via: Some((frame, link)),
                        },
                    );
                    heap.push(Candidate {
                        cost: next_cost,
                        frame: next,
                    });
                }
            }
        }

        assemble(origin, poses, &used)
    }
}
