//! Relaxation strategies and their registry.
//!
//! A strategy turns a set of uncertain links into one deterministic pose
//! per frame reachable from the origin. Strategies are looked up by name;
//! an unknown or empty name resolves to the registry default.

mod min_uncertainty;
mod spanning_tree;

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use framegraph_types::{EstimatedFrameSet, FrameId, Link, TimeInterval, Transform};
use tracing::debug;

pub use min_uncertainty::MinUncertainty;
pub use spanning_tree::SpanningTree;

/// Key of the strategy used when none (or an unknown one) is requested.
pub const DEFAULT_STRATEGY: &str = MinUncertainty::NAME;

/// Graph relaxation: links in, poses relative to `origin` out.
///
/// Implementations must be deterministic for a given input. Frames not
/// reachable from `origin` through `links` are omitted; the origin is
/// always present at identity.
pub trait RelaxationStrategy: Send + Sync {
    /// Registry key.
    fn name(&self) -> &str;

    fn relax(&self, links: &[&Link], origin: FrameId) -> EstimatedFrameSet;
}

/// Strategies by name, with a fallback default.
pub struct StrategyRegistry {
    strategies: DashMap<String, Arc<dyn RelaxationStrategy>>,
    default: Arc<dyn RelaxationStrategy>,
}

impl StrategyRegistry {
    /// Registry holding the built-in strategies, defaulting to
    /// [`DEFAULT_STRATEGY`].
    pub fn new() -> Self {
        let default: Arc<dyn RelaxationStrategy> = Arc::new(MinUncertainty);
        let registry = Self {
            strategies: DashMap::new(),
            default: Arc::clone(&default),
        };
        registry.register(default);
        registry.register(Arc::new(SpanningTree));
        registry
    }

    /// Register (or replace) a strategy under its own name.
    pub fn register(&self, strategy: Arc<dyn RelaxationStrategy>) {
        debug!(strategy = strategy.name(), "Relaxation strategy registered");
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    /// Make the strategy registered as `key` the default. Returns `false`
    /// and keeps the current default when `key` is unknown.
    pub fn set_default(&mut self, key: &str) -> bool {
        match self.strategies.get(key) {
            Some(found) => {
                self.default = Arc::clone(found.value());
                true
            }
            None => false,
        }
    }

    pub fn default_name(&self) -> &str {
        self.default.name()
    }

    /// The strategy registered as `key`, or the default.
    pub fn resolve(&self, key: &str) -> Arc<dyn RelaxationStrategy> {
        match self.strategies.get(key) {
            Some(found) => Arc::clone(found.value()),
            None => {
                if !key.is_empty() {
                    debug!(requested = key, fallback = self.default.name(), "Unknown strategy");
                }
                Arc::clone(&self.default)
            }
        }
    }

    /// Registered keys, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Undirected adjacency over a link slice: frame -> links touching it,
/// ordered by link id.
pub(crate) fn adjacency<'a>(links: &[&'a Link]) -> BTreeMap<FrameId, Vec<&'a Link>> {
    let mut adj: BTreeMap<FrameId, Vec<&'a Link>> = BTreeMap::new();
    for &link in links {
        adj.entry(link.content.parent).or_default().push(link);
        adj.entry(link.content.child).or_default().push(link);
    }
    for list in adj.values_mut() {
        list.sort_by_key(|l| l.id);
    }
    adj
}

/// Frame reached by traversing `link` from `from`, and the pose of that
/// frame relative to `from`.
pub(crate) fn traverse(link: &Link, from: FrameId) -> Option<(FrameId, Transform)> {
    let t = link.content.transformation.transform;
    if link.content.parent == from {
        Some((link.content.child, t))
    } else if link.content.child == from {
        Some((link.content.parent, t.inverse()))
    } else {
        None
    }
}

/// Assemble the output of a tree walk: poses sorted by frame and the time
/// span of the tree links.
pub(crate) fn assemble(
    origin: FrameId,
    poses: BTreeMap<FrameId, Transform>,
    used: &[&Link],
) -> EstimatedFrameSet {
    EstimatedFrameSet {
        origin,
        time: TimeInterval::spanning(used.iter().map(|l| l.content.time)),
        frames: poses.into_iter().collect(),
    }
}
