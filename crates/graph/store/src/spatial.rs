//! Link and frame queries against one graph version.
//!
//! Every query is a pure function of the version and the filters. Label
//! filtering runs before time filtering, and time filtering reduces links
//! per unordered frame pair (see [`TimeFilter::apply`]).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use framegraph_types::{select_links, FrameId, LabelFilter, Link, LinkId, TimeFilter};

use crate::version::GraphVersion;

/// Read-only query view over a [`GraphVersion`].
#[derive(Clone, Copy)]
pub struct SpatialIndex<'a> {
    version: &'a GraphVersion,
}

/// The links that survive a filter pair, with an undirected adjacency.
struct FilteredGraph<'a> {
    links: Vec<&'a Link>,
    neighbours: BTreeMap<FrameId, Vec<(FrameId, LinkId)>>,
}

impl<'a> FilteredGraph<'a> {
    fn build(links: Vec<&'a Link>) -> Self {
        let mut neighbours: BTreeMap<FrameId, Vec<(FrameId, LinkId)>> = BTreeMap::new();
        for link in &links {
            let (p, c) = (link.content.parent, link.content.child);
            neighbours.entry(p).or_default().push((c, link.id));
            neighbours.entry(c).or_default().push((p, link.id));
        }
        Self { links, neighbours }
    }

    /// Hop distance of every frame reachable from `seeds` in at most
    /// `max_hops` links. Seeds are at distance zero.
    fn reach(&self, seeds: &BTreeSet<FrameId>, max_hops: Option<usize>) -> BTreeMap<FrameId, usize> {
        let mut dist: BTreeMap<FrameId, usize> = seeds.iter().map(|f| (*f, 0)).collect();
        let mut queue: VecDeque<FrameId> = seeds.iter().copied().collect();

        while let Some(frame) = queue.pop_front() {
            let d = dist[&frame];
            if max_hops.map_or(false, |max| d >= max) {
                continue;
            }
            for (next, _) in self.neighbours.get(&frame).into_iter().flatten() {
                if !dist.contains_key(next) {
                    dist.insert(*next, d + 1);
                    queue.push_back(*next);
                }
            }
        }
        dist
    }

    /// Links with both endpoints in `frames`, sorted by id.
    fn induced(&self, frames: &BTreeMap<FrameId, usize>) -> Vec<&'a Link> {
        self.links
            .iter()
            .copied()
            .filter(|l| frames.contains_key(&l.content.parent) && frames.contains_key(&l.content.child))
            .collect()
    }
}

impl<'a> SpatialIndex<'a> {
    pub fn new(version: &'a GraphVersion) -> Self {
        Self { version }
    }

    /// Every link in the version that passes the filters, sorted by id.
    pub fn filtered_links(
        &self,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
    ) -> Vec<&'a Link> {
        select_links(self.version.links(), time, label)
    }

    /// Ids of links with both endpoints in `frames`; with `return_foreign`,
    /// also links with exactly one endpoint in `frames`.
    pub fn get_links(
        &self,
        frames: &[FrameId],
        return_foreign: bool,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
    ) -> Vec<LinkId> {
        let set: BTreeSet<FrameId> = frames.iter().copied().collect();
        let mut candidates: BTreeMap<LinkId, &'a Link> = BTreeMap::new();
        for frame in &set {
            for link in self.version.links_of(*frame) {
                let inside = set.contains(&link.content.parent) as u8 + set.contains(&link.content.child) as u8;
                if inside == 2 || (return_foreign && inside == 1) {
                    candidates.insert(link.id, link);
                }
            }
        }
        select_links(candidates.into_values(), time, label)
            .into_iter()
            .map(|l| l.id)
            .collect()
    }

    /// Frames outside `frames` reachable through at most `max_hops` filtered
    /// links, ignoring link direction. Sorted by id.
    pub fn get_neighbour_frames(
        &self,
        frames: &[FrameId],
        max_hops: usize,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
    ) -> Vec<FrameId> {
        let seeds: BTreeSet<FrameId> = frames.iter().copied().collect();
        let graph = FilteredGraph::build(self.filtered_links(time, label));
        graph
            .reach(&seeds, Some(max_hops))
            .into_keys()
            .filter(|f| !seeds.contains(f))
            .collect()
    }

    /// Filtered links of the connected component containing `origin`.
    pub fn component_links(
        &self,
        origin: FrameId,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
    ) -> Vec<&'a Link> {
        let graph = FilteredGraph::build(self.filtered_links(time, label));
        let reached = graph.reach(&BTreeSet::from([origin]), None);
        graph.induced(&reached)
    }

    /// Frames within `max_hops` filtered links of `origin` (origin
    /// included) and the filtered links among them.
    pub fn neighbourhood(
        &self,
        origin: FrameId,
        max_hops: usize,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
    ) -> (Vec<FrameId>, Vec<&'a Link>) {
        let graph = FilteredGraph::build(self.filtered_links(time, label));
        let reached = graph.reach(&BTreeSet::from([origin]), Some(max_hops));
        let links = graph.induced(&reached);
        (reached.into_keys().collect(), links)
    }
}
