use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use framegraph_types::{DataMap, Frame, FrameId, Link, LinkId};

use crate::names::NameRegistry;

/// One immutable state of the graph.
///
/// Committed versions are never modified; a transaction that writes works
/// on a private clone (its draft). Entity records are shared between
/// versions through `Arc` and copied on first write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphVersion {
    number: u64,
    frames: HashMap<FrameId, Arc<Frame>>,
    links: HashMap<LinkId, Arc<Link>>,
    /// Links touching each frame, regardless of direction
    adjacency: HashMap<FrameId, BTreeSet<LinkId>>,
    names: NameRegistry,
}

impl GraphVersion {
    /// The empty genesis version.
    pub fn genesis() -> Self {
        Self::default()
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id).map(Arc::as_ref)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id).map(Arc::as_ref)
    }

    pub fn has_frame(&self, id: FrameId) -> bool {
        self.frames.contains_key(&id)
    }

    pub fn has_link(&self, id: LinkId) -> bool {
        self.links.contains_key(&id)
    }

    pub fn frame_ids(&self) -> Vec<FrameId> {
        let mut ids: Vec<FrameId> = self.frames.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values().map(Arc::as_ref)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Ids of links touching `frame`, ascending.
    pub fn link_ids_of(&self, frame: FrameId) -> impl Iterator<Item = LinkId> + '_ {
        self.adjacency
            .get(&frame)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn links_of(&self, frame: FrameId) -> impl Iterator<Item = &Link> + '_ {
        self.link_ids_of(frame).filter_map(move |id| self.link(id))
    }

    pub fn names(&self) -> &NameRegistry {
        &self.names
    }

    pub(crate) fn names_mut(&mut self) -> &mut NameRegistry {
        &mut self.names
    }

    pub(crate) fn set_number(&mut self, number: u64) {
        self.number = number;
    }

    pub(crate) fn frame_data_mut(&mut self, id: FrameId) -> Option<&mut DataMap> {
        self.frames.get_mut(&id).map(|f| &mut Arc::make_mut(f).data)
    }

    pub(crate) fn link_data_mut(&mut self, id: LinkId) -> Option<&mut DataMap> {
        self.links.get_mut(&id).map(|l| &mut Arc::make_mut(l).data)
    }

    pub(crate) fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(&id).map(Arc::make_mut)
    }

    /// Install or tombstone a frame record. Adjacency of a removed frame is
    /// dropped; its links must be removed separately.
    pub(crate) fn put_frame(&mut self, id: FrameId, frame: Option<Arc<Frame>>) {
        match frame {
            Some(f) => {
                self.frames.insert(id, f);
            }
            None => {
                self.frames.remove(&id);
                self.adjacency.remove(&id);
            }
        }
    }

    /// Install or tombstone a link record, keeping adjacency in step.
    pub(crate) fn put_link(&mut self, id: LinkId, link: Option<Arc<Link>>) {
        if let Some(old) = self.links.remove(&id) {
            self.detach(id, old.content.parent);
            self.detach(id, old.content.child);
        }
        if let Some(new) = link {
            let (parent, child) = (new.content.parent, new.content.child);
            self.links.insert(id, new);
            self.adjacency.entry(parent).or_default().insert(id);
            self.adjacency.entry(child).or_default().insert(id);
        }
    }

    pub(crate) fn frame_arc(&self, id: FrameId) -> Option<Arc<Frame>> {
        self.frames.get(&id).cloned()
    }

    pub(crate) fn link_arc(&self, id: LinkId) -> Option<Arc<Link>> {
        self.links.get(&id).cloned()
    }

    fn detach(&mut self, link: LinkId, frame: FrameId) {
        if let Some(set) = self.adjacency.get_mut(&frame) {
            set.remove(&link);
            if set.is_empty() {
                self.adjacency.remove(&frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framegraph_types::{LinkContent, Transform};

    fn link(id: u64, parent: u64, child: u64) -> Arc<Link> {
        Arc::new(Link {
            id: LinkId(id),
            content: LinkContent::new(FrameId(parent), FrameId(child), Transform::identity()),
            data: DataMap::new(),
        })
    }

    #[test]
    fn adjacency_follows_links() {
        let mut v = GraphVersion::genesis();
        v.put_frame(FrameId(1), Some(Arc::new(Frame::new(FrameId(1)))));
        v.put_frame(FrameId(2), Some(Arc::new(Frame::new(FrameId(2)))));
        v.put_link(LinkId(10), Some(link(10, 1, 2)));

        assert_eq!(v.link_ids_of(FrameId(1)).collect::<Vec<_>>(), vec![LinkId(10)]);
        assert_eq!(v.link_ids_of(FrameId(2)).collect::<Vec<_>>(), vec![LinkId(10)]);

        // Re-pointing the link moves adjacency
        v.put_link(LinkId(10), Some(link(10, 1, 3)));
        assert_eq!(v.link_ids_of(FrameId(2)).count(), 0);
        assert_eq!(v.link_ids_of(FrameId(3)).count(), 1);

        v.put_link(LinkId(10), None);
        assert_eq!(v.link_ids_of(FrameId(1)).count(), 0);
        assert!(!v.has_link(LinkId(10)));
    }

    #[test]
    fn clones_share_records_until_written() {
        let mut v = GraphVersion::genesis();
        v.put_frame(FrameId(1), Some(Arc::new(Frame::new(FrameId(1)))));
        let mut draft = v.clone();

        let data = draft.frame_data_mut(FrameId(1)).unwrap();
        data.insert("k".into(), "v".into());

        assert!(v.frame(FrameId(1)).unwrap().data.is_empty());
        assert_eq!(draft.frame(FrameId(1)).unwrap().data.len(), 1);
    }
}
