use std::collections::{BTreeMap, BTreeSet};

use framegraph_types::{DataMap, DataType, FrameId, LinkId};
use serde::{Deserialize, Serialize};

use crate::version::GraphVersion;

/// What a commit changed, relative to the head it was installed on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitDiff {
    /// Version number produced by the commit
    pub version: u64,
    pub frames_added: BTreeSet<FrameId>,
    pub frames_removed: BTreeSet<FrameId>,
    pub links_added: BTreeSet<LinkId>,
    pub links_removed: BTreeSet<LinkId>,
    /// Links whose content was replaced in place
    pub links_changed: BTreeSet<LinkId>,
    /// Per data type, frames whose value of that type was set or removed
    pub frame_data_changed: BTreeMap<DataType, BTreeSet<FrameId>>,
    /// Per data type, links whose value of that type was set or removed
    pub link_data_changed: BTreeMap<DataType, BTreeSet<LinkId>>,
    /// Endpoints, before and after, of every added, removed or changed link
    pub link_frames: BTreeMap<LinkId, BTreeSet<FrameId>>,
}

impl CommitDiff {
    pub fn is_empty(&self) -> bool {
        self.frames_added.is_empty()
            && self.frames_removed.is_empty()
            && self.links_added.is_empty()
            && self.links_removed.is_empty()
            && self.links_changed.is_empty()
            && self.frame_data_changed.is_empty()
            && self.link_data_changed.is_empty()
    }

    /// Whether any link appeared, disappeared or changed content.
    pub fn touches_links(&self) -> bool {
        !(self.links_added.is_empty() && self.links_removed.is_empty() && self.links_changed.is_empty())
    }

    /// Links touching any of `frames`: added or changed ones first, removed
    /// ones second. Both sorted by id.
    pub fn links_touching(&self, frames: &BTreeSet<FrameId>) -> (Vec<LinkId>, Vec<LinkId>) {
        let touches = |id: &LinkId| {
            self.link_frames
                .get(id)
                .is_some_and(|ends| !ends.is_disjoint(frames))
        };
        let added: BTreeSet<LinkId> = self
            .links_added
            .iter()
            .chain(&self.links_changed)
            .filter(|id| touches(*id))
            .copied()
            .collect();
        let removed = self.links_removed.iter().filter(|id| touches(*id)).copied().collect();
        (added.into_iter().collect(), removed)
    }

    pub(crate) fn record_frame(&mut self, id: FrameId, before: &GraphVersion, after: &GraphVersion) {
        match (before.frame(id), after.frame(id)) {
            (None, Some(f)) => {
                self.frames_added.insert(id);
                for ty in changed_types(&DataMap::new(), &f.data) {
                    self.frame_data_changed.entry(ty).or_default().insert(id);
                }
            }
            (Some(f), None) => {
                self.frames_removed.insert(id);
                for ty in changed_types(&f.data, &DataMap::new()) {
                    self.frame_data_changed.entry(ty).or_default().insert(id);
                }
            }
            (Some(old), Some(new)) => {
                for ty in changed_types(&old.data, &new.data) {
                    self.frame_data_changed.entry(ty).or_default().insert(id);
                }
            }
            (None, None) => {}
        }
    }

    pub(crate) fn record_link(&mut self, id: LinkId, before: &GraphVersion, after: &GraphVersion) {
        let (old, new) = (before.link(id), after.link(id));
        let changed = match (old, new) {
            (Some(o), Some(n)) => o.content != n.content,
            (None, None) => false,
            _ => true,
        };
        if changed {
            let ends = self.link_frames.entry(id).or_default();
            for link in old.into_iter().chain(new) {
                ends.insert(link.content.parent);
                ends.insert(link.content.child);
            }
        }
        match (old, new) {
            (None, Some(l)) => {
                self.links_added.insert(id);
                for ty in changed_types(&DataMap::new(), &l.data) {
                    self.link_data_changed.entry(ty).or_default().insert(id);
                }
            }
            (Some(l), None) => {
                self.links_removed.insert(id);
                for ty in changed_types(&l.data, &DataMap::new()) {
                    self.link_data_changed.entry(ty).or_default().insert(id);
                }
            }
            (Some(old), Some(new)) => {
                if old.content != new.content {
                    self.links_changed.insert(id);
                }
                for ty in changed_types(&old.data, &new.data) {
                    self.link_data_changed.entry(ty).or_default().insert(id);
                }
            }
            (None, None) => {}
        }
    }
}

/// Types whose value differs between the two maps (added, removed or
/// overwritten with different bytes).
fn changed_types(old: &DataMap, new: &DataMap) -> Vec<DataType> {
    let mut changed: BTreeSet<&DataType> = BTreeSet::new();
    for (ty, blob) in old {
        if new.get(ty) != Some(blob) {
            changed.insert(ty);
        }
    }
    for (ty, blob) in new {
        if old.get(ty) != Some(blob) {
            changed.insert(ty);
        }
    }
    changed.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use framegraph_types::DataBlob;

    #[test]
    fn changed_types_detects_all_kinds() {
        let mut old = DataMap::new();
        old.insert("keep".into(), DataBlob::from("x"));
        old.insert("edit".into(), DataBlob::from("1"));
        old.insert("drop".into(), DataBlob::from("z"));

        let mut new = DataMap::new();
        new.insert("keep".into(), DataBlob::from("x"));
        new.insert("edit".into(), DataBlob::from("2"));
        new.insert("add".into(), DataBlob::from("y"));

        let names: Vec<String> = changed_types(&old, &new).into_iter().map(|t| t.0).collect();
        assert_eq!(names, vec!["add", "drop", "edit"]);
    }

    #[test]
    fn links_touching_uses_both_endpoint_sets() {
        let mut diff = CommitDiff::default();
        diff.links_added.insert(LinkId(1));
        diff.links_changed.insert(LinkId(2));
        diff.links_removed.insert(LinkId(3));
        diff.link_frames.insert(LinkId(1), BTreeSet::from([FrameId(1), FrameId(2)]));
        diff.link_frames.insert(LinkId(2), BTreeSet::from([FrameId(3), FrameId(4), FrameId(5)]));
        diff.link_frames.insert(LinkId(3), BTreeSet::from([FrameId(2), FrameId(5)]));

        let (added, removed) = diff.links_touching(&BTreeSet::from([FrameId(5)]));
        assert_eq!(added, vec![LinkId(2)]);
        assert_eq!(removed, vec![LinkId(3)]);

        let (added, removed) = diff.links_touching(&BTreeSet::from([FrameId(9)]));
        assert!(added.is_empty() && removed.is_empty());
    }

    #[test]
    fn empty_diff() {
        let diff = CommitDiff::default();
        assert!(diff.is_empty());
        assert!(!diff.touches_links());
    }
}
