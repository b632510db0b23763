use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use framegraph_types::{FrameId, LinkId};

use crate::version::GraphVersion;

/// Unit of conflict detection. Data writes count as writes to their owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Frame(FrameId),
    Link(LinkId),
    Name(String),
}

/// Keys written by the commit that produced a version.
#[derive(Clone, Debug, Default)]
pub struct CommitRecord {
    pub keys: HashSet<EntityKey>,
}

/// Arena of immutable versions indexed by version number.
///
/// Transactions refer to their snapshot by number. The arena keeps the head
/// plus every version still pinned by an active transaction, and the commit
/// records newer than the oldest pinned snapshot (needed for conflict
/// detection).
#[derive(Debug)]
pub struct VersionArena {
    versions: BTreeMap<u64, Arc<GraphVersion>>,
    commits: BTreeMap<u64, CommitRecord>,
    pins: BTreeMap<u64, usize>,
    head: u64,
}

impl VersionArena {
    pub fn new() -> Self {
        let genesis = GraphVersion::genesis();
        let mut versions = BTreeMap::new();
        versions.insert(genesis.number(), Arc::new(genesis));
        Self {
            versions,
            commits: BTreeMap::new(),
            pins: BTreeMap::new(),
            head: 0,
        }
    }

    pub fn head_number(&self) -> u64 {
        self.head
    }

    pub fn head(&self) -> Arc<GraphVersion> {
        // The head is never pruned.
        self.versions
            .get(&self.head)
            .cloned()
            .unwrap_or_else(|| Arc::new(GraphVersion::genesis()))
    }

    pub fn get(&self, number: u64) -> Option<Arc<GraphVersion>> {
        self.versions.get(&number).cloned()
    }

    /// Pin the head for a new transaction and return its number.
    pub fn pin_head(&mut self) -> u64 {
        *self.pins.entry(self.head).or_insert(0) += 1;
        self.head
    }

    pub fn unpin(&mut self, number: u64) {
        if let Some(count) = self.pins.get_mut(&number) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(&number);
            }
        }
        self.prune();
    }

    /// First committed key in `keys` written after `snapshot`, if any.
    pub fn first_conflict<'a>(
        &self,
        snapshot: u64,
        keys: impl IntoIterator<Item = &'a EntityKey> + Clone,
    ) -> Option<(u64, EntityKey)> {
        self.commits
            .range(snapshot + 1..)
            .find_map(|(version, record)| {
                keys.clone()
                    .into_iter()
                    .find(|k| record.keys.contains(*k))
                    .map(|k| (*version, k.clone()))
            })
    }

    /// Install `version` as the new head and return it. The returned handle
    /// stays valid after later commits prune the version from the arena.
    pub fn install(&mut self, version: GraphVersion, record: CommitRecord) -> Arc<GraphVersion> {
        let number = version.number();
        let installed = Arc::new(version);
        self.versions.insert(number, Arc::clone(&installed));
        self.commits.insert(number, record);
        self.head = number;
        self.prune();
        installed
    }

    pub fn retained_versions(&self) -> usize {
        self.versions.len()
    }

    pub fn retained_commits(&self) -> usize {
        self.commits.len()
    }

    fn prune(&mut self) {
        let head = self.head;
        let pins = &self.pins;
        self.versions
            .retain(|number, _| *number == head || pins.contains_key(number));

        // Commit records at or below the oldest pinned snapshot can no longer
        // conflict with anything.
        match self.pins.keys().next().copied() {
            Some(oldest) => {
                self.commits = self.commits.split_off(&(oldest + 1));
            }
            None => self.commits.clear(),
        }
    }
}

impl Default for VersionArena {
    fn default() -> Self {
        Self::new()
    }
}
