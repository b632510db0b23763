use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use framegraph_types::{
    DataBlob, DataMap, DataType, Frame, FrameId, LabelFilter, Link, LinkContent, LinkId, TimeFilter,
    TransactionId,
};
use tracing::{debug, info, warn};

use crate::arena::{CommitRecord, EntityKey, VersionArena};
use crate::diff::CommitDiff;
use crate::error::{Result, StoreError};
use crate::names::NameRegistry;
use crate::spatial::SpatialIndex;
use crate::txn::{CommitOutcome, StoreStats, Transaction};
use crate::version::GraphVersion;

/// Retained version count above which a warning is logged.
pub const DEFAULT_RETENTION_WARNING: usize = 64;

/// Versioned store of frames, links and data with optimistic transactions.
///
/// Reads are served from the transaction's snapshot plus its own draft and
/// never block. Commit validates the write set against every commit newer
/// than the snapshot (first committer wins) and installs the merged result
/// as a new head inside a short critical section.
pub struct GraphStore {
    arena: RwLock<VersionArena>,
    transactions: DashMap<TransactionId, Transaction>,
    commit_lock: Mutex<()>,
    next_tx: AtomicU64,
    next_frame: AtomicU64,
    next_link: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicts: AtomicU64,
    retention_warning: usize,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::with_retention_warning(DEFAULT_RETENTION_WARNING)
    }

    pub fn with_retention_warning(retention_warning: usize) -> Self {
        Self {
            arena: RwLock::new(VersionArena::new()),
            transactions: DashMap::new(),
            commit_lock: Mutex::new(()),
            next_tx: AtomicU64::new(1),
            next_frame: AtomicU64::new(1),
            next_link: AtomicU64::new(1),
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            retention_warning,
        }
    }

    // =========================================================================
    // Transaction control
    // =========================================================================

    /// Open a transaction on the current head.
    pub fn start_transaction(&self) -> TransactionId {
        let id = TransactionId(self.next_tx.fetch_add(1, Ordering::SeqCst));
        let snapshot = {
            let mut arena = self.arena_write();
            arena.pin_head();
            arena.head()
        };
        debug!(tx = %id, snapshot = snapshot.number(), "Transaction started");
        self.transactions.insert(id, Transaction::new(id, snapshot));
        id
    }

    /// Commit `tx`. A conflict is not an error: it yields
    /// [`CommitOutcome::Conflicted`] and the transaction is aborted.
    pub fn commit_transaction(&self, tx: TransactionId) -> Result<CommitOutcome> {
        let (_, txn) = self
            .transactions
            .remove(&tx)
            .ok_or_else(|| self.missing(tx))?;
        let snapshot = txn.snapshot.number();

        if txn.is_read_only() {
            self.arena_write().unpin(snapshot);
            self.committed.fetch_add(1, Ordering::Relaxed);
            debug!(tx = %tx, version = snapshot, "Read-only transaction committed");
            return Ok(CommitOutcome::Committed {
                version: snapshot,
                diff: None,
                state: txn.snapshot,
            });
        }

        let merged = {
            let _guard = self.commit_lock.lock().unwrap_or_else(|e| e.into_inner());
            let (head, conflict) = {
                let arena = self.arena_read();
                (arena.head(), arena.first_conflict(snapshot, txn.writes.iter()))
            };
            match conflict {
                Some((version, key)) => Err(format!(
                    "{} was modified by the commit of version {}",
                    describe(&key),
                    version
                )),
                None => merge(&head, &txn).map(|(next, record, diff)| {
                    let mut arena = self.arena_write();
                    let state = arena.install(next, record);
                    arena.unpin(snapshot);
                    (diff, state, arena.retained_versions())
                }),
            }
        };

        match merged {
            Ok((diff, state, retained)) => {
                self.committed.fetch_add(1, Ordering::Relaxed);
                info!(
                    tx = %tx,
                    snapshot,
                    version = diff.version,
                    writes = txn.writes.len(),
                    "Transaction committed"
                );
                if retained > self.retention_warning {
                    warn!(
                        retained,
                        threshold = self.retention_warning,
                        "Many versions retained; long-running transactions are pinning old snapshots"
                    );
                }
                Ok(CommitOutcome::Committed {
                    version: diff.version,
                    diff: Some(diff),
                    state,
                })
            }
            Err(reason) => {
                self.arena_write().unpin(snapshot);
                self.conflicts.fetch_add(1, Ordering::Relaxed);
                self.aborted.fetch_add(1, Ordering::Relaxed);
                warn!(tx = %tx, snapshot, reason = %reason, "Transaction conflicted");
                Ok(CommitOutcome::Conflicted { reason })
            }
        }
    }

    /// Discard `tx`. Unknown and finished transactions are ignored.
    pub fn abort_transaction(&self, tx: TransactionId, reason: &str) {
        match self.transactions.remove(&tx) {
            Some((_, txn)) => {
                self.arena_write().unpin(txn.snapshot.number());
                self.aborted.fetch_add(1, Ordering::Relaxed);
                warn!(tx = %tx, reason, discarded = txn.writes.len(), "Transaction aborted");
            }
            None => debug!(tx = %tx, reason, "Abort of inactive transaction ignored"),
        }
    }

    pub fn is_active(&self, tx: TransactionId) -> bool {
        self.transactions.contains_key(&tx)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a frame, optionally reserving `name` for it.
    pub fn create_frame(&self, tx: TransactionId, name: Option<&str>) -> Result<FrameId> {
        self.write(tx, |draft, writes| {
            if let Some(name) = name {
                check_name(draft.names(), name)?;
            }
            let id = FrameId(self.next_frame.fetch_add(1, Ordering::SeqCst));
            let mut frame = Frame::new(id);
            frame.name = name.map(str::to_string);
            draft.put_frame(id, Some(Arc::new(frame)));
            writes.insert(EntityKey::Frame(id));
            if let Some(name) = name {
                draft.names_mut().bind(name, id);
                writes.insert(EntityKey::Name(name.to_string()));
            }
            debug!(tx = %tx, frame = %id, name = ?name, "Frame created");
            Ok(id)
        })
    }

    /// Rename `frame`. Returns `false` without changes when `name` belongs
    /// to another frame.
    pub fn set_frame_name(&self, tx: TransactionId, frame: FrameId, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Err(StoreError::InvalidName);
        }
        self.write(tx, |draft, writes| {
            if !draft.has_frame(frame) {
                return Err(StoreError::FrameNotFound(frame));
            }
            match draft.names().lookup(name) {
                Some(owner) if owner == frame => return Ok(true),
                Some(owner) => {
                    debug!(tx = %tx, frame = %frame, name, owner = %owner, "Frame name taken");
                    return Ok(false);
                }
                None => {}
            }
            if let Some(previous) = draft.names_mut().bind(name, frame) {
                writes.insert(EntityKey::Name(previous));
            }
            if let Some(record) = draft.frame_mut(frame) {
                record.name = Some(name.to_string());
            }
            writes.insert(EntityKey::Frame(frame));
            writes.insert(EntityKey::Name(name.to_string()));
            Ok(true)
        })
    }

    /// Create a link, or replace the link `reuse` names (keeping its data).
    /// A `reuse` id that does not exist yields a new link.
    pub fn set_link(
        &self,
        tx: TransactionId,
        content: LinkContent,
        reuse: Option<LinkId>,
    ) -> Result<LinkId> {
        if !(0.0..=1.0).contains(&content.confidence) {
            return Err(StoreError::InvalidConfidence(content.confidence));
        }
        if content.parent == content.child {
            return Err(StoreError::SelfLink(content.parent));
        }
        content
            .transformation
            .validate()
            .map_err(StoreError::InvalidTransform)?;
        self.write(tx, |draft, writes| {
            for end in [content.parent, content.child] {
                if !draft.has_frame(end) {
                    return Err(StoreError::FrameNotFound(end));
                }
            }
            let existing = reuse.and_then(|id| draft.link(id).map(|l| (id, l.data.clone())));
            let (id, data) = match existing {
                Some(found) => found,
                None => (LinkId(self.next_link.fetch_add(1, Ordering::SeqCst)), DataMap::new()),
            };
            debug!(
                tx = %tx,
                link = %id,
                parent = %content.parent,
                child = %content.child,
                replaced = reuse == Some(id),
                "Link set"
            );
            draft.put_link(id, Some(Arc::new(Link { id, content, data })));
            writes.insert(EntityKey::Link(id));
            Ok(id)
        })
    }

    /// Delete links and their data. Fails without changes if any id is unknown.
    pub fn delete_links(&self, tx: TransactionId, links: &[LinkId]) -> Result<()> {
        self.write(tx, |draft, writes| {
            if let Some(missing) = links.iter().find(|id| !draft.has_link(**id)) {
                return Err(StoreError::LinkNotFound(*missing));
            }
            for id in links {
                draft.put_link(*id, None);
                writes.insert(EntityKey::Link(*id));
            }
            debug!(tx = %tx, count = links.len(), "Links deleted");
            Ok(())
        })
    }

    /// Delete a frame together with every link touching it, all their data
    /// and the frame's name.
    pub fn delete_frame(&self, tx: TransactionId, frame: FrameId) -> Result<()> {
        self.write(tx, |draft, writes| {
            if !draft.has_frame(frame) {
                return Err(StoreError::FrameNotFound(frame));
            }
            let touching: Vec<LinkId> = draft.link_ids_of(frame).collect();
            for id in &touching {
                draft.put_link(*id, None);
                writes.insert(EntityKey::Link(*id));
            }
            if let Some(name) = draft.names_mut().unbind_frame(frame) {
                writes.insert(EntityKey::Name(name));
            }
            draft.put_frame(frame, None);
            writes.insert(EntityKey::Frame(frame));
            debug!(tx = %tx, frame = %frame, cascaded = touching.len(), "Frame deleted");
            Ok(())
        })
    }

    pub fn set_frame_data(
        &self,
        tx: TransactionId,
        frame: FrameId,
        data_type: DataType,
        blob: DataBlob,
    ) -> Result<()> {
        self.write(tx, |draft, writes| {
            let data = draft
                .frame_data_mut(frame)
                .ok_or(StoreError::FrameNotFound(frame))?;
            debug!(tx = %tx, frame = %frame, data_type = %data_type, bytes = blob.len(), "Frame data set");
            data.insert(data_type, blob);
            writes.insert(EntityKey::Frame(frame));
            Ok(())
        })
    }

    /// Remove the given data types from a frame. Absent types are ignored.
    pub fn delete_frame_data(&self, tx: TransactionId, frame: FrameId, types: &[DataType]) -> Result<()> {
        self.write(tx, |draft, writes| {
            let record = draft.frame(frame).ok_or(StoreError::FrameNotFound(frame))?;
            if !types.iter().any(|t| record.data.contains_key(t)) {
                return Ok(());
            }
            if let Some(data) = draft.frame_data_mut(frame) {
                for t in types {
                    data.remove(t);
                }
            }
            writes.insert(EntityKey::Frame(frame));
            Ok(())
        })
    }

    pub fn set_link_data(
        &self,
        tx: TransactionId,
        link: LinkId,
        data_type: DataType,
        blob: DataBlob,
    ) -> Result<()> {
        self.write(tx, |draft, writes| {
            let data = draft
                .link_data_mut(link)
                .ok_or(StoreError::LinkNotFound(link))?;
            debug!(tx = %tx, link = %link, data_type = %data_type, bytes = blob.len(), "Link data set");
            data.insert(data_type, blob);
            writes.insert(EntityKey::Link(link));
            Ok(())
        })
    }

    /// Remove the given data types from a link. Absent types are ignored.
    pub fn delete_link_data(&self, tx: TransactionId, link: LinkId, types: &[DataType]) -> Result<()> {
        self.write(tx, |draft, writes| {
            let record = draft.link(link).ok_or(StoreError::LinkNotFound(link))?;
            if !types.iter().any(|t| record.data.contains_key(t)) {
                return Ok(());
            }
            if let Some(data) = draft.link_data_mut(link) {
                for t in types {
                    data.remove(t);
                }
            }
            writes.insert(EntityKey::Link(link));
            Ok(())
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Run `f` against the transaction's view (snapshot plus own writes).
    pub fn read<R, E>(
        &self,
        tx: TransactionId,
        f: impl FnOnce(&GraphVersion) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E>
    where
        E: From<StoreError>,
    {
        let txn = self.transactions.get(&tx).ok_or_else(|| self.missing(tx))?;
        f(txn.view())
    }

    pub fn resolve_links(&self, tx: TransactionId, links: &[LinkId]) -> Result<Vec<Link>> {
        self.read(tx, |view| {
            links
                .iter()
                .map(|id| view.link(*id).cloned().ok_or(StoreError::LinkNotFound(*id)))
                .collect()
        })
    }

    /// Data attached to `frame`, restricted to `types` (empty means all).
    pub fn get_frame_data(&self, tx: TransactionId, frame: FrameId, types: &[DataType]) -> Result<DataMap> {
        self.read(tx, |view| {
            let record = view.frame(frame).ok_or(StoreError::FrameNotFound(frame))?;
            Ok(select_data(&record.data, types))
        })
    }

    /// Data attached to `link`, restricted to `types` (empty means all).
    pub fn get_link_data(&self, tx: TransactionId, link: LinkId, types: &[DataType]) -> Result<DataMap> {
        self.read(tx, |view| {
            let record = view.link(link).ok_or(StoreError::LinkNotFound(link))?;
            Ok(select_data(&record.data, types))
        })
    }

    pub fn get_frame_name(&self, tx: TransactionId, frame: FrameId) -> Result<Option<String>> {
        self.read(tx, |view| {
            if !view.has_frame(frame) {
                return Err(StoreError::FrameNotFound(frame));
            }
            Ok(view.names().name_of(frame).map(str::to_string))
        })
    }

    pub fn get_frame_id(&self, tx: TransactionId, name: &str) -> Result<Option<FrameId>> {
        self.read(tx, |view| Ok(view.names().lookup(name)))
    }

    /// All frame ids in the transaction's view, ascending.
    pub fn list_frames(&self, tx: TransactionId) -> Result<Vec<FrameId>> {
        self.read(tx, |view| Ok(view.frame_ids()))
    }

    pub fn get_links(
        &self,
        tx: TransactionId,
        frames: &[FrameId],
        return_foreign: bool,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
    ) -> Result<Vec<LinkId>> {
        self.read(tx, |view| {
            require_frames(view, frames)?;
            Ok(SpatialIndex::new(view).get_links(frames, return_foreign, time, label))
        })
    }

    pub fn get_neighbour_frames(
        &self,
        tx: TransactionId,
        frames: &[FrameId],
        max_link_count: usize,
        time: Option<&TimeFilter>,
        label: Option<&LabelFilter>,
    ) -> Result<Vec<FrameId>> {
        self.read(tx, |view| {
            require_frames(view, frames)?;
            Ok(SpatialIndex::new(view).get_neighbour_frames(frames, max_link_count, time, label))
        })
    }

    // =========================================================================
    // Versions and monitoring
    // =========================================================================

    /// The latest committed version.
    pub fn head(&self) -> Arc<GraphVersion> {
        self.arena_read().head()
    }

    /// A retained version by number.
    pub fn version(&self, number: u64) -> Result<Arc<GraphVersion>> {
        self.arena_read()
            .get(number)
            .ok_or(StoreError::SnapshotUnavailable(number))
    }

    pub fn stats(&self) -> StoreStats {
        let arena = self.arena_read();
        StoreStats {
            head_version: arena.head_number(),
            retained_versions: arena.retained_versions(),
            active_transactions: self.transactions.len(),
            committed: self.committed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn write<R>(
        &self,
        tx: TransactionId,
        f: impl FnOnce(&mut GraphVersion, &mut HashSet<EntityKey>) -> Result<R>,
    ) -> Result<R> {
        let mut txn = self.transactions.get_mut(&tx).ok_or_else(|| self.missing(tx))?;
        let (draft, writes) = txn.draft_and_writes();
        f(draft, writes)
    }

    /// Error for an id with no active transaction.
    fn missing(&self, tx: TransactionId) -> StoreError {
        if tx.0 != 0 && tx.0 < self.next_tx.load(Ordering::SeqCst) {
            StoreError::TransactionNotActive(tx)
        } else {
            StoreError::TransactionNotFound(tx)
        }
    }

    fn arena_read(&self) -> RwLockReadGuard<'_, VersionArena> {
        self.arena.read().unwrap_or_else(|e| e.into_inner())
    }

    fn arena_write(&self) -> RwLockWriteGuard<'_, VersionArena> {
        self.arena.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_name(names: &NameRegistry, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidName);
    }
    match names.lookup(name) {
        Some(owner) => Err(StoreError::DuplicateName {
            name: name.to_string(),
            owner,
        }),
        None => Ok(()),
    }
}

fn require_frames(view: &GraphVersion, frames: &[FrameId]) -> Result<()> {
    match frames.iter().find(|f| !view.has_frame(**f)) {
        Some(missing) => Err(StoreError::FrameNotFound(*missing)),
        None => Ok(()),
    }
}

fn select_data(data: &DataMap, types: &[DataType]) -> DataMap {
    if types.is_empty() {
        return data.clone();
    }
    types
        .iter()
        .filter_map(|t| data.get(t).map(|blob| (t.clone(), blob.clone())))
        .collect()
}

fn describe(key: &EntityKey) -> String {
    match key {
        EntityKey::Frame(id) => format!("{id}"),
        EntityKey::Link(id) => format!("{id}"),
        EntityKey::Name(name) => format!("frame name '{name}'"),
    }
}

/// Install the transaction's writes on top of `head`.
///
/// Every written key takes the draft's value. Frames deleted by the
/// transaction also remove links that touch them in `head`, including links
/// added by commits newer than the snapshot. Fails when a written link
/// ends up referencing a missing frame.
fn merge(
    head: &GraphVersion,
    txn: &Transaction,
) -> std::result::Result<(GraphVersion, CommitRecord, CommitDiff), String> {
    let draft = txn.view();
    let mut next = head.clone();
    next.set_number(head.number() + 1);

    let mut keys = txn.writes.clone();
    let mut frames = BTreeSet::new();
    let mut links = BTreeSet::new();
    let mut names = BTreeSet::new();
    for key in &txn.writes {
        match key {
            EntityKey::Frame(id) => {
                frames.insert(*id);
            }
            EntityKey::Link(id) => {
                links.insert(*id);
            }
            EntityKey::Name(name) => {
                names.insert(name.as_str());
            }
        }
    }

    for id in &links {
        next.put_link(*id, draft.link_arc(*id));
    }

    let mut removed = Vec::new();
    for id in &frames {
        match draft.frame_arc(*id) {
            Some(frame) => next.put_frame(*id, Some(frame)),
            None => removed.push(*id),
        }
    }
    for frame in removed {
        let touching: Vec<LinkId> = next.link_ids_of(frame).collect();
        for id in touching {
            next.put_link(id, None);
            links.insert(id);
            keys.insert(EntityKey::Link(id));
        }
        next.put_frame(frame, None);
    }

    for name in names {
        next.names_mut().adopt(name, draft.names().lookup(name));
    }

    for id in &links {
        if let Some(link) = next.link(*id) {
            for end in [link.content.parent, link.content.child] {
                if !next.has_frame(end) {
                    return Err(format!("{id} references {end}, which no longer exists"));
                }
            }
        }
    }

    let mut diff = CommitDiff {
        version: next.number(),
        ..CommitDiff::default()
    };
    for id in &frames {
        diff.record_frame(*id, head, &next);
    }
    for id in &links {
        diff.record_link(*id, head, &next);
    }
    debug!(tx = %txn.id, version = next.number(), "Merged transaction onto head");

    Ok((next, CommitRecord { keys }, diff))
}
