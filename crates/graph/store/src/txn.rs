use std::collections::HashSet;
use std::sync::Arc;

use framegraph_types::TransactionId;
use serde::{Deserialize, Serialize};

use crate::arena::EntityKey;
use crate::diff::CommitDiff;
use crate::version::GraphVersion;

/// An active transaction: its snapshot plus a private draft holding its
/// own writes. The draft is created lazily on the first write.
///
/// Only active transactions exist as values; committing or aborting
/// consumes the transaction.
#[derive(Debug)]
pub(crate) struct Transaction {
    pub(crate) id: TransactionId,
    pub(crate) snapshot: Arc<GraphVersion>,
    pub(crate) draft: Option<GraphVersion>,
    pub(crate) writes: HashSet<EntityKey>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, snapshot: Arc<GraphVersion>) -> Self {
        Self {
            id,
            snapshot,
            draft: None,
            writes: HashSet::new(),
        }
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// The transaction's view: its draft if it has written, else the snapshot.
    pub(crate) fn view(&self) -> &GraphVersion {
        self.draft.as_ref().unwrap_or(self.snapshot.as_ref())
    }

    /// The draft (cloned from the snapshot on first use) and the write set.
    pub(crate) fn draft_and_writes(&mut self) -> (&mut GraphVersion, &mut HashSet<EntityKey>) {
        let snapshot = &self.snapshot;
        let draft = self.draft.get_or_insert_with(|| GraphVersion::clone(snapshot));
        (draft, &mut self.writes)
    }
}

/// Result of committing a transaction.
#[derive(Clone, Debug, PartialEq)]
pub enum CommitOutcome {
    /// Installed. `diff` is `None` for read-only transactions; `state` is
    /// the version the commit produced (the snapshot when read-only).
    Committed {
        version: u64,
        diff: Option<CommitDiff>,
        state: Arc<GraphVersion>,
    },
    /// Rejected; the transaction has been aborted.
    Conflicted { reason: String },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    /// The `(success, message)` pair reported to clients.
    pub fn to_status(&self) -> (bool, String) {
        match self {
            CommitOutcome::Committed { .. } => (true, String::new()),
            CommitOutcome::Conflicted { reason } => (false, reason.clone()),
        }
    }
}

/// Counters exposed for monitoring.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub head_version: u64,
    pub retained_versions: usize,
    pub active_transactions: usize,
    pub committed: u64,
    pub aborted: u64,
    pub conflicts: u64,
}
