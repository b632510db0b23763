use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Identity of one node in a distributed deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId(pub uuid::Uuid);

impl HostId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-node identifier: 16 bytes of host identity followed by a 16-byte
/// big-endian host-local monotonic value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalId(pub [u8; 32]);

impl GlobalId {
    pub fn new(host: HostId, local: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(host.0.as_bytes());
        bytes[16..].copy_from_slice(&local.to_be_bytes());
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TypesError::InvalidGlobalIdLength(bytes.len()))?;
        Ok(Self(arr))
    }

    pub fn host(&self) -> HostId {
        let mut host = [0u8; 16];
        host.copy_from_slice(&self.0[..16]);
        HostId(uuid::Uuid::from_bytes(host))
    }

    pub fn local(&self) -> u128 {
        let mut local = [0u8; 16];
        local.copy_from_slice(&self.0[16..]);
        u128::from_be_bytes(local)
    }
}

impl std::fmt::Display for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:x}", self.host().0.simple(), self.local())
    }
}

/// Per-node bijection between local 64-bit ids and global ids.
///
/// Ids minted locally map to `(host, local)`. Foreign ids get a local alias
/// allocated downward from `u64::MAX`, far away from the upward-counting
/// local allocator, so aliases never collide with real local ids.
#[derive(Debug)]
pub struct IdMapper {
    host: HostId,
    next_alias: u64,
    foreign_to_local: HashMap<GlobalId, u64>,
    local_to_foreign: HashMap<u64, GlobalId>,
}

impl IdMapper {
    pub fn new(host: HostId) -> Self {
        Self {
            host,
            next_alias: u64::MAX,
            foreign_to_local: HashMap::new(),
            local_to_foreign: HashMap::new(),
        }
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    /// Global form of a local id. Aliases of foreign ids export as the
    /// original foreign id.
    pub fn export(&self, local: u64) -> GlobalId {
        match self.local_to_foreign.get(&local) {
            Some(global) => *global,
            None => GlobalId::new(self.host, local as u128),
        }
    }

    /// Local form of a global id, allocating an alias for foreign ids seen
    /// for the first time.
    pub fn import(&mut self, global: GlobalId) -> u64 {
        if let Some(local) = self.local_of(&global) {
            return local;
        }
        let alias = self.next_alias;
        self.next_alias -= 1;
        self.foreign_to_local.insert(global, alias);
        self.local_to_foreign.insert(alias, global);
        alias
    }

    /// Lookup without allocation.
    pub fn local_of(&self, global: &GlobalId) -> Option<u64> {
        if global.host() == self.host {
            return u64::try_from(global.local()).ok();
        }
        self.foreign_to_local.get(global).copied()
    }

    /// Global id recorded for a foreign alias, if `local` is one.
    pub fn global_of(&self, local: u64) -> Option<GlobalId> {
        self.local_to_foreign.get(&local).copied()
    }

    pub fn foreign_count(&self) -> usize {
        self.foreign_to_local.len()
    }
}
