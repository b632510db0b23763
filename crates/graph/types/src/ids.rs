//! Strong typed IDs used throughout FrameGraph.
//!
//! Local ids are 64-bit and never zero; zero is reserved as the
//! "unassigned" value on the wire.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub u64);

impl TriggerId {
    /// Returned by watch registrations that could not be honoured.
    pub const INVALID: TriggerId = TriggerId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link:{}", self.0)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trg:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_trigger_id() {
        assert!(!TriggerId::INVALID.is_valid());
        assert!(TriggerId(7).is_valid());
    }

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&FrameId(42)).unwrap();
        assert_eq!(json, "42");
        let restored: LinkId = serde_json::from_str("9").unwrap();
        assert_eq!(restored, LinkId(9));
    }

    #[test]
    fn display_formats() {
        assert_eq!(format!("{}", FrameId(1)), "frame:1");
        assert_eq!(format!("{}", LinkId(2)), "link:2");
        assert_eq!(format!("{}", TransactionId(3)), "tx:3");
        assert_eq!(format!("{}", TriggerId(4)), "trg:4");
    }
}
