#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lamport timestamp used to stamp outgoing operations.
pub type Lamport = u64;

/// Unique identifier for a replica. Backed by raw bytes to support arbitrary identity formats.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplicaId(pub Vec<u8>);

impl ReplicaId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Unique identifier for a node in the tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub u128);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    /// Derive a fresh id for a locally created node: the first 8 bytes of the
    /// replica id (zero-padded) fill the high half, the per-checkout counter
    /// the low half. Counters start at 1, so this never collides with `ROOT`.
    pub fn derive(replica: &ReplicaId, counter: u64) -> Self {
        let mut bytes = [0u8; 16];
        let rep = replica.as_bytes();
        let len = rep.len().min(8);
        bytes[..len].copy_from_slice(&rep[..len]);
        bytes[8..].copy_from_slice(&counter.to_be_bytes());
        NodeId(u128::from_be_bytes(bytes))
    }
}

/// Globally unique identifier for an operation.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OperationId {
    pub replica: ReplicaId,
    pub counter: u64,
}

impl OperationId {
    pub fn new(replica: &ReplicaId, counter: u64) -> Self {
        Self {
            replica: replica.clone(),
            counter,
        }
    }
}
