use crate::constraint::Constraint;
use crate::ids::{Lamport, NodeId, OperationId, ReplicaId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Metadata that accompanies every operation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OperationMetadata {
    pub id: OperationId,
    pub lamport: Lamport,
}

/// The tree mutations a checkout can record.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OperationKind {
    Insert {
        parent: NodeId,
        node: NodeId,
        position: usize,
        /// Optional application payload to initialize alongside insert.
        payload: Option<Vec<u8>>,
    },
    Move {
        node: NodeId,
        new_parent: NodeId,
        position: usize,
    },
    Remove {
        node: NodeId,
    },
    /// Update the node payload (application data) as an opaque byte string.
    ///
    /// - `payload = Some(bytes)` sets the payload
    /// - `payload = None` clears the payload
    Payload {
        node: NodeId,
        payload: Option<Vec<u8>>,
    },
}

/// Full operation envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Operation {
    pub meta: OperationMetadata,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(replica: &ReplicaId, counter: u64, lamport: Lamport, kind: OperationKind) -> Self {
        Self {
            meta: OperationMetadata {
                id: OperationId::new(replica, counter),
                lamport,
            },
            kind,
        }
    }
}

impl OperationKind {
    /// The node this operation edits.
    pub fn node(&self) -> NodeId {
        match self {
            OperationKind::Insert { node, .. }
            | OperationKind::Move { node, .. }
            | OperationKind::Remove { node }
            | OperationKind::Payload { node, .. } => *node,
        }
    }
}

/// One committed transaction: the grouped edits plus the constraints the
/// ordering collaborator must re-validate after sequencing. Remote clients
/// observe either all of the ops or none of them.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangeBundle {
    pub ops: Vec<Operation>,
    pub constraints: Vec<Constraint>,
}
