use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::ops::OperationKind;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
struct NodeState {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    payload: Option<Vec<u8>>,
    removed: bool,
}

impl NodeState {
    fn new_root() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            payload: None,
            removed: false,
        }
    }
}

/// State of one node captured before an edit is applied, sufficient to revert
/// the edit exactly. `known = false` marks a node the edit introduced; its
/// revert deletes the node outright.
#[derive(Clone, Debug)]
pub(crate) struct EditSnapshot {
    known: bool,
    parent: Option<NodeId>,
    position: Option<usize>,
    payload: Option<Vec<u8>>,
    removed: bool,
}

/// Structural snapshot of one node, for observers and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeExport {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub payload: Option<Vec<u8>>,
    pub removed: bool,
}

/// Materialized tree a checkout edits against.
///
/// Local edits are strict: unknown nodes, root mutations, and cycle-creating
/// moves are rejected before any state changes, so `apply` either mutates
/// fully or not at all.
pub(crate) struct TreeState {
    nodes: HashMap<NodeId, NodeState>,
}

impl TreeState {
    pub(crate) fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::ROOT, NodeState::new_root());
        Self { nodes }
    }

    pub(crate) fn known(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub(crate) fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    pub(crate) fn children(&self, node: NodeId) -> Option<Vec<NodeId>> {
        self.nodes.get(&node).map(|n| n.children.clone())
    }

    pub(crate) fn payload(&self, node: NodeId) -> Option<Vec<u8>> {
        self.nodes.get(&node).and_then(|n| n.payload.clone())
    }

    pub(crate) fn is_removed(&self, node: NodeId) -> bool {
        self.nodes.get(&node).map(|n| n.removed).unwrap_or(false)
    }

    /// Whether the node is reachable from the root through live parents.
    /// Removed nodes and content below them are out of the document even
    /// though their state is retained for revert.
    pub(crate) fn in_document(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            let Some(state) = self.nodes.get(&current) else {
                return false;
            };
            if state.removed {
                return false;
            }
            if current == NodeId::ROOT {
                return true;
            }
            match state.parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Inclusive ancestor check: walks parent links from `descendant` looking
    /// for `ancestor`. O(depth).
    pub(crate) fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        let mut current = Some(descendant);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.nodes.get(&n).and_then(|state| state.parent);
        }
        false
    }

    /// Validate and apply one edit, returning the snapshot needed to revert it.
    pub(crate) fn apply(&mut self, kind: &OperationKind) -> Result<EditSnapshot> {
        match kind {
            OperationKind::Insert {
                parent,
                node,
                position,
                payload,
            } => {
                if self.known(*node) {
                    return Err(Error::InconsistentState(format!(
                        "node {node:?} already exists"
                    )));
                }
                let parent_state = self
                    .nodes
                    .get(parent)
                    .ok_or(Error::UnknownNode(*parent))?;
                if parent_state.removed {
                    return Err(Error::Usage(
                        "cannot insert under a removed node".into(),
                    ));
                }
                let snapshot = self.snapshot(*node);
                self.nodes.insert(
                    *node,
                    NodeState {
                        parent: None,
                        children: Vec::new(),
                        payload: payload.clone(),
                        removed: false,
                    },
                );
                self.attach(*node, *parent, *position);
                Ok(snapshot)
            }
            OperationKind::Move {
                node,
                new_parent,
                position,
            } => {
                if *node == NodeId::ROOT {
                    return Err(Error::Usage("the root cannot be moved".into()));
                }
                let state = self.nodes.get(node).ok_or(Error::UnknownNode(*node))?;
                if state.removed {
                    return Err(Error::Usage(format!("node {node:?} has been removed")));
                }
                let parent_state = self
                    .nodes
                    .get(new_parent)
                    .ok_or(Error::UnknownNode(*new_parent))?;
                if parent_state.removed {
                    return Err(Error::Usage(
                        "cannot move a node under a removed node".into(),
                    ));
                }
                if self.is_ancestor(*node, *new_parent) {
                    return Err(Error::Usage(format!(
                        "moving {node:?} under {new_parent:?} would create a cycle"
                    )));
                }
                let snapshot = self.snapshot(*node);
                self.detach(*node);
                self.attach(*node, *new_parent, *position);
                Ok(snapshot)
            }
            OperationKind::Remove { node } => {
                if *node == NodeId::ROOT {
                    return Err(Error::Usage("the root cannot be removed".into()));
                }
                let state = self.nodes.get(node).ok_or(Error::UnknownNode(*node))?;
                if state.removed {
                    return Err(Error::Usage(format!("node {node:?} is already removed")));
                }
                let snapshot = self.snapshot(*node);
                self.detach(*node);
                if let Some(entry) = self.nodes.get_mut(node) {
                    entry.parent = None;
                    entry.removed = true;
                }
                Ok(snapshot)
            }
            OperationKind::Payload { node, payload } => {
                if !self.known(*node) {
                    return Err(Error::UnknownNode(*node));
                }
                let snapshot = self.snapshot(*node);
                if let Some(entry) = self.nodes.get_mut(node) {
                    entry.payload = payload.clone();
                }
                Ok(snapshot)
            }
        }
    }

    /// Undo one edit from its snapshot. Entries must be reverted in the
    /// reverse of their application order; under that discipline the tree is
    /// restored to exactly its prior structure.
    pub(crate) fn revert(&mut self, kind: &OperationKind, snapshot: &EditSnapshot) {
        let node = kind.node();
        self.detach(node);
        if !snapshot.known {
            self.nodes.remove(&node);
            return;
        }
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.payload = snapshot.payload.clone();
            entry.removed = snapshot.removed;
            entry.parent = None;
        }
        if let Some(parent) = snapshot.parent {
            let position = snapshot
                .position
                .unwrap_or_else(|| self.child_count(parent));
            self.attach(node, parent, position);
            // attach clears the removed flag; restore the snapshot's value
            if let Some(entry) = self.nodes.get_mut(&node) {
                entry.removed = snapshot.removed;
            }
        }
    }

    pub(crate) fn export(&self) -> Vec<NodeExport> {
        let mut out: Vec<NodeExport> = self
            .nodes
            .iter()
            .map(|(id, state)| NodeExport {
                id: *id,
                parent: state.parent,
                children: state.children.clone(),
                payload: state.payload.clone(),
                removed: state.removed,
            })
            .collect();
        out.sort_by_key(|n| n.id);
        out
    }

    fn snapshot(&self, node: NodeId) -> EditSnapshot {
        let Some(state) = self.nodes.get(&node) else {
            return EditSnapshot {
                known: false,
                parent: None,
                position: None,
                payload: None,
                removed: false,
            };
        };
        let position = state.parent.and_then(|p| {
            self.nodes
                .get(&p)
                .and_then(|pnode| pnode.children.iter().position(|c| *c == node))
        });
        EditSnapshot {
            known: true,
            parent: state.parent,
            position,
            payload: state.payload.clone(),
            removed: state.removed,
        }
    }

    fn child_count(&self, node: NodeId) -> usize {
        self.nodes.get(&node).map(|n| n.children.len()).unwrap_or(0)
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes.get(&node).and_then(|n| n.parent) {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != node);
            }
        }
    }

    fn attach(&mut self, node: NodeId, parent: NodeId, position: usize) {
        if let Some(parent_entry) = self.nodes.get_mut(&parent) {
            let idx = position.min(parent_entry.children.len());
            parent_entry.children.insert(idx, node);
        }
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.parent = Some(parent);
            entry.removed = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(tree: &mut TreeState, parent: NodeId, node: NodeId) -> EditSnapshot {
        tree.apply(&OperationKind::Insert {
            parent,
            node,
            position: usize::MAX,
            payload: None,
        })
        .unwrap()
    }

    #[test]
    fn insert_positions_clamp_to_child_count() {
        let mut tree = TreeState::new();
        insert(&mut tree, NodeId::ROOT, NodeId(1));
        insert(&mut tree, NodeId::ROOT, NodeId(2));
        assert_eq!(
            tree.children(NodeId::ROOT).unwrap(),
            vec![NodeId(1), NodeId(2)]
        );
    }

    #[test]
    fn moves_that_would_create_cycles_are_rejected() {
        let mut tree = TreeState::new();
        insert(&mut tree, NodeId::ROOT, NodeId(1));
        insert(&mut tree, NodeId(1), NodeId(2));

        let err = tree
            .apply(&OperationKind::Move {
                node: NodeId(1),
                new_parent: NodeId(2),
                position: 0,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert_eq!(tree.parent(NodeId(1)), Some(NodeId::ROOT));
    }

    #[test]
    fn root_cannot_be_moved_or_removed() {
        let mut tree = TreeState::new();
        insert(&mut tree, NodeId::ROOT, NodeId(1));
        assert!(tree
            .apply(&OperationKind::Move {
                node: NodeId::ROOT,
                new_parent: NodeId(1),
                position: 0,
            })
            .is_err());
        assert!(tree
            .apply(&OperationKind::Remove { node: NodeId::ROOT })
            .is_err());
    }

    #[test]
    fn revert_of_an_insert_deletes_the_node() {
        let mut tree = TreeState::new();
        let before = tree.export();
        let snapshot = insert(&mut tree, NodeId::ROOT, NodeId(1));
        tree.revert(
            &OperationKind::Insert {
                parent: NodeId::ROOT,
                node: NodeId(1),
                position: 0,
                payload: None,
            },
            &snapshot,
        );
        assert_eq!(tree.export(), before);
    }

    #[test]
    fn revert_of_a_remove_restores_position() {
        let mut tree = TreeState::new();
        insert(&mut tree, NodeId::ROOT, NodeId(1));
        insert(&mut tree, NodeId::ROOT, NodeId(2));
        insert(&mut tree, NodeId::ROOT, NodeId(3));
        let before = tree.export();

        let kind = OperationKind::Remove { node: NodeId(2) };
        let snapshot = tree.apply(&kind).unwrap();
        assert_eq!(
            tree.children(NodeId::ROOT).unwrap(),
            vec![NodeId(1), NodeId(3)]
        );

        tree.revert(&kind, &snapshot);
        assert_eq!(tree.export(), before);
    }

    #[test]
    fn removed_subtrees_leave_the_document() {
        let mut tree = TreeState::new();
        insert(&mut tree, NodeId::ROOT, NodeId(1));
        insert(&mut tree, NodeId(1), NodeId(2));
        tree.apply(&OperationKind::Remove { node: NodeId(1) })
            .unwrap();

        assert!(!tree.in_document(NodeId(1)));
        assert!(!tree.in_document(NodeId(2)));
        assert!(tree.in_document(NodeId::ROOT));
    }

    #[test]
    fn payload_revert_restores_previous_bytes() {
        let mut tree = TreeState::new();
        insert(&mut tree, NodeId::ROOT, NodeId(1));
        tree.apply(&OperationKind::Payload {
            node: NodeId(1),
            payload: Some(b"old".to_vec()),
        })
        .unwrap();

        let kind = OperationKind::Payload {
            node: NodeId(1),
            payload: Some(b"new".to_vec()),
        };
        let snapshot = tree.apply(&kind).unwrap();
        assert_eq!(tree.payload(NodeId(1)), Some(b"new".to_vec()));

        tree.revert(&kind, &snapshot);
        assert_eq!(tree.payload(NodeId(1)), Some(b"old".to_vec()));
    }
}
