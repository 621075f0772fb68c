use std::cell::RefCell;
use std::rc::Rc;

use crate::checkout::Checkout;
use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::ops::OperationKind;

enum Binding {
    /// Detached content not yet attached to any checkout. Single nodes only;
    /// detached subtree construction is out of scope.
    Unhydrated { payload: Option<Vec<u8>> },
    /// Attached to a live checkout.
    Hydrated { checkout: Checkout, id: NodeId },
}

/// Handle to one node of a shared tree.
///
/// Handles are cheap to clone and share a binding: when an unhydrated node is
/// inserted into a tree, every clone of its handle observes the hydration.
/// Edits route through the owning checkout, so they participate in whatever
/// transaction is open there.
#[derive(Clone)]
pub struct TreeNode {
    binding: Rc<RefCell<Binding>>,
}

impl TreeNode {
    /// Create detached content that can later be inserted via
    /// [`TreeNode::insert_node`].
    pub fn unhydrated(payload: Option<Vec<u8>>) -> Self {
        Self {
            binding: Rc::new(RefCell::new(Binding::Unhydrated { payload })),
        }
    }

    pub(crate) fn hydrated(checkout: Checkout, id: NodeId) -> Self {
        Self {
            binding: Rc::new(RefCell::new(Binding::Hydrated { checkout, id })),
        }
    }

    pub fn is_hydrated(&self) -> bool {
        matches!(&*self.binding.borrow(), Binding::Hydrated { .. })
    }

    /// The node's id, once it is attached to a checkout.
    pub fn id(&self) -> Option<NodeId> {
        match &*self.binding.borrow() {
            Binding::Hydrated { id, .. } => Some(*id),
            Binding::Unhydrated { .. } => None,
        }
    }

    pub(crate) fn same_handle(&self, other: &TreeNode) -> bool {
        Rc::ptr_eq(&self.binding, &other.binding)
    }

    pub(crate) fn resolve(&self) -> Option<(Checkout, NodeId)> {
        match &*self.binding.borrow() {
            Binding::Hydrated { checkout, id } => Some((checkout.clone(), *id)),
            Binding::Unhydrated { .. } => None,
        }
    }

    fn require(&self) -> Result<(Checkout, NodeId)> {
        self.resolve()
            .ok_or_else(|| Error::Usage("node is not attached to a checkout".into()))
    }

    pub fn parent(&self) -> Result<Option<TreeNode>> {
        let (checkout, id) = self.require()?;
        let parent = checkout.with_state(|state| {
            if !state.tree.known(id) {
                return Err(Error::UnknownNode(id));
            }
            Ok(state.tree.parent(id))
        })?;
        Ok(parent.map(|p| TreeNode::hydrated(checkout, p)))
    }

    pub fn children(&self) -> Result<Vec<TreeNode>> {
        let (checkout, id) = self.require()?;
        let children = checkout.with_state(|state| {
            state.tree.children(id).ok_or(Error::UnknownNode(id))
        })?;
        Ok(children
            .into_iter()
            .map(|c| TreeNode::hydrated(checkout.clone(), c))
            .collect())
    }

    pub fn payload(&self) -> Result<Option<Vec<u8>>> {
        let (checkout, id) = self.require()?;
        checkout.with_state(|state| {
            if !state.tree.known(id) {
                return Err(Error::UnknownNode(id));
            }
            Ok(state.tree.payload(id))
        })
    }

    /// Whether the node is reachable from the root (neither it nor an
    /// ancestor has been removed).
    pub fn is_in_document(&self) -> Result<bool> {
        let (checkout, id) = self.require()?;
        Ok(checkout.with_state(|state| state.tree.in_document(id)))
    }

    /// Create a new child under this node. The edit is optimistic and fires a
    /// change notification immediately.
    pub fn insert_child(&self, position: usize, payload: Option<Vec<u8>>) -> Result<TreeNode> {
        let (checkout, parent) = self.require()?;
        let node = checkout.allocate_node_id();
        checkout.perform(OperationKind::Insert {
            parent,
            node,
            position,
            payload,
        })?;
        Ok(TreeNode::hydrated(checkout, node))
    }

    /// Insert detached content under this node, hydrating it in place: after
    /// this succeeds every clone of `node`'s handle is attached to this
    /// checkout.
    pub fn insert_node(&self, position: usize, node: &TreeNode) -> Result<()> {
        let (checkout, parent) = self.require()?;
        let payload = match &*node.binding.borrow() {
            Binding::Hydrated { .. } => {
                return Err(Error::Usage(
                    "node is already attached to a checkout".into(),
                ));
            }
            Binding::Unhydrated { payload } => payload.clone(),
        };
        let id = checkout.allocate_node_id();
        checkout.perform(OperationKind::Insert {
            parent,
            node: id,
            position,
            payload,
        })?;
        *node.binding.borrow_mut() = Binding::Hydrated { checkout, id };
        Ok(())
    }

    pub fn move_to(&self, new_parent: &TreeNode, position: usize) -> Result<()> {
        let (checkout, id) = self.require()?;
        let (parent_checkout, parent_id) = new_parent.require()?;
        if !checkout.ptr_eq(&parent_checkout) {
            return Err(Error::Usage(
                "nodes belong to different checkouts".into(),
            ));
        }
        checkout.perform(OperationKind::Move {
            node: id,
            new_parent: parent_id,
            position,
        })?;
        Ok(())
    }

    pub fn remove(&self) -> Result<()> {
        let (checkout, id) = self.require()?;
        checkout.perform(OperationKind::Remove { node: id })?;
        Ok(())
    }

    pub fn set_payload(&self, payload: Option<Vec<u8>>) -> Result<()> {
        let (checkout, id) = self.require()?;
        checkout.perform(OperationKind::Payload { node: id, payload })?;
        Ok(())
    }
}

impl std::fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.binding.borrow() {
            Binding::Hydrated { id, .. } => f.debug_tuple("TreeNode").field(id).finish(),
            Binding::Unhydrated { .. } => f.write_str("TreeNode(unhydrated)"),
        }
    }
}
