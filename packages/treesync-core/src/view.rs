use crate::checkout::Checkout;
use crate::ids::NodeId;
use crate::node::TreeNode;

/// A view over a checkout's tree, the usual entry point for reading and
/// editing. Resolving a view yields its checkout and current root.
pub struct TreeView {
    checkout: Checkout,
}

impl TreeView {
    pub fn new(checkout: Checkout) -> Self {
        Self { checkout }
    }

    pub fn checkout(&self) -> &Checkout {
        &self.checkout
    }

    pub fn root(&self) -> TreeNode {
        TreeNode::hydrated(self.checkout.clone(), NodeId::ROOT)
    }
}
