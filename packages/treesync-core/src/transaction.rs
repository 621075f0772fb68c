use crate::checkout::Checkout;
use crate::constraint::Constraint;
use crate::error::{Error, TransactionError};
use crate::node::TreeNode;
use crate::view::TreeView;

/// Verdict of an edit closure, passed back to the caller unchanged.
///
/// `Rollback` is the rollback sentinel: returning it from an edit closure
/// aborts the transaction and discards its edits without raising an error.
/// Failures take the error channel of the closure's `Result` instead; both
/// paths trigger identical checkout-level abort behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome<R> {
    Commit(R),
    Rollback,
}

/// What a transaction can run against: a view, or any hydrated node of the
/// tree. Both resolve to the same (checkout, root) pair internally.
pub enum TransactionTarget<'a> {
    View(&'a TreeView),
    Node(&'a TreeNode),
}

impl<'a> From<&'a TreeView> for TransactionTarget<'a> {
    fn from(view: &'a TreeView) -> Self {
        TransactionTarget::View(view)
    }
}

impl<'a> From<&'a TreeNode> for TransactionTarget<'a> {
    fn from(node: &'a TreeNode) -> Self {
        TransactionTarget::Node(node)
    }
}

/// Apply one or more edits to the tree as a single atomic unit.
///
/// The edit closure receives the resolved root (the view's root, or the node
/// that was passed in) and runs synchronously to completion. Edits made inside
/// apply optimistically and fire a change notification each, but commit as one
/// grouped, revertible unit: remote clients observe all of them or none, and
/// an undo reverts them together.
///
/// `preconditions` are checked against current state before the closure runs;
/// a violated precondition aborts with a usage error and the closure is never
/// invoked. The constraints travel with the committed bundle so the ordering
/// collaborator can re-validate them after sequencing.
///
/// Outcome handling:
/// - the closure returns `Ok(Outcome::Commit(value))`: the transaction commits
///   and the value is passed through;
/// - the closure returns `Ok(Outcome::Rollback)`: the transaction aborts, all
///   of its edits are reverted, and the sentinel is passed through;
/// - the closure returns `Err(e)`: the transaction aborts and `e` comes back
///   unchanged as [`TransactionError::Edit`]. Rollback completes before this
///   function returns, so observers never see partially applied edits once the
///   failure is observable.
pub fn run_transaction<'t, T, F, R, E>(
    target: T,
    edit: F,
    preconditions: &[Constraint],
) -> Result<Outcome<R>, TransactionError<E>>
where
    T: Into<TransactionTarget<'t>>,
    F: FnOnce(TreeNode) -> Result<Outcome<R>, E>,
{
    let (checkout, root) = resolve(target.into())?;

    checkout.transaction_start();
    if let Err(err) = checkout.attach_constraints(preconditions) {
        checkout.transaction_abort().map_err(TransactionError::Engine)?;
        return Err(TransactionError::Engine(err));
    }

    match edit(root) {
        Ok(Outcome::Commit(value)) => {
            checkout
                .transaction_commit()
                .map_err(TransactionError::Engine)?;
            Ok(Outcome::Commit(value))
        }
        Ok(Outcome::Rollback) => {
            checkout
                .transaction_abort()
                .map_err(TransactionError::Engine)?;
            Ok(Outcome::Rollback)
        }
        Err(err) => {
            checkout
                .transaction_abort()
                .map_err(TransactionError::Engine)?;
            Err(TransactionError::Edit(err))
        }
    }
}

fn resolve<E>(target: TransactionTarget<'_>) -> Result<(Checkout, TreeNode), TransactionError<E>> {
    match target {
        TransactionTarget::View(view) => Ok((view.checkout().clone(), view.root())),
        TransactionTarget::Node(node) => match node.resolve() {
            Some((checkout, id)) => {
                let root = TreeNode::hydrated(checkout.clone(), id);
                Ok((checkout, root))
            }
            None => Err(TransactionError::Engine(Error::Usage(
                "transactions cannot be run on unhydrated nodes; they are not part of any checkout"
                    .into(),
            ))),
        },
    }
}

/// Check if the subtree defined by `node` contains `other`.
///
/// Returns true if `other` is an inclusive descendant of `node`: a node
/// contains itself, its children, and their children to any depth. Handy for
/// checking that moving `node` into `other` would create a cycle and would
/// thus be invalid. Walks the parents of `other` looking for `node`, so it
/// runs in time proportional to the depth of `other`.
///
/// Nodes from different checkouts never contain one another; a detached node
/// contains only itself.
pub fn contains(node: &TreeNode, other: &TreeNode) -> bool {
    if node.same_handle(other) {
        return true;
    }
    let (Some((checkout, ancestor)), Some((other_checkout, descendant))) =
        (node.resolve(), other.resolve())
    else {
        return false;
    };
    if !checkout.ptr_eq(&other_checkout) {
        return false;
    }
    checkout.with_state(|state| state.tree.is_ancestor(ancestor, descendant))
}
