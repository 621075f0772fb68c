use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::tree::TreeState;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A precondition attached to a transaction.
///
/// Constraints are evaluated twice: against current state when attached
/// (fail-fast, before the edit closure runs) and again by the ordering
/// collaborator once the grouped change has been sequenced. The descriptors
/// must therefore be self-contained and serializable.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Constraint {
    /// The node resolves and is in the document (neither it nor any ancestor
    /// has been removed).
    NodeExists { node: NodeId },
    /// The node is in the document and still has the given parent
    /// (`None` means the node is the root).
    NodeHasParent {
        node: NodeId,
        parent: Option<NodeId>,
    },
}

/// Which of the two evaluation points is running.
///
/// `Initial` violations are caller misuse and surface as usage errors.
/// `Retroactive` violations mean a sequenced bundle must be dropped; the
/// collaborator rolls it back silently and the original caller never hears
/// about it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckScope {
    Initial,
    Retroactive,
}

pub(crate) fn check(
    tree: &TreeState,
    scope: CheckScope,
    constraints: &[Constraint],
) -> Result<()> {
    for constraint in constraints {
        if let Some(violation) = violation_of(tree, constraint) {
            return Err(match scope {
                CheckScope::Initial => {
                    Error::Usage(format!("transaction precondition violated: {violation}"))
                }
                CheckScope::Retroactive => Error::ConstraintViolated(violation),
            });
        }
    }
    Ok(())
}

/// A constraint referencing a node that no longer resolves is a violation,
/// not a crash.
fn violation_of(tree: &TreeState, constraint: &Constraint) -> Option<String> {
    match constraint {
        Constraint::NodeExists { node } => {
            if tree.in_document(*node) {
                None
            } else {
                Some(format!("node {node:?} is not in the document"))
            }
        }
        Constraint::NodeHasParent { node, parent } => {
            if !tree.in_document(*node) {
                Some(format!("node {node:?} is not in the document"))
            } else if tree.parent(*node) != *parent {
                Some(format!("node {node:?} no longer has parent {parent:?}"))
            } else {
                None
            }
        }
    }
}
