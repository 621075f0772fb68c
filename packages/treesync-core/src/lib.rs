#![forbid(unsafe_code)]
//! Checkout and transaction engine for a collaborative shared tree.
//!
//! A [`Checkout`] holds the live tree a client edits against. Edits apply
//! optimistically and synchronously; [`run_transaction`] groups a sequence of
//! them into one atomic, revertible unit that either commits (becoming a
//! single [`ChangeBundle`] for the distributed ordering collaborator) or rolls
//! back, whether by the [`Outcome::Rollback`] sentinel, an edit failure, or a
//! violated [`Constraint`]. The ordering service, transport, and merge
//! algorithm for concurrent remote edits live outside this crate; the seam is
//! the checkout's outbox plus retroactive constraint checking.

pub mod checkout;
pub mod constraint;
pub mod error;
pub mod ids;
pub mod node;
pub mod ops;
pub mod transaction;
pub mod tree;
pub mod view;

pub use checkout::{Checkout, LamportClock, ObserverId, TreeEvent};
pub use constraint::{CheckScope, Constraint};
pub use error::{Error, Result, TransactionError};
pub use ids::{Lamport, NodeId, OperationId, ReplicaId};
pub use node::TreeNode;
pub use ops::{ChangeBundle, Operation, OperationKind, OperationMetadata};
pub use transaction::{contains, run_transaction, Outcome, TransactionTarget};
pub use tree::NodeExport;
pub use view::TreeView;
