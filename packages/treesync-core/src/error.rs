use thiserror::Error;

use crate::ids::NodeId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("usage error: {0}")]
    Usage(String),
    #[error("constraint violated: {0}")]
    ConstraintViolated(String),
    #[error("unknown node: {0:?}")]
    UnknownNode(NodeId),
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
}

/// Error surfaced by `run_transaction`.
///
/// Rollback of the open transaction always completes before either variant is
/// returned, so callers never observe partially applied edits alongside one of
/// these.
#[derive(Error, Debug, PartialEq)]
pub enum TransactionError<E> {
    /// The engine rejected or failed the transaction itself (unhydrated
    /// target, violated precondition, unbalanced commit/abort).
    #[error(transparent)]
    Engine(#[from] Error),
    /// The edit closure failed. The closure's error is carried unchanged so
    /// callers can match on their own error types.
    #[error("transaction rolled back: {0}")]
    Edit(E),
}
