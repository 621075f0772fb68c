use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::constraint::{self, CheckScope, Constraint};
use crate::error::{Error, Result};
use crate::ids::{Lamport, NodeId, ReplicaId};
use crate::ops::{ChangeBundle, Operation, OperationKind};
use crate::tree::{EditSnapshot, NodeExport, TreeState};

/// Basic Lamport clock stamping locally issued operations.
#[derive(Clone, Debug, Default)]
pub struct LamportClock {
    counter: Lamport,
}

impl LamportClock {
    pub fn tick(&mut self) -> Lamport {
        self.counter += 1;
        self.counter
    }

    pub fn now(&self) -> Lamport {
        self.counter
    }
}

/// Notification delivered to checkout observers.
///
/// One `Edited` fires per individual edit as it is applied (edits inside a
/// transaction are not batched into a single notification), and one
/// `RolledBack` fires per aborted transaction level.
#[derive(Clone, Debug)]
pub enum TreeEvent {
    Edited(Operation),
    RolledBack,
}

/// Handle returned by [`Checkout::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserverId(u64);

type ObserverFn = dyn FnMut(&TreeEvent);

#[derive(Default)]
struct Observers {
    next_id: u64,
    entries: Vec<(u64, Rc<RefCell<ObserverFn>>)>,
}

struct LogEntry {
    op: Operation,
    snapshot: EditSnapshot,
}

/// One open transaction level: the edits applied since its `start` (with the
/// snapshots needed to revert them) and the constraints attached to it.
#[derive(Default)]
struct TxnFrame {
    entries: Vec<LogEntry>,
    constraints: Vec<Constraint>,
}

pub(crate) struct CheckoutState {
    replica: ReplicaId,
    counter: u64,
    clock: LamportClock,
    pub(crate) tree: TreeState,
    frames: Vec<TxnFrame>,
    outbox: Vec<ChangeBundle>,
}

struct CheckoutShared {
    state: RefCell<CheckoutState>,
    observers: RefCell<Observers>,
}

/// The live, mutable view of the shared tree that a client edits against.
///
/// A `Checkout` is a cheaply cloneable handle; all clones observe the same
/// state. Everything here is single-threaded and synchronous: an edit, a
/// commit, or an abort runs to completion before control returns, which is
/// what makes a transaction's edits indivisible for local observers.
#[derive(Clone)]
pub struct Checkout {
    shared: Rc<CheckoutShared>,
}

impl Checkout {
    pub fn new(replica: ReplicaId) -> Self {
        Self {
            shared: Rc::new(CheckoutShared {
                state: RefCell::new(CheckoutState {
                    replica,
                    counter: 0,
                    clock: LamportClock::default(),
                    tree: TreeState::new(),
                    frames: Vec::new(),
                    outbox: Vec::new(),
                }),
                observers: RefCell::new(Observers::default()),
            }),
        }
    }

    /// Whether two handles refer to the same checkout.
    pub fn ptr_eq(&self, other: &Checkout) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Current transaction nesting depth; 0 means settled.
    pub fn transaction_depth(&self) -> usize {
        self.shared.state.borrow().frames.len()
    }

    /// Open a new transaction level. Edits made until the matching commit or
    /// abort are recorded for potential revert.
    pub fn transaction_start(&self) {
        let mut state = self.shared.state.borrow_mut();
        state.frames.push(TxnFrame::default());
        trace!(depth = state.frames.len(), "transaction started");
    }

    /// Close the innermost transaction level, keeping its edits.
    ///
    /// A nested commit folds the level's edits and constraints into the
    /// enclosing transaction; they stay revertible by an outer abort. The
    /// outermost commit finalizes the accumulated edits as one [`ChangeBundle`]
    /// in the outbox.
    pub fn transaction_commit(&self) -> Result<()> {
        let mut state = self.shared.state.borrow_mut();
        let Some(frame) = state.frames.pop() else {
            return Err(Error::Usage("commit without an open transaction".into()));
        };
        if let Some(parent) = state.frames.last_mut() {
            trace!("nested transaction folded into parent");
            parent.entries.extend(frame.entries);
            parent.constraints.extend(frame.constraints);
        } else if !frame.entries.is_empty() {
            debug!(
                ops = frame.entries.len(),
                constraints = frame.constraints.len(),
                "transaction committed"
            );
            state.outbox.push(ChangeBundle {
                ops: frame.entries.into_iter().map(|e| e.op).collect(),
                constraints: frame.constraints,
            });
        }
        Ok(())
    }

    /// Close the innermost transaction level, reverting its edits in reverse
    /// order. Emits exactly one rollback notification. Levels below stay open
    /// and keep their edits.
    pub fn transaction_abort(&self) -> Result<()> {
        {
            let mut state = self.shared.state.borrow_mut();
            let Some(frame) = state.frames.pop() else {
                return Err(Error::Usage("abort without an open transaction".into()));
            };
            debug!(reverted = frame.entries.len(), "transaction aborted");
            for entry in frame.entries.iter().rev() {
                state.tree.revert(&entry.op.kind, &entry.snapshot);
            }
        }
        self.emit(&TreeEvent::RolledBack);
        Ok(())
    }

    /// Attach preconditions to the innermost open transaction.
    ///
    /// Each constraint is checked against current state immediately; a
    /// violation is a usage error and nothing is attached. On success the
    /// constraints travel with the eventual bundle so the ordering
    /// collaborator can re-validate them after sequencing.
    pub fn attach_constraints(&self, constraints: &[Constraint]) -> Result<()> {
        let mut state = self.shared.state.borrow_mut();
        if state.frames.is_empty() {
            return Err(Error::Usage(
                "constraints can only be attached to an open transaction".into(),
            ));
        }
        constraint::check(&state.tree, CheckScope::Initial, constraints)?;
        if let Some(frame) = state.frames.last_mut() {
            frame.constraints.extend_from_slice(constraints);
        }
        Ok(())
    }

    /// Evaluate constraints against current state. The ordering collaborator
    /// calls this with [`CheckScope::Retroactive`] once a bundle has been
    /// sequenced, dropping the bundle on violation.
    pub fn check_constraints(&self, scope: CheckScope, constraints: &[Constraint]) -> Result<()> {
        let state = self.shared.state.borrow();
        let result = constraint::check(&state.tree, scope, constraints);
        if let (CheckScope::Retroactive, Err(err)) = (scope, &result) {
            warn!(%err, "sequenced bundle no longer satisfies its constraints");
        }
        result
    }

    /// Register an observer for change and rollback notifications.
    /// Observers run after the state mutation completes and may read the tree.
    pub fn subscribe(&self, observer: impl FnMut(&TreeEvent) + 'static) -> ObserverId {
        let mut observers = self.shared.observers.borrow_mut();
        observers.next_id += 1;
        let id = observers.next_id;
        let observer: Rc<RefCell<ObserverFn>> = Rc::new(RefCell::new(observer));
        observers.entries.push((id, observer));
        ObserverId(id)
    }

    /// Remove an observer. Returns false if the id was already gone.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.shared.observers.borrow_mut();
        let before = observers.entries.len();
        observers.entries.retain(|(entry_id, _)| *entry_id != id.0);
        observers.entries.len() != before
    }

    /// Drain the committed bundles awaiting transmission to the ordering
    /// collaborator.
    pub fn take_outbox(&self) -> Vec<ChangeBundle> {
        std::mem::take(&mut self.shared.state.borrow_mut().outbox)
    }

    /// Number of committed bundles awaiting transmission.
    pub fn pending_bundles(&self) -> usize {
        self.shared.state.borrow().outbox.len()
    }

    /// Current Lamport time as observed by this checkout.
    pub fn lamport(&self) -> Lamport {
        self.shared.state.borrow().clock.now()
    }

    /// Sorted structural snapshot of the whole tree.
    pub fn export(&self) -> Vec<NodeExport> {
        self.shared.state.borrow().tree.export()
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&CheckoutState) -> R) -> R {
        f(&self.shared.state.borrow())
    }

    pub(crate) fn allocate_node_id(&self) -> NodeId {
        let mut state = self.shared.state.borrow_mut();
        state.counter += 1;
        NodeId::derive(&state.replica, state.counter)
    }

    /// Validate and apply one edit, stamp it, and record it against the
    /// innermost transaction (or ship it as its own single-op bundle when no
    /// transaction is open). The change notification fires after the state
    /// borrow is released so observers can read the tree.
    pub(crate) fn perform(&self, kind: OperationKind) -> Result<Operation> {
        let op = {
            let mut state = self.shared.state.borrow_mut();
            let snapshot = state.tree.apply(&kind)?;
            state.counter += 1;
            let counter = state.counter;
            let lamport = state.clock.tick();
            let op = Operation::new(&state.replica, counter, lamport, kind);
            if let Some(frame) = state.frames.last_mut() {
                frame.entries.push(LogEntry {
                    op: op.clone(),
                    snapshot,
                });
            } else {
                state.outbox.push(ChangeBundle {
                    ops: vec![op.clone()],
                    constraints: Vec::new(),
                });
            }
            op
        };
        self.emit(&TreeEvent::Edited(op.clone()));
        Ok(op)
    }

    fn emit(&self, event: &TreeEvent) {
        let snapshot: Vec<Rc<RefCell<ObserverFn>>> = self
            .shared
            .observers
            .borrow()
            .entries
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in snapshot {
            (&mut *observer.borrow_mut())(event);
        }
    }
}
