use std::cell::Cell;

use treesync_core::{
    CheckScope, Checkout, Constraint, Error, Outcome, ReplicaId, TransactionError, TreeView,
    run_transaction,
};

fn sample_view() -> TreeView {
    TreeView::new(Checkout::new(ReplicaId::new(b"a")))
}

#[test]
fn violated_preconditions_gate_the_edit_closure() {
    let view = sample_view();
    let child = view.root().insert_child(0, None).unwrap();
    let other = view.root().insert_child(1, None).unwrap();
    let expected_parent = Constraint::NodeHasParent {
        node: child.id().unwrap(),
        parent: Some(view.root().id().unwrap()),
    };

    // a concurrent local mutation invalidates the precondition before the
    // transaction starts
    child.move_to(&other, 0).unwrap();

    let invocations = Cell::new(0u32);
    let result: Result<Outcome<()>, TransactionError<Error>> = run_transaction(
        &view,
        |_root| {
            invocations.set(invocations.get() + 1);
            Ok(Outcome::Commit(()))
        },
        &[expected_parent],
    );

    assert!(matches!(
        result,
        Err(TransactionError::Engine(Error::Usage(_)))
    ));
    assert_eq!(invocations.get(), 0);
    assert_eq!(view.checkout().transaction_depth(), 0);
}

#[test]
fn satisfied_preconditions_travel_with_the_bundle() {
    let view = sample_view();
    let child = view.root().insert_child(0, None).unwrap();
    view.checkout().take_outbox();

    let exists = Constraint::NodeExists {
        node: child.id().unwrap(),
    };
    let result: Result<Outcome<()>, TransactionError<Error>> = run_transaction(
        &view,
        |root| {
            root.insert_child(1, None)?;
            Ok(Outcome::Commit(()))
        },
        std::slice::from_ref(&exists),
    );
    assert_eq!(result, Ok(Outcome::Commit(())));

    let bundles = view.checkout().take_outbox();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].constraints, vec![exists]);
}

#[test]
fn sequenced_bundles_are_revalidated_retroactively() {
    let view = sample_view();
    let child = view.root().insert_child(0, None).unwrap();
    view.checkout().take_outbox();

    let result: Result<Outcome<()>, TransactionError<Error>> = run_transaction(
        &view,
        |root| {
            root.insert_child(1, None)?;
            Ok(Outcome::Commit(()))
        },
        &[Constraint::NodeExists {
            node: child.id().unwrap(),
        }],
    );
    assert_eq!(result, Ok(Outcome::Commit(())));
    let bundle = view.checkout().take_outbox().remove(0);

    // held valid at commit time
    view.checkout()
        .check_constraints(CheckScope::Retroactive, &bundle.constraints)
        .unwrap();

    // the tree moved on before the bundle was sequenced; the collaborator
    // must now drop it
    child.remove().unwrap();
    let err = view
        .checkout()
        .check_constraints(CheckScope::Retroactive, &bundle.constraints)
        .unwrap_err();
    assert!(matches!(err, Error::ConstraintViolated(_)));
}

#[test]
fn a_constraint_on_a_missing_node_is_a_violation() {
    let view = sample_view();
    let invocations = Cell::new(0u32);

    let result: Result<Outcome<()>, TransactionError<Error>> = run_transaction(
        &view,
        |_root| {
            invocations.set(invocations.get() + 1);
            Ok(Outcome::Commit(()))
        },
        &[Constraint::NodeExists {
            node: treesync_core::NodeId(0xdead),
        }],
    );

    assert!(matches!(
        result,
        Err(TransactionError::Engine(Error::Usage(_)))
    ));
    assert_eq!(invocations.get(), 0);
}

#[test]
fn the_checkout_is_usable_after_a_rejected_precondition() {
    let view = sample_view();
    let child = view.root().insert_child(0, None).unwrap();
    child.remove().unwrap();

    let result: Result<Outcome<()>, TransactionError<Error>> = run_transaction(
        &view,
        |_root| Ok(Outcome::Commit(())),
        &[Constraint::NodeExists {
            node: child.id().unwrap(),
        }],
    );
    assert!(result.is_err());

    // rejected preconditions leave no transaction open
    let follow_up: Result<Outcome<()>, TransactionError<Error>> = run_transaction(
        &view,
        |root| {
            root.insert_child(0, None)?;
            Ok(Outcome::Commit(()))
        },
        &[],
    );
    assert_eq!(follow_up, Ok(Outcome::Commit(())));
}

#[test]
fn empty_precondition_lists_are_legal() {
    let view = sample_view();
    let result: Result<Outcome<()>, TransactionError<Error>> =
        run_transaction(&view, |_root| Ok(Outcome::Commit(())), &[]);
    assert_eq!(result, Ok(Outcome::Commit(())));
}
