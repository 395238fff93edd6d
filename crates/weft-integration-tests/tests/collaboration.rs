//! Collaboration lock contention across join and leave.

use weft_collab::{CollabError, ElementKind, SessionEngine};
use weft_core::{UserId, WorkflowId};

/// Lock contention: U1 holds the lock, U2 is refused and told who owns it,
/// and U1 leaving frees the element for U2.
#[test]
fn lock_contention_resolves_on_leave() {
    let engine = SessionEngine::new();
    let graph = WorkflowId::new();
    let (u1, u2) = (UserId::new("u1"), UserId::new("u2"));

    engine.join_session(graph, &u1, "Ada");
    engine.join_session(graph, &u2, "Grace");

    engine
        .acquire_lock(graph, &u1, "n1", ElementKind::Node)
        .expect("first writer wins");

    let err = engine
        .acquire_lock(graph, &u2, "n1", ElementKind::Node)
        .unwrap_err();
    match err {
        CollabError::LockHeld { owner, .. } => assert_eq!(owner, u1),
        other => panic!("unexpected error: {other}"),
    }

    let outcome = engine.leave_session(graph, &u1).unwrap();
    assert_eq!(outcome.released_locks, vec!["n1".to_owned()]);

    let lock = engine
        .acquire_lock(graph, &u2, "n1", ElementKind::Node)
        .expect("freed after the owner left");
    assert_eq!(lock.owner, u2);
}

/// The element lock invariant: at any instant one element holds at most one
/// live lock, even under contending threads.
#[test]
fn one_live_lock_per_element_under_contention() {
    use std::sync::Arc;

    let engine = Arc::new(SessionEngine::new());
    let graph = WorkflowId::new();
    for i in 0..8 {
        engine.join_session(graph, &UserId::new(format!("u{i}")), "editor");
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                engine
                    .acquire_lock(graph, &UserId::new(format!("u{i}")), "n1", ElementKind::Node)
                    .is_ok()
            })
        })
        .collect();
    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap_or(false))
        .filter(|granted| *granted)
        .count();

    assert_eq!(granted, 1);
    assert_eq!(engine.get_active_locks(graph).len(), 1);
}
