//! Concurrent evaluation against a shared checker, including reloads

use galaxy_access::access::{ContextObject, InMemoryStore, PolicyDocument};
use galaxy_access::settings::AccessSettings;
use galaxy_access::{AccessChecker, EvaluationRequest, Principal, ResourceContext};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn store() -> InMemoryStore {
    let mut store = InMemoryStore::new();
    for i in 0..20 {
        store.add_namespace_owner(&format!("ns{}", i), &format!("u{}", i));
    }
    store
}

#[test]
fn test_concurrent_decisions_match_sequential() {
    let checker = AccessChecker::builtin().unwrap();
    let settings = AccessSettings::default();
    let store = store();

    // Owner i may update owners of namespace i; nobody else may
    let decide = |user: usize, ns: usize| {
        let ctx = ResourceContext::new(&settings, &store)
            .with_object(ContextObject::new("namespace", format!("ns{}", ns)));
        let principal = Principal::user(format!("u{}", user), format!("user{}", user));
        checker.has_permission(&EvaluationRequest::new(
            "NamespaceOwnersViewSet",
            "update",
            &principal,
            &ctx,
        ))
    };

    let mismatches = AtomicUsize::new(0);
    crossbeam::scope(|s| {
        for _ in 0..8 {
            s.spawn(|_| {
                for _ in 0..200 {
                    let user = rand::random::<usize>() % 20;
                    let ns = rand::random::<usize>() % 20;
                    if decide(user, ns) != (user == ns) {
                        mismatches.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    })
    .unwrap();

    assert_eq!(mismatches.load(Ordering::Relaxed), 0);
}

#[test]
fn test_reload_during_evaluation() {
    let checker = AccessChecker::builtin().unwrap();
    let settings = AccessSettings::default();
    let store = InMemoryStore::new();
    let anon = Principal::anonymous();

    let closed: PolicyDocument = serde_json::from_value(json!({
        "version": "1.0.0",
        "resources": {"TagViewSet": {"statements": {"standalone": [
            {"action": "*", "principal": "authenticated", "effect": "allow"}
        ]}}}
    }))
    .unwrap();

    let observed = Mutex::new(Vec::new());
    crossbeam::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                let ctx = ResourceContext::new(&settings, &store);
                let request = EvaluationRequest::new("TagViewSet", "list", &anon, &ctx);
                let mut seen = Vec::with_capacity(500);
                for _ in 0..500 {
                    seen.push(checker.has_permission(&request));
                }
                observed.lock().extend(seen);
            });
        }
        s.spawn(|_| {
            checker.reload(closed.clone()).unwrap();
        });
    })
    .unwrap();

    // Every answer came from one complete snapshot or the other
    assert_eq!(observed.lock().len(), 2000);

    // After the swap the new table is in force everywhere
    let ctx = ResourceContext::new(&settings, &store);
    assert!(!checker.has_permission(&EvaluationRequest::new("TagViewSet", "list", &anon, &ctx)));
    assert!(!checker.snapshot().table().contains("NamespaceViewSet"));
}

#[test]
fn test_cloned_checkers_share_reloads() {
    let checker = AccessChecker::builtin().unwrap();
    let clone = checker.clone();

    let document: PolicyDocument = serde_json::from_value(json!({
        "version": "1.0.0",
        "resources": {"OnlyViewSet": {}}
    }))
    .unwrap();
    checker.reload(document).unwrap();

    assert!(clone.snapshot().table().contains("OnlyViewSet"));
    assert_eq!(clone.snapshot().table().len(), 1);
}
