//! Error handling: preconditions, tolerated no-ops, missing namespaces.

use modstore::{
    Action, InMemoryStore, ModuleStore, ReducerSchema, Scope, StoreError, StoreFacade,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn test_store() -> (ModuleStore, Arc<InMemoryStore>) {
    let facade = Arc::new(InMemoryStore::new());
    let store = ModuleStore::new(Arc::clone(&facade) as Arc<dyn StoreFacade>);
    (store, facade)
}

fn counter() -> ReducerSchema {
    ReducerSchema::reducer(|state, action| {
        let current = state.and_then(Value::as_i64).unwrap_or(0);
        match action.kind.as_str() {
            "INC" => json!(current + 1),
            _ => json!(current),
        }
    })
}

#[test]
fn test_bare_reducer_without_namespace_fails_fast() {
    let (store, _facade) = test_store();

    let result = store.inject_reducers(counter(), Scope::global());
    assert!(matches!(result, Err(StoreError::UnscopedReducer)));

    // The check runs before any mutation: nothing was mounted.
    assert_eq!(store.reducer_count(), 0);
    assert_eq!(store.state(), None);
}

#[test]
fn test_failed_inject_leaves_registry_usable() {
    let (store, facade) = test_store();

    let _ = store.inject_reducers(counter(), Scope::global());
    store
        .inject_reducers(ReducerSchema::map([("a", counter())]), Scope::global())
        .unwrap();

    facade.dispatch(Action::new("INC"));
    assert_eq!(*store.state().unwrap(), json!({"a": 1}));
}

#[test]
fn test_ejecting_unknown_entries_is_a_noop() {
    let (store, facade) = test_store();

    store
        .inject_reducers(ReducerSchema::map([("a", counter())]), Scope::global())
        .unwrap();
    facade.dispatch(Action::new("INC"));
    let before = store.state().unwrap();

    // A structurally different registration matches nothing.
    store
        .eject_reducers(ReducerSchema::map([("a", counter())]), Scope::global())
        .unwrap();
    assert_eq!(store.reducer_count(), 1);
    assert!(Arc::ptr_eq(&before, &store.state().unwrap()));

    // Same for a scope that was never used.
    store
        .eject_reducers(ReducerSchema::map([("a", counter())]), Scope::namespace("nsA"))
        .unwrap();
    assert_eq!(store.reducer_count(), 1);
}

#[test]
fn test_double_eject_tolerates_teardown_races() {
    let (store, _facade) = test_store();
    let schema = ReducerSchema::map([("a", counter())]);

    store.inject_reducers(schema.clone(), Scope::global()).unwrap();
    store.eject_reducers(schema.clone(), Scope::global()).unwrap();
    // The second unmount of the same registration must not error.
    store.eject_reducers(schema, Scope::global()).unwrap();
    assert_eq!(store.reducer_count(), 0);
}
