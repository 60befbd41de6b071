//! Mutable registry of mounted reducers.

use crate::error::Result;
use crate::facade::StoreFacade;
use crate::registry::combine::combine;
use crate::registry::entry::{entries_from_schema, entry_keys, Entry, ReducerSchema};
use crate::types::{Action, RootReducer, Scope, REDUCERS_INJECTED, REDUCERS_REMOVED};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Owns the entry list for one store instance.
///
/// Every mutation synchronously recombines the root reducer and installs it
/// via `replace_reducer` before the bookkeeping action is dispatched, so any
/// listener of that action already observes the new shape.
pub struct ReducerRegistry {
    facade: Arc<dyn StoreFacade>,
    entries: Mutex<Vec<Entry>>,
}

impl ReducerRegistry {
    /// Create a registry driving the given facade.
    pub fn new(facade: Arc<dyn StoreFacade>) -> Self {
        Self {
            facade,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Mount one or more reducers.
    ///
    /// Fails fast with `StoreError::UnscopedReducer` when `schema` is a bare
    /// reducer and the scope has no namespace; the registry is untouched in
    /// that case.
    pub fn inject(&self, schema: ReducerSchema, scope: Scope) -> Result<()> {
        let added = entries_from_schema(&schema, &scope)?;
        if added.is_empty() {
            return Ok(());
        }
        let keys = entry_keys(&added);

        {
            let mut entries = self.entries.lock();
            entries.extend(added);
            self.facade.replace_reducer(combine(&entries));
        }

        debug!(?keys, namespace = ?scope.namespace, feature = ?scope.feature, "reducers injected");
        self.facade
            .dispatch(bookkeeping(REDUCERS_INJECTED, &keys, &scope));
        Ok(())
    }

    /// Unmount previously mounted reducers.
    ///
    /// Removes exactly one structurally-equal occurrence per supplied entry;
    /// entries that were never mounted are ignored. When nothing matches the
    /// whole call is a no-op. Branches whose last registration went away are
    /// pruned from the state tree when the `REDUCERS_REMOVED` action flows
    /// through the freshly installed root.
    pub fn eject(&self, schema: ReducerSchema, scope: Scope) -> Result<()> {
        let targets = entries_from_schema(&schema, &scope)?;
        let keys = entry_keys(&targets);

        let removed_any = {
            let mut entries = self.entries.lock();
            let mut removed = Vec::new();
            for target in &targets {
                if let Some(index) = entries.iter().position(|entry| entry == target) {
                    removed.push(mount_path(&entries.remove(index)));
                }
            }
            let removed_any = !removed.is_empty();
            if removed_any {
                let orphaned = orphaned_paths(removed, &entries);
                self.facade
                    .replace_reducer(with_pruning(combine(&entries), orphaned));
            }
            removed_any
        };

        if removed_any {
            debug!(?keys, namespace = ?scope.namespace, feature = ?scope.feature, "reducers removed");
            self.facade
                .dispatch(bookkeeping(REDUCERS_REMOVED, &keys, &scope));
        }
        Ok(())
    }

    /// Number of currently mounted entries.
    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Address at which an entry mounts in the state tree.
fn mount_path(entry: &Entry) -> Vec<String> {
    let mut path = entry.prefix();
    path.extend(entry.path.iter().cloned());
    path
}

/// Removed mount paths that no remaining entry overlaps with.
///
/// A path still covered by a surviving duplicate, or by a registration above
/// or below it in the tree, must not be pruned.
fn orphaned_paths(removed: Vec<Vec<String>>, remaining: &[Entry]) -> Vec<Vec<String>> {
    let live: Vec<Vec<String>> = remaining.iter().map(mount_path).collect();
    let mut orphaned: Vec<Vec<String>> = removed
        .into_iter()
        .filter(|path| {
            !path.is_empty()
                && !live
                    .iter()
                    .any(|other| other.starts_with(path) || path.starts_with(other))
        })
        .collect();
    orphaned.sort();
    orphaned.dedup();
    orphaned
}

/// Build a bookkeeping action carrying the affected keys and scope.
fn bookkeeping(kind: &str, keys: &[String], scope: &Scope) -> Action {
    let mut payload = Map::new();
    payload.insert("reducers".to_string(), json!(keys));
    if let Some(namespace) = &scope.namespace {
        payload.insert("namespace".to_string(), json!(namespace));
    }
    if let Some(feature) = &scope.feature {
        payload.insert("feature".to_string(), json!(feature));
    }
    Action::new(kind).with_payload(Value::Object(payload))
}

/// Wrap a combined root so that ejected branches are removed from the state
/// tree entirely, not merely left behind: when the `REDUCERS_REMOVED` action
/// flows through, the orphaned paths are deleted and emptied ancestors are
/// dropped with them.
fn with_pruning(inner: RootReducer, orphaned: Vec<Vec<String>>) -> RootReducer {
    Arc::new(move |state: Option<&Arc<Value>>, action: &Action| {
        let next = inner(state, action);
        if action.kind != REDUCERS_REMOVED || orphaned.is_empty() {
            return next;
        }

        let mut value = (*next).clone();
        if prune_paths(&mut value, &orphaned) {
            Arc::new(value)
        } else {
            next
        }
    })
}

fn prune_paths(state: &mut Value, paths: &[Vec<String>]) -> bool {
    let mut changed = false;
    for path in paths {
        changed |= remove_path(state, path);
    }
    changed
}

/// Remove the value at `path`, dropping ancestor objects that end up empty.
fn remove_path(value: &mut Value, path: &[String]) -> bool {
    let Some(map) = value.as_object_mut() else {
        return false;
    };
    match path {
        [] => false,
        [last] => map.remove(last).is_some(),
        [head, rest @ ..] => {
            let Some(child) = map.get_mut(head) else {
                return false;
            };
            let removed = remove_path(child, rest);
            if removed && child.as_object().is_some_and(Map::is_empty) {
                map.remove(head);
            }
            removed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_entry(key: &str, namespace: Option<&str>) -> Entry {
        Entry {
            path: vec![key.to_string()],
            value: ReducerSchema::reducer(|state, _| {
                state.cloned().unwrap_or(Value::Null)
            }),
            namespace: namespace.map(str::to_string),
            feature: None,
        }
    }

    #[test]
    fn test_remove_path_drops_empty_ancestors() {
        let mut state = json!({"namespaces": {"nsA": {"a": 1}}, "kept": true});
        let removed = remove_path(
            &mut state,
            &["namespaces".into(), "nsA".into(), "a".into()],
        );
        assert!(removed);
        assert_eq!(state, json!({"kept": true}));
    }

    #[test]
    fn test_remove_path_keeps_nonempty_ancestors() {
        let mut state = json!({"namespaces": {"nsA": {"a": 1, "b": 2}}});
        let removed = remove_path(
            &mut state,
            &["namespaces".into(), "nsA".into(), "a".into()],
        );
        assert!(removed);
        assert_eq!(state, json!({"namespaces": {"nsA": {"b": 2}}}));
    }

    #[test]
    fn test_remove_missing_path_is_noop() {
        let mut state = json!({"a": 1});
        assert!(!remove_path(&mut state, &["b".into()]));
        assert_eq!(state, json!({"a": 1}));
    }

    #[test]
    fn test_orphaned_paths_respect_surviving_duplicates() {
        let survivor = noop_entry("a", None);
        let orphaned = orphaned_paths(vec![vec!["a".to_string()]], &[survivor]);
        assert!(orphaned.is_empty());
    }

    #[test]
    fn test_orphaned_paths_respect_registrations_below() {
        // A bare-reducer mount at the namespace root was removed, but a keyed
        // registration still lives underneath it.
        let below = noop_entry("a", Some("nsA"));
        let orphaned = orphaned_paths(
            vec![vec!["namespaces".to_string(), "nsA".to_string()]],
            &[below],
        );
        assert!(orphaned.is_empty());
    }

    #[test]
    fn test_fully_orphaned_path_is_pruned() {
        let unrelated = noop_entry("b", None);
        let orphaned = orphaned_paths(
            vec![vec!["namespaces".to_string(), "nsA".to_string(), "a".to_string()]],
            &[unrelated],
        );
        assert_eq!(orphaned.len(), 1);
    }

    #[test]
    fn test_bookkeeping_payload_shape() {
        let action = bookkeeping(
            REDUCERS_REMOVED,
            &["a".to_string()],
            &Scope::namespace("nsA"),
        );
        assert_eq!(
            action.payload,
            Some(json!({"reducers": ["a"], "namespace": "nsA"}))
        );
    }
}
