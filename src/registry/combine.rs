//! Tree combination of mounted reducers.
//!
//! `combine` folds an entry list into a nested tree keyed by the addressing
//! rule in `entry.rs`, then recursively turns each level into a single
//! function. Functions registered under `ROOT_KEY` at a level right-fold
//! (rightmost first) over the subtree value, after any child keys have
//! produced theirs.
//!
//! Internally every node returns `Reduced` so that "nothing changed here"
//! propagates upward without rebuilding the subtree; at the root an untouched
//! dispatch hands back the same `Arc` it was given.

use crate::registry::entry::{Entry, ReducerSchema};
use crate::scope::is_from_namespace;
use crate::types::{Action, Reducer, RootReducer, ROOT_KEY};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of running one tree node against an action.
enum Reduced {
    /// The node's value is identical to what it was given.
    Unchanged,
    /// The node produced a new value.
    Changed(Value),
}

type NodeFn = Box<dyn Fn(Option<&Value>, &Action) -> Reduced + Send + Sync>;

#[derive(Default)]
struct SchemaTree {
    children: BTreeMap<String, SchemaTree>,
    /// Functions mounted at this level, in registration order.
    here: Vec<NodeFn>,
}

impl SchemaTree {
    /// Insert a function at `address`. The terminal segment must be
    /// `ROOT_KEY`; the segments before it name child nodes.
    fn insert(&mut self, address: &[String], reducer: Reducer, namespace: Option<String>) {
        match address {
            [segment] if segment == ROOT_KEY => self.here.push(leaf(reducer, namespace)),
            [segment, rest @ ..] => self
                .children
                .entry(segment.clone())
                .or_default()
                .insert(rest, reducer, namespace),
            [] => {}
        }
    }
}

/// Adapt a registered reducer into a change-tracking node function.
///
/// A mismatched namespace skips the reducer entirely, so a foreign action can
/// never fabricate a change in this subtree.
fn leaf(reducer: Reducer, namespace: Option<String>) -> NodeFn {
    Box::new(move |state: Option<&Value>, action: &Action| {
        if !is_from_namespace(namespace.as_deref(), action) {
            return Reduced::Unchanged;
        }
        let next = reducer(state, action);
        match state {
            Some(previous) if *previous == next => Reduced::Unchanged,
            _ => Reduced::Changed(next),
        }
    })
}

/// Right-fold the level's own functions over the current value: the rightmost
/// runs first, the leftmost last.
fn apply_here(fns: &[NodeFn], state: Option<&Value>, action: &Action, acc: Reduced) -> Reduced {
    let mut acc = acc;
    for f in fns.iter().rev() {
        let view = match &acc {
            Reduced::Unchanged => state,
            Reduced::Changed(value) => Some(value),
        };
        if let Reduced::Changed(value) = f(view, action) {
            acc = Reduced::Changed(value);
        }
    }
    acc
}

/// Turn a tree level into a single node function.
fn build(tree: SchemaTree) -> NodeFn {
    let SchemaTree { children, here } = tree;

    if children.is_empty() {
        // Composition only: identity when the list is empty.
        return Box::new(move |state, action| apply_here(&here, state, action, Reduced::Unchanged));
    }

    let kids: Vec<(String, NodeFn)> = children
        .into_iter()
        .map(|(key, subtree)| (key, build(subtree)))
        .collect();

    Box::new(move |state: Option<&Value>, action: &Action| {
        let current = state.and_then(Value::as_object);

        let mut updates: Vec<(&str, Value)> = Vec::new();
        for (key, child) in &kids {
            let slot = current.and_then(|map| map.get(key.as_str()));
            if let Reduced::Changed(value) = child(slot, action) {
                updates.push((key, value));
            }
        }

        let acc = if updates.is_empty() {
            Reduced::Unchanged
        } else {
            // Keys this level does not own are carried over untouched.
            let mut next = current.cloned().unwrap_or_default();
            for (key, value) in updates {
                next.insert(key.to_string(), value);
            }
            Reduced::Changed(Value::Object(next))
        };

        apply_here(&here, state, action, acc)
    })
}

/// Flatten an entry into `(address, reducer)` pairs, the address being
/// `prefix + path segments + ROOT_KEY`.
fn flatten(entry: &Entry) -> Vec<(Vec<String>, Reducer)> {
    fn walk(prefix: Vec<String>, schema: &ReducerSchema, out: &mut Vec<(Vec<String>, Reducer)>) {
        match schema {
            ReducerSchema::Reducer(reducer) => {
                let mut address = prefix;
                address.push(ROOT_KEY.to_string());
                out.push((address, reducer.clone()));
            }
            ReducerSchema::Map(map) => {
                for (key, child) in map {
                    let mut child_prefix = prefix.clone();
                    child_prefix.push(key.clone());
                    walk(child_prefix, child, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    let mut prefix = entry.prefix();
    prefix.extend(entry.path.iter().cloned());
    walk(prefix, &entry.value, &mut out);
    out
}

/// Combine an entry list into one root reducer.
///
/// Pure and deterministic: the same entries in the same order produce a
/// reducer with the same behavior. An empty list yields the identity.
pub fn combine(entries: &[Entry]) -> RootReducer {
    let mut tree = SchemaTree::default();
    for entry in entries {
        for (address, reducer) in flatten(entry) {
            tree.insert(&address, reducer, entry.namespace.clone());
        }
    }
    let root = build(tree);

    Arc::new(move |state: Option<&Arc<Value>>, action: &Action| {
        match root(state.map(Arc::as_ref), action) {
            Reduced::Unchanged => state
                .cloned()
                .unwrap_or_else(|| Arc::new(Value::Null)),
            Reduced::Changed(value) => Arc::new(value),
        }
    })
}
