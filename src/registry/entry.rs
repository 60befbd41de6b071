//! Reducer registration records and state-tree addressing.

use crate::error::{Result, StoreError};
use crate::types::{Reducer, Scope, DEFAULT_FEATURE};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A reducer or a nested string-keyed mapping of reducers.
#[derive(Clone)]
pub enum ReducerSchema {
    /// A single state-transition function.
    Reducer(Reducer),
    /// A mapping of child keys to schemas.
    Map(BTreeMap<String, ReducerSchema>),
}

impl ReducerSchema {
    /// Wrap a plain closure.
    pub fn reducer<F>(f: F) -> Self
    where
        F: Fn(Option<&serde_json::Value>, &crate::types::Action) -> serde_json::Value
            + Send
            + Sync
            + 'static,
    {
        ReducerSchema::Reducer(Arc::new(f))
    }

    /// Build a mapping schema from `(key, schema)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ReducerSchema)>,
    {
        ReducerSchema::Map(
            entries
                .into_iter()
                .map(|(key, schema)| (key.into(), schema))
                .collect(),
        )
    }
}

impl fmt::Debug for ReducerSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerSchema::Reducer(reducer) => {
                write!(f, "Reducer({:p})", Arc::as_ptr(reducer))
            }
            ReducerSchema::Map(map) => f.debug_map().entries(map.iter()).finish(),
        }
    }
}

/// Reducers compare by `Arc` identity, mappings structurally. The same `Arc`
/// registered twice therefore counts as two equal occurrences.
impl PartialEq for ReducerSchema {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ReducerSchema::Reducer(a), ReducerSchema::Reducer(b)) => Arc::ptr_eq(a, b),
            (ReducerSchema::Map(a), ReducerSchema::Map(b)) => a == b,
            _ => false,
        }
    }
}

/// One mounted registration.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    /// Path segments below the scope prefix.
    pub path: Vec<String>,
    /// The mounted reducer or mapping.
    pub value: ReducerSchema,
    /// Namespace the registration is scoped to.
    pub namespace: Option<String>,
    /// Feature grouping above the namespace.
    pub feature: Option<String>,
}

impl Entry {
    /// Address prefix of this entry in the state tree.
    ///
    /// Namespaced entries mount under `[feature or "namespaces", namespace]`;
    /// global entries mount at the top level.
    pub fn prefix(&self) -> Vec<String> {
        match &self.namespace {
            Some(namespace) => vec![
                self.feature
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FEATURE.to_string()),
                namespace.clone(),
            ],
            None => Vec::new(),
        }
    }
}

/// Flatten an input schema into one entry per supplied key.
///
/// A bare reducer without a namespace is a usage error: there is no key to
/// mount it under, so a namespace is required to place it in the tree. The
/// check runs before any registry mutation.
pub(crate) fn entries_from_schema(schema: &ReducerSchema, scope: &Scope) -> Result<Vec<Entry>> {
    match schema {
        ReducerSchema::Reducer(_) if scope.namespace.is_none() => Err(StoreError::UnscopedReducer),
        ReducerSchema::Reducer(_) => Ok(vec![Entry {
            path: Vec::new(),
            value: schema.clone(),
            namespace: scope.namespace.clone(),
            feature: scope.feature.clone(),
        }]),
        ReducerSchema::Map(map) => Ok(map
            .iter()
            .map(|(key, value)| Entry {
                path: vec![key.clone()],
                value: value.clone(),
                namespace: scope.namespace.clone(),
                feature: scope.feature.clone(),
            })
            .collect()),
    }
}

/// Top-level keys of a flattened entry list, for bookkeeping payloads.
pub(crate) fn entry_keys(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| entry.path.first().cloned())
        .collect()
}
