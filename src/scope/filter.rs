//! Namespace matching for dispatched actions.

use crate::types::{Action, Reducer};
use serde_json::Value;
use std::sync::Arc;

/// Decide whether an action applies to a scope.
///
/// A scope without a namespace sees everything; an untagged action reaches
/// every scope; otherwise the namespaces must match.
pub fn is_from_namespace(scope: Option<&str>, action: &Action) -> bool {
    match (scope, action.namespace()) {
        (None, _) => true,
        (_, None) => true,
        (Some(scope), Some(tagged)) => scope == tagged,
    }
}

/// Wrap a reducer so it only runs for actions from `namespace`.
///
/// On a mismatched action the reducer is not invoked and the state it owns is
/// returned as-is (`Value::Null` when it was never populated). A `None`
/// namespace returns the reducer unwrapped.
pub fn wrap_reducer(reducer: Reducer, namespace: Option<String>) -> Reducer {
    match namespace {
        None => reducer,
        Some(namespace) => Arc::new(move |state: Option<&Value>, action: &Action| {
            if is_from_namespace(Some(&namespace), action) {
                reducer(state, action)
            } else {
                state.cloned().unwrap_or(Value::Null)
            }
        }),
    }
}
