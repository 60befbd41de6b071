//! Core types for the module store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Reserved tree key marking reducers that apply directly at a level
/// rather than naming a child key.
pub const ROOT_KEY: &str = "@@modstore/root";

/// Feature grouping used for namespaced reducers when no feature is given.
pub const DEFAULT_FEATURE: &str = "namespaces";

/// Action type dispatched after reducers are mounted.
pub const REDUCERS_INJECTED: &str = "REDUCERS_INJECTED";

/// Action type dispatched after reducers are unmounted.
pub const REDUCERS_REMOVED: &str = "REDUCERS_REMOVED";

/// Action type naming epic ids that must stop.
pub const STOP_EPICS: &str = "STOP_EPICS";

/// Unique identifier for an epic registration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpicId(pub u64);

impl fmt::Debug for EpicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EpicId({})", self.0)
    }
}

impl fmt::Display for EpicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A dispatched event.
///
/// Serializes with `type` as the tag field. `meta` is an open map; the only
/// key the store itself interprets is `namespace`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Event tag.
    #[serde(rename = "type")]
    pub kind: String,

    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl Action {
    /// Create an action with no payload or metadata.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            meta: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The namespace this action is tagged with, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("namespace"))
            .and_then(Value::as_str)
    }

    /// Tag this action with a namespace.
    ///
    /// Additive and idempotent: an existing `meta.namespace` wins, and other
    /// metadata keys are kept as-is.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        let meta = self.meta.get_or_insert_with(Map::new);
        meta.entry("namespace".to_string())
            .or_insert_with(|| Value::String(namespace.to_string()));
        self
    }
}

/// Pure state transition over one slice of the tree.
///
/// `None` means the slice has never been populated.
pub type Reducer = Arc<dyn Fn(Option<&Value>, &Action) -> Value + Send + Sync>;

/// Root state transition installed into the store facade.
///
/// Snapshots are shared as `Arc<Value>`; a dispatch that changes nothing
/// returns the same `Arc` it was given.
pub type RootReducer = Arc<dyn Fn(Option<&Arc<Value>>, &Action) -> Arc<Value> + Send + Sync>;

/// Mount scope for reducer registrations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    /// Namespace the reducers belong to. `None` mounts them globally.
    pub namespace: Option<String>,

    /// Feature grouping placed above the namespace in the state tree.
    /// Ignored for global registrations.
    pub feature: Option<String>,
}

impl Scope {
    /// Global scope: reducers mount at the top level and see every action.
    pub fn global() -> Self {
        Self::default()
    }

    /// Scope reducers to a namespace under the default feature.
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            feature: None,
        }
    }

    /// Place the namespace under a named feature.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }
}
