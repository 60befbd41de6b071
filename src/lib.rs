//! # Module Store
//!
//! A runtime module registry for a unidirectional state container.
//! Independently loaded fragments mount and unmount pure state-transition
//! functions ("reducers") and asynchronous side-effect handlers ("epics")
//! into one shared store, scoped by namespace and an optional feature
//! grouping, without knowing about each other.
//!
//! ## Core Concepts
//!
//! - **Reducers**: pure `(state, action) -> state` functions combined into a
//!   single root function that is rebuilt on every mount/unmount
//! - **Namespaces**: a namespace scopes a subtree of state and the actions
//!   that reach it; untagged actions reach every scope
//! - **Epics**: handlers running against filtered live streams of actions
//!   and state snapshots, cancellable by id through a dispatched stop signal
//! - **Facade**: the narrow interface (`dispatch`, `replace_reducer`, live
//!   streams) the registry drives; bring your own container or use
//!   [`InMemoryStore`]
//!
//! ## Example
//!
//! ```ignore
//! use modstore::{Action, InMemoryStore, ModuleStore, ReducerSchema, Scope};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = ModuleStore::new(Arc::new(InMemoryStore::new()));
//!
//! store.inject_reducers(
//!     ReducerSchema::map([("count", ReducerSchema::reducer(|state, action| {
//!         let current = state.and_then(|s| s.as_i64()).unwrap_or(0);
//!         match action.kind.as_str() {
//!             "INC" => json!(current + 1),
//!             _ => json!(current),
//!         }
//!     }))]),
//!     Scope::namespace("counter"),
//! )?;
//!
//! store.facade().dispatch(Action::new("INC"));
//! // state: {"namespaces": {"counter": {"count": 1}}}
//! ```

pub mod epics;
pub mod error;
pub mod facade;
pub mod registry;
pub mod scope;
pub mod store;
pub mod types;

// Re-exports
pub use epics::{
    EpicContext, EpicFn, EpicOutput, EpicStatus, EpicSupervisor, NamespacedStateStream,
    StateStream,
};
pub use error::{Result, StoreError};
pub use facade::{InMemoryStore, StoreFacade};
pub use registry::{combine, Entry, ReducerRegistry, ReducerSchema};
pub use scope::{is_from_namespace, wrap_reducer};
pub use store::ModuleStore;
pub use types::*;
