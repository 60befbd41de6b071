//! Store facade: the narrow interface the registry and supervisor drive.
//!
//! The core consumes exactly these capabilities and never constructs them
//! implicitly. `InMemoryStore` is a reference implementation for embedders
//! that do not bring their own container, and the one the tests run against.

use crate::types::{Action, RootReducer};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;

/// The capabilities the module store requires from its state container.
pub trait StoreFacade: Send + Sync {
    /// Run the root reducer against `action` and notify the live streams.
    fn dispatch(&self, action: Action);

    /// Atomically install a new root reducer.
    fn replace_reducer(&self, reducer: RootReducer);

    /// Current state snapshot, `None` before the first dispatch.
    fn state(&self) -> Option<Arc<Value>>;

    /// Live stream of dispatched actions.
    fn action_stream(&self) -> Receiver<Action>;

    /// Live stream of state snapshots, one per dispatch.
    fn state_stream(&self) -> Receiver<Arc<Value>>;
}

/// In-memory state container.
///
/// Dispatches are serialized by a mutex and run to completion: the reducer
/// runs, the snapshot is stored, then subscribers are notified (state first,
/// then the action, so an action observer already sees the new state).
pub struct InMemoryStore {
    reducer: RwLock<RootReducer>,
    state: RwLock<Option<Arc<Value>>>,
    dispatch_lock: Mutex<()>,
    action_subs: RwLock<Vec<Sender<Action>>>,
    state_subs: RwLock<Vec<Sender<Arc<Value>>>>,
}

impl InMemoryStore {
    /// Create a store with no state and a passthrough reducer.
    pub fn new() -> Self {
        let identity: RootReducer = Arc::new(|state: Option<&Arc<Value>>, _: &Action| {
            state
                .cloned()
                .unwrap_or_else(|| Arc::new(Value::Null))
        });
        Self {
            reducer: RwLock::new(identity),
            state: RwLock::new(None),
            dispatch_lock: Mutex::new(()),
            action_subs: RwLock::new(Vec::new()),
            state_subs: RwLock::new(Vec::new()),
        }
    }

    /// Create a store preloaded with an initial state.
    pub fn with_state(initial: Value) -> Self {
        let store = Self::new();
        *store.state.write() = Some(Arc::new(initial));
        store
    }

    /// Send to every subscriber, pruning the disconnected ones.
    fn broadcast<T: Clone>(subs: &RwLock<Vec<Sender<T>>>, value: T) {
        let mut dead = Vec::new();
        {
            let subs = subs.read();
            for (index, sender) in subs.iter().enumerate() {
                if sender.send(value.clone()).is_err() {
                    dead.push(index);
                }
            }
        }
        if !dead.is_empty() {
            let mut subs = subs.write();
            for index in dead.into_iter().rev() {
                if index < subs.len() {
                    subs.remove(index);
                }
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreFacade for InMemoryStore {
    fn dispatch(&self, action: Action) {
        let _guard = self.dispatch_lock.lock();

        let reducer = self.reducer.read().clone();
        let previous = self.state.read().clone();
        let next = reducer(previous.as_ref(), &action);
        *self.state.write() = Some(next.clone());

        Self::broadcast(&self.state_subs, next);
        Self::broadcast(&self.action_subs, action);
    }

    fn replace_reducer(&self, reducer: RootReducer) {
        *self.reducer.write() = reducer;
    }

    fn state(&self) -> Option<Arc<Value>> {
        self.state.read().clone()
    }

    fn action_stream(&self) -> Receiver<Action> {
        let (sender, receiver) = unbounded();
        self.action_subs.write().push(sender);
        receiver
    }

    fn state_stream(&self) -> Receiver<Arc<Value>> {
        let (sender, receiver) = unbounded();
        self.state_subs.write().push(sender);
        receiver
    }
}
