//! Module store tying the reducer registry and epic supervisor together.

use crate::epics::{EpicFn, EpicStatus, EpicSupervisor};
use crate::error::Result;
use crate::facade::StoreFacade;
use crate::registry::{ReducerRegistry, ReducerSchema};
use crate::types::{EpicId, Scope};
use serde_json::Value;
use std::sync::Arc;

/// Runtime module registry for one store instance.
///
/// Fragments mount reducers and epics here without knowing about each other;
/// the store recombines the root reducer on every change and supervises the
/// epics against the facade's live streams.
pub struct ModuleStore {
    facade: Arc<dyn StoreFacade>,
    reducers: ReducerRegistry,
    epics: EpicSupervisor,
}

impl ModuleStore {
    /// Create a module store driving the given facade.
    pub fn new(facade: Arc<dyn StoreFacade>) -> Self {
        Self {
            reducers: ReducerRegistry::new(Arc::clone(&facade)),
            epics: EpicSupervisor::new(Arc::clone(&facade)),
            facade,
        }
    }

    /// The facade this store drives.
    pub fn facade(&self) -> &Arc<dyn StoreFacade> {
        &self.facade
    }

    /// Mount one or more reducers.
    ///
    /// The new root reducer is installed before the `REDUCERS_INJECTED`
    /// bookkeeping action is dispatched, so that dispatch already runs
    /// through the new tree and populates the mounted branches.
    pub fn inject_reducers(&self, schema: ReducerSchema, scope: Scope) -> Result<()> {
        self.reducers.inject(schema, scope)
    }

    /// Unmount reducers mounted earlier. Unknown registrations are ignored.
    pub fn eject_reducers(&self, schema: ReducerSchema, scope: Scope) -> Result<()> {
        self.reducers.eject(schema, scope)
    }

    /// Register one epic per `(name, handler)` entry, scoped to `namespace`.
    /// Returns the allocated ids in entry order.
    pub fn inject_epics<K, I>(&self, epics: I, namespace: Option<&str>) -> Vec<EpicId>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, EpicFn)>,
    {
        self.epics.inject(epics, namespace)
    }

    /// Dispatch the stop signal naming these ids.
    pub fn remove_epics(&self, ids: &[EpicId]) {
        self.facade.dispatch(EpicSupervisor::stop_action(ids));
    }

    /// Current state snapshot.
    pub fn state(&self) -> Option<Arc<Value>> {
        self.facade.state()
    }

    /// Lifecycle state of an epic registration.
    pub fn epic_status(&self, id: EpicId) -> Option<EpicStatus> {
        self.epics.status(id)
    }

    /// Number of currently mounted reducer entries.
    pub fn reducer_count(&self) -> usize {
        self.reducers.entry_count()
    }

    /// Cancel every running epic.
    pub fn shutdown(&self) {
        self.epics.shutdown();
    }
}
