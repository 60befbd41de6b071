//! Epic registration types and the handler-side context.

use crate::error::{Result, StoreError};
use crate::types::{Action, EpicId, DEFAULT_FEATURE};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// An epic handler.
///
/// Runs on its own thread; it should loop over the context's input streams
/// and return when they disconnect. Anything it emits through the context's
/// output is tagged and dispatched by the supervisor.
pub type EpicFn = Arc<dyn Fn(EpicContext) + Send + Sync>;

/// Lifecycle states of an epic registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpicStatus {
    /// Registered but not yet started.
    Pending,
    /// Subscribed and consuming the live streams.
    Running,
    /// Stopped by a `STOP_EPICS` signal. Terminal.
    Cancelled,
    /// The handler returned on its own. Terminal.
    Completed,
}

impl EpicStatus {
    /// Whether the registration has been torn down.
    pub fn is_terminal(self) -> bool {
        matches!(self, EpicStatus::Cancelled | EpicStatus::Completed)
    }
}

/// Everything a handler gets to work with.
pub struct EpicContext {
    /// Dispatched actions, pre-filtered to the registration's namespace.
    pub actions: Receiver<Action>,
    /// Full state snapshots, one per dispatch.
    pub state: StateStream,
    /// State snapshots narrowed to the registration's namespace slice.
    pub namespaced_state: NamespacedStateStream,
    /// Output channel back into the store.
    pub output: EpicOutput,
}

/// Stream of full state snapshots.
pub struct StateStream {
    receiver: Receiver<Arc<Value>>,
}

impl StateStream {
    pub(crate) fn new(receiver: Receiver<Arc<Value>>) -> Self {
        Self { receiver }
    }

    /// Receive the next snapshot (blocking).
    pub fn recv(&self) -> Result<Arc<Value>> {
        self.receiver.recv().map_err(|_| StoreError::Disconnected)
    }

    /// Try to receive a snapshot without blocking.
    pub fn try_recv(&self) -> Option<Arc<Value>> {
        self.receiver.try_recv().ok()
    }

    /// Receive with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Arc<Value>> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => StoreError::Timeout,
            RecvTimeoutError::Disconnected => StoreError::Disconnected,
        })
    }
}

/// Stream of state snapshots narrowed to one namespace.
///
/// Asking for a namespace that has no corresponding branch in the tree is an
/// integration mistake and surfaces as `StoreError::NamespaceNotFound` rather
/// than an empty value.
pub struct NamespacedStateStream {
    receiver: Receiver<Arc<Value>>,
    namespace: Option<String>,
}

impl NamespacedStateStream {
    pub(crate) fn new(receiver: Receiver<Arc<Value>>, namespace: Option<String>) -> Self {
        Self {
            receiver,
            namespace,
        }
    }

    /// Receive the next narrowed snapshot (blocking).
    pub fn recv(&self) -> Result<Arc<Value>> {
        let snapshot = self.receiver.recv().map_err(|_| StoreError::Disconnected)?;
        self.narrow(snapshot)
    }

    /// Receive with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Arc<Value>> {
        let snapshot = self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => StoreError::Timeout,
            RecvTimeoutError::Disconnected => StoreError::Disconnected,
        })?;
        self.narrow(snapshot)
    }

    fn narrow(&self, snapshot: Arc<Value>) -> Result<Arc<Value>> {
        let Some(namespace) = &self.namespace else {
            return Ok(snapshot);
        };
        snapshot
            .get(DEFAULT_FEATURE)
            .and_then(|branch| branch.get(namespace))
            .map(|slice| Arc::new(slice.clone()))
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.clone()))
    }
}

/// Output channel from a handler back into the store.
pub struct EpicOutput {
    sender: Sender<Action>,
}

impl EpicOutput {
    pub(crate) fn new(sender: Sender<Action>) -> Self {
        Self { sender }
    }

    /// Emit an action.
    ///
    /// Returns `false` once the registration's pipeline is gone (cancelled or
    /// torn down); a handler seeing `false` should return.
    pub fn emit(&self, action: Action) -> bool {
        self.sender.send(action).is_ok()
    }
}

/// Internal registration record handed to the supervisor.
pub(crate) struct EpicRegistration {
    pub id: EpicId,
    pub name: String,
    pub namespace: Option<String>,
    pub handler: EpicFn,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use serde_json::json;

    #[test]
    fn test_namespaced_stream_narrows_to_branch() {
        let (sender, receiver) = unbounded();
        let stream = NamespacedStateStream::new(receiver, Some("nsA".to_string()));

        sender
            .send(Arc::new(json!({"namespaces": {"nsA": {"a": 1}}})))
            .unwrap();
        assert_eq!(*stream.recv().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_namespaced_stream_errors_on_missing_branch() {
        let (sender, receiver) = unbounded();
        let stream = NamespacedStateStream::new(receiver, Some("ghost".to_string()));

        sender.send(Arc::new(json!({"other": 1}))).unwrap();
        assert!(matches!(
            stream.recv(),
            Err(StoreError::NamespaceNotFound(ns)) if ns == "ghost"
        ));
    }

    #[test]
    fn test_unscoped_stream_passes_snapshot_through() {
        let (sender, receiver) = unbounded();
        let stream = NamespacedStateStream::new(receiver, None);

        let snapshot = Arc::new(json!({"a": 1}));
        sender.send(snapshot.clone()).unwrap();
        assert!(Arc::ptr_eq(&stream.recv().unwrap(), &snapshot));
    }

    #[test]
    fn test_status_terminality() {
        assert!(!EpicStatus::Pending.is_terminal());
        assert!(!EpicStatus::Running.is_terminal());
        assert!(EpicStatus::Cancelled.is_terminal());
        assert!(EpicStatus::Completed.is_terminal());
    }
}
