//! Supervisor for epic registrations.

use crate::epics::types::{
    EpicContext, EpicFn, EpicOutput, EpicRegistration, EpicStatus, NamespacedStateStream,
    StateStream,
};
use crate::facade::StoreFacade;
use crate::scope::is_from_namespace;
use crate::types::{Action, EpicId, STOP_EPICS};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

/// Per-registration bookkeeping held by the supervisor.
struct EpicHandle {
    name: String,
    status: EpicStatus,
    /// Cooperative cancellation token, checked at the last pipeline stage.
    cancelled: Arc<AtomicBool>,
    /// Wakes the pump thread out of its select loop.
    cancel: Sender<()>,
}

struct Inner {
    next_id: AtomicU64,
    epics: RwLock<HashMap<EpicId, EpicHandle>>,
    /// Fan-in of tagged epic output, drained into `dispatch`.
    out: Sender<Action>,
}

impl Inner {
    fn cancel(&self, ids: &[EpicId]) {
        let mut epics = self.epics.write();
        for id in ids {
            let Some(handle) = epics.get_mut(id) else {
                continue;
            };
            if handle.status.is_terminal() {
                continue;
            }
            handle.cancelled.store(true, Ordering::SeqCst);
            let _ = handle.cancel.try_send(());
            handle.status = EpicStatus::Cancelled;
            debug!(id = %id, name = %handle.name, "epic cancelled");
        }
    }

    fn cancel_all(&self) {
        let ids: Vec<EpicId> = self.epics.read().keys().copied().collect();
        self.cancel(&ids);
    }

    /// Record the pump's exit. A cancellation that already happened wins.
    fn finish(&self, id: EpicId, status: EpicStatus) {
        let mut epics = self.epics.write();
        if let Some(handle) = epics.get_mut(&id) {
            if !handle.status.is_terminal() {
                handle.status = status;
                debug!(id = %id, name = %handle.name, ?status, "epic finished");
            }
        }
    }
}

/// Starts, supervises, and cancels epic handlers against a store facade.
///
/// Each registration gets a handler thread and a pump thread. The pump
/// forwards namespace-filtered actions to the handler and moves the handler's
/// raw output through tagging and the cancellation check into the shared
/// fan-in channel. A watcher thread cancels registrations named by dispatched
/// `STOP_EPICS` actions and tears everything down when the action stream
/// completes.
pub struct EpicSupervisor {
    facade: Arc<dyn StoreFacade>,
    inner: Arc<Inner>,
}

impl EpicSupervisor {
    /// Create a supervisor and start its watcher and drain threads.
    pub fn new(facade: Arc<dyn StoreFacade>) -> Self {
        let (out_tx, out_rx) = unbounded::<Action>();
        let inner = Arc::new(Inner {
            next_id: AtomicU64::new(1),
            epics: RwLock::new(HashMap::new()),
            out: out_tx,
        });

        // Drain: merged epic output goes back into the store.
        let drain_facade = Arc::clone(&facade);
        thread::spawn(move || {
            for action in out_rx {
                drain_facade.dispatch(action);
            }
        });

        // Watcher: react to stop signals; tear down when the stream ends.
        let watcher_inner = Arc::clone(&inner);
        let actions = facade.action_stream();
        thread::spawn(move || {
            loop {
                match actions.recv() {
                    Ok(action) if action.kind == STOP_EPICS => {
                        watcher_inner.cancel(&stop_ids(&action));
                    }
                    Ok(_) => {}
                    Err(_) => {
                        watcher_inner.cancel_all();
                        break;
                    }
                }
            }
        });

        Self { facade, inner }
    }

    /// Register one handler per entry, allocating a fresh id per handler.
    ///
    /// Handlers are subscribed immediately: actions dispatched after this
    /// call returns are guaranteed to reach them.
    pub fn inject<K, I>(&self, epics: I, namespace: Option<&str>) -> Vec<EpicId>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, EpicFn)>,
    {
        epics
            .into_iter()
            .map(|(name, handler)| {
                self.start(EpicRegistration {
                    id: EpicId(self.inner.next_id.fetch_add(1, Ordering::SeqCst)),
                    name: name.into(),
                    namespace: namespace.map(str::to_string),
                    handler,
                })
            })
            .collect()
    }

    /// Build the stop action naming these ids. Dispatching it through the
    /// store is what cancels them.
    pub fn stop_action(ids: &[EpicId]) -> Action {
        let ids: Vec<u64> = ids.iter().map(|id| id.0).collect();
        Action::new(STOP_EPICS).with_payload(serde_json::json!(ids))
    }

    /// Current lifecycle state of a registration.
    pub fn status(&self, id: EpicId) -> Option<EpicStatus> {
        self.inner.epics.read().get(&id).map(|handle| handle.status)
    }

    /// Number of registrations currently running.
    pub fn running_count(&self) -> usize {
        self.inner
            .epics
            .read()
            .values()
            .filter(|handle| handle.status == EpicStatus::Running)
            .count()
    }

    /// Cancel every registration that is still running.
    pub fn shutdown(&self) {
        self.inner.cancel_all();
    }

    fn start(&self, registration: EpicRegistration) -> EpicId {
        let EpicRegistration {
            id,
            name,
            namespace,
            handler,
        } = registration;

        let cancelled = Arc::new(AtomicBool::new(false));
        let (cancel_tx, cancel_rx) = bounded(1);
        let (input_tx, input_rx) = unbounded::<Action>();
        let (raw_tx, raw_rx) = unbounded::<Action>();

        // Subscribe before anything is spawned so no dispatch can be missed.
        let source = self.facade.action_stream();
        let state = StateStream::new(self.facade.state_stream());
        let namespaced_state =
            NamespacedStateStream::new(self.facade.state_stream(), namespace.clone());

        self.inner.epics.write().insert(
            id,
            EpicHandle {
                name: name.clone(),
                status: EpicStatus::Pending,
                cancelled: Arc::clone(&cancelled),
                cancel: cancel_tx,
            },
        );

        let context = EpicContext {
            actions: input_rx,
            state,
            namespaced_state,
            output: EpicOutput::new(raw_tx),
        };

        let handler_name = name.clone();
        thread::spawn(move || {
            if catch_unwind(AssertUnwindSafe(|| handler(context))).is_err() {
                error!(id = %id, name = %handler_name, "epic handler panicked");
            }
        });

        let pump_inner = Arc::clone(&self.inner);
        let pump_namespace = namespace.clone();
        let pump_cancelled = Arc::clone(&cancelled);
        let out = self.inner.out.clone();
        thread::spawn(move || {
            let status = pump(
                &pump_namespace,
                &source,
                &input_tx,
                &raw_rx,
                &cancel_rx,
                &pump_cancelled,
                &out,
            );
            pump_inner.finish(id, status);
        });

        if let Some(handle) = self.inner.epics.write().get_mut(&id) {
            if handle.status == EpicStatus::Pending {
                handle.status = EpicStatus::Running;
            }
        }
        debug!(id = %id, name = %name, namespace = ?namespace, "epic started");
        id
    }
}

/// Per-registration pipeline.
///
/// Forwards filtered actions inward, moves raw output through tagging and the
/// cancellation check outward. Returns the terminal status to record. The
/// cancellation check sits after tagging, as the last stage before fan-in, so
/// a cancelled registration cannot leak output that was already in flight.
fn pump(
    namespace: &Option<String>,
    source: &Receiver<Action>,
    input: &Sender<Action>,
    raw: &Receiver<Action>,
    cancel: &Receiver<()>,
    cancelled: &AtomicBool,
    out: &Sender<Action>,
) -> EpicStatus {
    loop {
        select! {
            recv(cancel) -> _ => return EpicStatus::Cancelled,
            recv(source) -> message => match message {
                Ok(action) => {
                    if is_from_namespace(namespace.as_deref(), &action) {
                        let _ = input.send(action);
                    }
                }
                // Root stream completed: tear down.
                Err(_) => return EpicStatus::Completed,
            },
            recv(raw) -> message => match message {
                Ok(action) => {
                    let tagged = match namespace {
                        Some(namespace) => action.with_namespace(namespace),
                        None => action,
                    };
                    if cancelled.load(Ordering::SeqCst) {
                        return EpicStatus::Cancelled;
                    }
                    if out.send(tagged).is_err() {
                        return EpicStatus::Completed;
                    }
                }
                // Handler returned and dropped its output.
                Err(_) => return EpicStatus::Completed,
            },
        }
    }
}

/// Ids named by a `STOP_EPICS` payload.
fn stop_ids(action: &Action) -> Vec<EpicId> {
    action
        .payload
        .as_ref()
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_u64)
                .map(EpicId)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
impl EpicSupervisor {
    /// Reset id allocation. Test harness only; ids are otherwise monotonic
    /// for the supervisor's lifetime.
    pub(crate) fn reset_ids(&self) {
        self.inner.next_id.store(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::InMemoryStore;
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn echo_epic(input_kind: &'static str, output_kind: &'static str) -> EpicFn {
        Arc::new(move |ctx: EpicContext| {
            while let Ok(action) = ctx.actions.recv() {
                if action.kind == input_kind && !ctx.output.emit(Action::new(output_kind)) {
                    break;
                }
            }
        })
    }

    #[test]
    fn test_ids_are_monotonic() {
        let facade = Arc::new(InMemoryStore::new());
        let supervisor = EpicSupervisor::new(facade);

        let first = supervisor.inject([("a", echo_epic("X", "Y"))], None);
        let second = supervisor.inject([("b", echo_epic("X", "Y"))], None);
        assert!(second[0] > first[0]);
    }

    #[test]
    fn test_reset_ids_is_test_only() {
        let facade = Arc::new(InMemoryStore::new());
        let supervisor = EpicSupervisor::new(facade);

        supervisor.inject([("a", echo_epic("X", "Y"))], None);
        supervisor.reset_ids();
        let ids = supervisor.inject([("b", echo_epic("X", "Y"))], None);
        assert_eq!(ids, vec![EpicId(1)]);
    }

    #[test]
    fn test_epic_output_is_dispatched_and_tagged() {
        let facade = Arc::new(InMemoryStore::new());
        let observer = facade.action_stream();
        let supervisor = EpicSupervisor::new(Arc::clone(&facade) as Arc<dyn StoreFacade>);

        supervisor.inject([("echo", echo_epic("PING", "PONG"))], Some("nsA"));
        facade.dispatch(Action::new("PING"));

        let deadline = Duration::from_secs(2);
        loop {
            let action = observer.recv_timeout(deadline).expect("expected PONG");
            if action.kind == "PONG" {
                assert_eq!(action.namespace(), Some("nsA"));
                break;
            }
        }
    }

    #[test]
    fn test_stop_signal_cancels_registration() {
        let facade = Arc::new(InMemoryStore::new());
        let supervisor = EpicSupervisor::new(Arc::clone(&facade) as Arc<dyn StoreFacade>);

        let ids = supervisor.inject([("echo", echo_epic("PING", "PONG"))], None);
        assert!(wait_until(|| supervisor.status(ids[0]) == Some(EpicStatus::Running)));

        facade.dispatch(EpicSupervisor::stop_action(&ids));
        assert!(wait_until(|| {
            supervisor.status(ids[0]) == Some(EpicStatus::Cancelled)
        }));
    }

    #[test]
    fn test_handler_completion_is_recorded() {
        let facade = Arc::new(InMemoryStore::new());
        let supervisor = EpicSupervisor::new(Arc::clone(&facade) as Arc<dyn StoreFacade>);

        let ids = supervisor.inject(
            [("oneshot", Arc::new(|_ctx: EpicContext| {}) as EpicFn)],
            None,
        );
        assert!(wait_until(|| {
            supervisor.status(ids[0]) == Some(EpicStatus::Completed)
        }));
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let facade = Arc::new(InMemoryStore::new());
        let supervisor = EpicSupervisor::new(Arc::clone(&facade) as Arc<dyn StoreFacade>);

        let ids = supervisor.inject(
            [
                ("boom", Arc::new(|_ctx: EpicContext| panic!("boom")) as EpicFn),
                ("echo", echo_epic("PING", "PONG")),
            ],
            None,
        );
        assert!(wait_until(|| {
            supervisor.status(ids[0]) == Some(EpicStatus::Completed)
        }));
        // The sibling registration keeps running.
        assert_eq!(supervisor.status(ids[1]), Some(EpicStatus::Running));
    }
}
