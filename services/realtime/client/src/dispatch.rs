//! Message dispatch table.
//!
//! Maps a message kind to an ordered list of handlers. Handlers under
//! the wildcard kind [`realtime_wire::kind::ALL`] are invoked for every
//! dispatched frame, after the kind-specific handlers. A handler that
//! panics is caught and logged; the remaining handlers still run.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use realtime_wire::{kind, Envelope};
use tracing::error;

type Handler = std::sync::Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Token identifying one registration, returned by [`DispatchTable::on`]
/// and consumed by [`DispatchTable::off`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Registry of message handlers keyed by kind
#[derive(Default)]
pub struct DispatchTable {
    handlers: Mutex<HashMap<String, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl DispatchTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `kind`; handlers run in registration order
    pub fn on<F>(&self, kind: &str, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.lock();
        handlers
            .entry(kind.to_string())
            .or_default()
            .push((id, std::sync::Arc::new(handler)));
        id
    }

    /// Remove the registration identified by `id` under `kind`; no-op
    /// when the registration is not found
    pub fn off(&self, kind: &str, id: HandlerId) -> bool {
        let mut handlers = self.lock();
        if let Some(list) = handlers.get_mut(kind) {
            if let Some(pos) = list.iter().position(|(hid, _)| *hid == id) {
                list.remove(pos);
                if list.is_empty() {
                    handlers.remove(kind);
                }
                return true;
            }
        }
        false
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of handlers currently registered under `kind`
    pub fn handler_count(&self, kind: &str) -> usize {
        self.lock().get(kind).map(Vec::len).unwrap_or(0)
    }

    /// Invoke all handlers for the frame's kind, then all wildcard
    /// handlers. Each invocation is isolated: a panic is logged and the
    /// remaining handlers still run.
    pub fn dispatch(&self, frame: &Envelope) {
        let targets: Vec<Handler> = {
            let handlers = self.lock();
            let mut targets = Vec::new();
            if let Some(list) = handlers.get(&frame.kind) {
                targets.extend(list.iter().map(|(_, h)| h.clone()));
            }
            if let Some(list) = handlers.get(kind::ALL) {
                targets.extend(list.iter().map(|(_, h)| h.clone()));
            }
            targets
        };

        for handler in targets {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(frame))).is_err() {
                error!("handler for kind {} panicked", frame.kind);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(HandlerId, Handler)>>> {
        // a panicking handler never holds this lock, so a poisoned
        // guard still protects consistent state
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.lock();
        f.debug_struct("DispatchTable")
            .field("kinds", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn frame(kind: &str) -> Envelope {
        Envelope::new(kind).with_field("data", 1)
    }

    #[test]
    fn test_dispatch_invokes_registered_handler_once() {
        let table = DispatchTable::new();
        let count = Arc::new(AtomicUsize::new(0));

        let count2 = count.clone();
        let id = table.on("t", move |f| {
            assert_eq!(f.kind, "t");
            assert_eq!(f.field("data"), Some(&serde_json::Value::from(1)));
            count2.fetch_add(1, Ordering::SeqCst);
        });

        table.dispatch(&frame("t"));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(table.off("t", id));
        table.dispatch(&frame("t"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_unknown_registration_is_noop() {
        let table = DispatchTable::new();
        let id = table.on("t", |_| {});
        assert!(!table.off("other", id));
        assert!(table.off("t", id));
        assert!(!table.off("t", id));
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let table = DispatchTable::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = order.clone();
            table.on("t", move |_| order.lock().unwrap().push(label));
        }

        table.dispatch(&frame("t"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_wildcard_sees_every_kind() {
        let table = DispatchTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen2 = seen.clone();
        table.on(kind::ALL, move |f| seen2.lock().unwrap().push(f.kind.clone()));

        let typed = Arc::new(AtomicUsize::new(0));
        let typed2 = typed.clone();
        table.on("job", move |_| {
            typed2.fetch_add(1, Ordering::SeqCst);
        });

        table.dispatch(&frame("job"));
        table.dispatch(&frame("chat"));

        assert_eq!(*seen.lock().unwrap(), vec!["job", "chat"]);
        assert_eq!(typed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_dispatch() {
        let table = DispatchTable::new();
        let count = Arc::new(AtomicUsize::new(0));

        table.on("t", |_| panic!("boom"));
        let count2 = count.clone();
        table.on("t", move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        let count3 = count.clone();
        table.on(kind::ALL, move |_| {
            count3.fetch_add(1, Ordering::SeqCst);
        });

        table.dispatch(&frame("t"));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // table stays usable after the panic
        table.dispatch(&frame("t"));
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_clear_removes_all_registrations() {
        let table = DispatchTable::new();
        table.on("a", |_| {});
        table.on("b", |_| {});
        table.on(kind::ALL, |_| {});

        table.clear();
        assert_eq!(table.handler_count("a"), 0);
        assert_eq!(table.handler_count("b"), 0);
        assert_eq!(table.handler_count(kind::ALL), 0);
    }
}
