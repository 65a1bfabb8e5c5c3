// ── Notification dispatch ──
//
// Delivers notifications to registry snapshots, isolating handler failures.
//
// Every connect cycle is stamped with an epoch. `disconnect()` and
// `connect()` advance the epoch and then wait on the dispatch gate, so any
// delivery already in flight on another thread completes before they
// return and every later delivery from a stale cycle is dropped. A handler
// that calls back into the client on the dispatching thread skips the gate
// wait (the dispatch loop re-checks the epoch before each handler).

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::event::{EventKind, Notification};
use crate::registry::{Handler, SubscriberRegistry, SubscriptionId};

static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static DISPATCHING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

pub(crate) struct Dispatcher {
    id: u64,
    epoch: AtomicU64,
    gate: Mutex<()>,
    registry: Mutex<SubscriberRegistry>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed),
            epoch: AtomicU64::new(0),
            gate: Mutex::new(()),
            registry: Mutex::new(SubscriberRegistry::default()),
        }
    }

    // ── Registry access ──────────────────────────────────────────────

    pub(crate) fn subscribe(&self, kind: EventKind, handler: Handler) -> SubscriptionId {
        self.registry().insert(kind, handler)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry().remove(id)
    }

    pub(crate) fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry().count(kind)
    }

    fn registry(&self) -> MutexGuard<'_, SubscriberRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Epochs ───────────────────────────────────────────────────────

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    /// Invalidate every earlier epoch. Pair with [`barrier`](Self::barrier).
    pub(crate) fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Wait until no delivery is in flight on another thread.
    ///
    /// Must not be called while holding a lock a handler might take.
    pub(crate) fn barrier(&self) {
        if self.dispatching_here() {
            return;
        }
        drop(self.gate.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn dispatching_here(&self) -> bool {
        DISPATCHING.with(|active| active.borrow().contains(&self.id))
    }

    // ── Delivery ─────────────────────────────────────────────────────

    /// Deliver `notification` to every handler registered for its kind,
    /// provided `epoch` is still current.
    pub(crate) fn emit(&self, epoch: u64, notification: &Notification) {
        if !self.is_current(epoch) {
            tracing::trace!(kind = %notification.kind(), "dropping notification from stale cycle");
            return;
        }
        let _scope = DispatchScope::enter(self);
        let kind = notification.kind();
        let handlers = self.registry().snapshot(kind);

        for (id, handler) in handlers {
            if !self.is_current(epoch) {
                break;
            }
            // Unsubscribed by an earlier handler in this same delivery.
            if !self.registry().contains(id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(subscription = %id, %kind, error = %e, "subscriber handler failed");
                }
                Err(_) => {
                    tracing::error!(subscription = %id, %kind, "subscriber handler panicked");
                }
            }
        }
    }
}

/// Marks this thread as dispatching for one dispatcher and holds its gate
/// (unless an outer scope on this thread already does).
struct DispatchScope<'a> {
    dispatcher_id: u64,
    _gate: Option<MutexGuard<'a, ()>>,
}

impl<'a> DispatchScope<'a> {
    fn enter(dispatcher: &'a Dispatcher) -> Self {
        let gate = if dispatcher.dispatching_here() {
            None
        } else {
            Some(dispatcher.gate.lock().unwrap_or_else(PoisonError::into_inner))
        };
        DISPATCHING.with(|active| active.borrow_mut().push(dispatcher.id));
        Self {
            dispatcher_id: dispatcher.id,
            _gate: gate,
        }
    }
}

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        DISPATCHING.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|id| *id == self.dispatcher_id) {
                active.remove(pos);
            }
        });
    }
}
