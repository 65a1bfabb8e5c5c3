// ── Subscriber registry ──
//
// Event kind → handlers in insertion order. Dispatch iterates a snapshot,
// so handlers may subscribe or unsubscribe (themselves included) while a
// notification is being delivered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::event::{EventKind, Notification};

/// A subscriber callback.
pub type Handler = Arc<dyn Fn(&Notification) -> Result<(), HandlerError> + Send + Sync>;

pub(crate) fn handler<F>(f: F) -> Handler
where
    F: Fn(&Notification) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Token returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    by_kind: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
    kinds: HashMap<SubscriptionId, EventKind>,
}

impl SubscriberRegistry {
    pub fn insert(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.by_kind.entry(kind).or_default().push((id, handler));
        self.kinds.insert(id, kind);
        id
    }

    /// Remove a handler. Returns `false` if `id` was not registered.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(kind) = self.kinds.remove(&id) else {
            return false;
        };
        if let Some(handlers) = self.by_kind.get_mut(&kind) {
            handlers.retain(|(existing, _)| *existing != id);
            if handlers.is_empty() {
                self.by_kind.remove(&kind);
            }
        }
        true
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.kinds.contains_key(&id)
    }

    /// Copy of the handlers for `kind`, in delivery order.
    pub fn snapshot(&self, kind: EventKind) -> Vec<(SubscriptionId, Handler)> {
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
