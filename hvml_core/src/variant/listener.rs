//! Post-mutation listeners attached to container variants.
//!
//! A listener is registered against a specific variant for a specific
//! event atom (`grow`, `shrink`, `change`). Listeners fire synchronously
//! on the mutating thread after the structural change is complete.
//!
//! Firing iterates a snapshot taken before the first callback runs, and
//! re-checks liveness per record, so a callback may revoke listeners
//! (including itself) without invalidating the iteration.

use crate::atom::Atom;
use crate::variant::Variant;
use smallvec::SmallVec;
use std::rc::Rc;

/// Callback invoked after a matching container mutation.
///
/// Receives the mutated variant, the event atom, and the event arguments
/// (`[key-new, value-new, key-old, value-old]` shaped, see the container
/// module). The return value is informational; `false` marks the event
/// as unhandled.
pub type ListenerCallback = Rc<dyn Fn(&Variant, Atom, &[Variant]) -> bool>;

/// A revocation handle for a registered listener.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ListenerHandle(u64);

struct ListenerRecord {
    id: u64,
    event: Atom,
    callback: ListenerCallback,
}

/// All listeners registered on one variant.
#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: u64,
    records: Vec<ListenerRecord>,
}

impl ListenerSet {
    /// Register a callback for `event`, returning its handle.
    pub(crate) fn register(&mut self, event: Atom, callback: ListenerCallback) -> ListenerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.records.push(ListenerRecord {
            id,
            event,
            callback,
        });
        ListenerHandle(id)
    }

    /// Remove the listener with `handle`. Revocation is idempotent:
    /// removing an already-removed handle is a no-op returning `false`.
    pub(crate) fn revoke(&mut self, handle: ListenerHandle) -> bool {
        match self.records.iter().position(|r| r.id == handle.0) {
            Some(idx) => {
                self.records.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Snapshot the callbacks matching `event`, in registration order.
    pub(crate) fn snapshot(&self, event: Atom) -> SmallVec<[(u64, ListenerCallback); 4]> {
        self.records
            .iter()
            .filter(|r| r.event == event)
            .map(|r| (r.id, Rc::clone(&r.callback)))
            .collect()
    }

    /// Whether the record with `id` is still registered.
    pub(crate) fn is_live(&self, id: u64) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    /// Number of live records (for tests and diagnostics).
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
