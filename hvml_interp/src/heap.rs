//! The heap: the process-wide registry of coroutines and requests.
//!
//! Coroutines run only on the owner thread; the mutex guards nothing but
//! the request lists, which other threads touch through the request
//! subsystem. Results of terminated coroutines stay queryable until the
//! heap is dropped.

use crate::coroutine::{Coroutine, CoroutineId};
use crate::exception::Exception;
use crate::request::RequestLists;
use hvml_core::Variant;
use hvml_dom::VdomDocument;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

/// What a terminated coroutine left behind.
#[derive(Clone)]
pub struct CoResult {
    /// The final value (from `exit with` or the root frame's result).
    pub value: Option<Variant>,
    /// The unhandled exception, if the coroutine died with one.
    pub exception: Option<Exception>,
    /// The output document, serialized at termination.
    pub doc_html: Option<String>,
}

/// The per-instance heap.
///
/// The registry is keyed by id so lookups never touch the coroutine
/// cells themselves; a lookup while another coroutine is mid-step must
/// not borrow it.
pub struct Heap {
    coroutines: RefCell<Vec<(CoroutineId, Rc<RefCell<Coroutine>>)>>,
    running: Cell<Option<CoroutineId>>,
    next_id: Cell<u64>,
    /// The five request lists, shared with requesting threads.
    pub requests: Arc<Mutex<RequestLists>>,
    results: RefCell<FxHashMap<CoroutineId, CoResult>>,
    last_exception: RefCell<Option<Exception>>,
}

impl Heap {
    /// An empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            coroutines: RefCell::new(Vec::new()),
            running: Cell::new(None),
            next_id: Cell::new(1),
            requests: Arc::new(Mutex::new(RequestLists::default())),
            results: RefCell::new(FxHashMap::default()),
            last_exception: RefCell::new(None),
        }
    }

    /// Create a ready coroutine over `vdom` and link it into the heap.
    pub fn new_coroutine(&self, vdom: Rc<VdomDocument>) -> CoroutineId {
        let id = CoroutineId::new(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        let co = Coroutine::new(id, vdom);
        self.coroutines
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(co))));
        id
    }

    /// The coroutine cell for `id`, if it is still linked.
    #[must_use]
    pub fn coroutine(&self, id: CoroutineId) -> Option<Rc<RefCell<Coroutine>>> {
        self.coroutines
            .borrow()
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|(_, cell)| Rc::clone(cell))
    }

    /// Snapshot of the live coroutine cells (sweep iteration order).
    #[must_use]
    pub fn coroutine_cells(&self) -> Vec<Rc<RefCell<Coroutine>>> {
        self.coroutines
            .borrow()
            .iter()
            .map(|(_, cell)| Rc::clone(cell))
            .collect()
    }

    /// Number of live coroutines.
    #[must_use]
    pub fn coroutine_count(&self) -> usize {
        self.coroutines.borrow().len()
    }

    /// Unlink `id` from the heap, recording its result.
    pub fn unlink_coroutine(&self, id: CoroutineId, result: CoResult) {
        if let Some(exc) = &result.exception {
            *self.last_exception.borrow_mut() = Some(exc.clone());
        }
        self.coroutines.borrow_mut().retain(|(cid, _)| *cid != id);
        self.results.borrow_mut().insert(id, result);
    }

    /// The exception of the most recently terminated coroutine, if any.
    #[must_use]
    pub fn last_exception(&self) -> Option<Exception> {
        self.last_exception.borrow().clone()
    }

    /// The recorded result of a terminated coroutine.
    #[must_use]
    pub fn result(&self, id: CoroutineId) -> Option<CoResult> {
        self.results.borrow().get(&id).cloned()
    }

    /// The coroutine currently inside a phase transition.
    #[must_use]
    pub fn running_coroutine(&self) -> Option<CoroutineId> {
        self.running.get()
    }

    /// Mark `id` as the running coroutine (or none).
    pub fn set_running(&self, id: Option<CoroutineId>) {
        self.running.set(id);
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvml_dom::VdomBuilder;

    #[test]
    fn test_link_unlink_lifecycle() {
        let heap = Heap::new();
        let vdom = VdomBuilder::new().open("hvml").close().finish();
        let id = heap.new_coroutine(vdom);
        assert_eq!(heap.coroutine_count(), 1);
        assert!(heap.coroutine(id).is_some());

        heap.unlink_coroutine(
            id,
            CoResult {
                value: Some(Variant::string("done")),
                exception: None,
                doc_html: None,
            },
        );
        assert_eq!(heap.coroutine_count(), 0);
        assert!(heap.coroutine(id).is_none());
        assert_eq!(
            heap.result(id).unwrap().value.unwrap().stringify(),
            "done"
        );
    }
}
