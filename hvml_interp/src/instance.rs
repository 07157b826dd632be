//! The per-thread interpreter instance.
//!
//! One instance owns the heap, the runloop, and the renderer connection.
//! It is installed as the thread's current instance at boot; cross-thread
//! completions reach it by posting tasks that resolve the current
//! instance on arrival.

use crate::coroutine::CoroutineId;
use crate::heap::Heap;
use crate::rdr::{RdrConn, RendererEndpoint};
use crate::request::RequestLists;
use crate::runloop::RunLoop;
use crate::{dvobjs, scheduler, timer};
use hvml_core::{CoreError, CoreResult, Variant};
use hvml_dom::VdomDocument;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::ThreadId;
use tracing::{info, warn};

thread_local! {
    static CURRENT: RefCell<Option<Rc<Instance>>> = const { RefCell::new(None) };
}

/// The per-thread interpreter instance.
pub struct Instance {
    /// The owner-thread runloop.
    pub runloop: RunLoop,
    /// The coroutine/request registry.
    pub heap: Heap,
    /// The renderer connection, when a renderer is attached.
    pub rdr_conn: RefCell<Option<RdrConn>>,
    owner: ThreadId,
}

impl Instance {
    /// Create an instance bound to the calling thread and install it as
    /// the thread's current instance. Passing a renderer endpoint enables
    /// the attach step and DOM mirroring.
    pub fn boot(renderer: Option<Rc<dyn RendererEndpoint>>) -> Rc<Self> {
        let inst = Rc::new(Self {
            runloop: RunLoop::new(),
            heap: Heap::new(),
            rdr_conn: RefCell::new(renderer.map(RdrConn::new)),
            owner: std::thread::current().id(),
        });
        CURRENT.with(|c| *c.borrow_mut() = Some(Rc::clone(&inst)));
        info!("interpreter instance booted");
        inst
    }

    /// The calling thread's current instance.
    #[must_use]
    pub fn current() -> Option<Rc<Self>> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// Uninstall the thread's current instance.
    pub fn shutdown() {
        CURRENT.with(|c| *c.borrow_mut() = None);
    }

    /// Whether the caller is on the owner thread. The sole cross-thread
    /// guard: everything but the request lists asserts this.
    #[must_use]
    pub fn is_current_thread(&self) -> bool {
        std::thread::current().id() == self.owner
    }

    /// The shared request lists (the only mutex-guarded state).
    #[must_use]
    pub fn heap_request_lists(&self) -> Arc<Mutex<RequestLists>> {
        Arc::clone(&self.heap.requests)
    }

    // =========================================================================
    // Driving
    // =========================================================================

    /// Create a ready coroutine over `vdom` with the built-in document
    /// variables bound (`$TIMERS`, `$L`, `$SYSTEM`, …).
    pub fn schedule_vdom(self: &Rc<Self>, vdom: Rc<VdomDocument>) -> CoroutineId {
        debug_assert!(self.is_current_thread());
        let id = self.heap.new_coroutine(vdom);
        if let Some(cell) = self.heap.coroutine(id) {
            let mut co = cell.borrow_mut();
            dvobjs::bind_document_variables(self, &mut co);
            timer::timers_init(self, &mut co);
        }
        info!(co = id.raw(), "coroutine scheduled");
        id
    }

    /// Hand a host-provided variable bundle to a coroutine: bound at
    /// document scope under `name` and released with the coroutine.
    pub fn load_external_var(&self, co: CoroutineId, name: &str, bundle: Variant) -> bool {
        let Some(cell) = self.heap.coroutine(co) else {
            return false;
        };
        let mut co_ref = cell.borrow_mut();
        let doc_node = co_ref.stack.vdom.document_node();
        co_ref.stack.scoped.bind(doc_node, name, bundle.clone());
        co_ref.stack.loaded_vars.insert(name.to_owned(), bundle);
        true
    }

    /// Queue a scheduler sweep.
    pub fn coroutine_ready(self: &Rc<Self>) {
        let inst = Rc::clone(self);
        self.runloop.post(move || scheduler::run_coroutines(&inst));
    }

    /// Run until every coroutine has exited. Returns the last captured
    /// unhandled exception, if any coroutine died with one.
    pub fn run(self: &Rc<Self>) -> CoreResult<()> {
        debug_assert!(self.is_current_thread());
        self.coroutine_ready();
        self.runloop.run();

        if !self.heap.requests.lock().all_empty() {
            warn!("request lists not drained at shutdown");
        }

        match scheduler::last_exception(self) {
            Some(exc) => Err(CoreError::raised(exc.atom, exc.info)),
            None => Ok(()),
        }
    }

    /// The final value of a terminated coroutine.
    #[must_use]
    pub fn coroutine_result(&self, id: CoroutineId) -> Option<Variant> {
        self.heap.result(id).and_then(|r| r.value)
    }

    /// The output document of `id`: the live tree for a running
    /// coroutine, or the snapshot taken at termination.
    #[must_use]
    pub fn document_html(&self, id: CoroutineId) -> Option<String> {
        if let Some(cell) = self.heap.coroutine(id) {
            let co = cell.borrow();
            let s = co.stack.doc.borrow().serialize();
            return Some(s);
        }
        self.heap.result(id).and_then(|r| r.doc_html)
    }

    /// The unhandled exception a terminated coroutine died with, if any.
    #[must_use]
    pub fn coroutine_exception(&self, id: CoroutineId) -> Option<crate::exception::Exception> {
        self.heap.result(id).and_then(|r| r.exception)
    }
}
