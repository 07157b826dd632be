//! The request subsystem: raw/sync/async work crossing threads.
//!
//! A request is issued on the owner thread, serviced anywhere, and its
//! completion callback always runs back on the owner thread. The heap's
//! five request lists are the only cross-thread shared state, guarded by
//! one mutex; completion is marshalled through the runloop handle.
//!
//! ```text
//! PENDING ──activate──► ACTIVATING ──pickup──► (callback | HIBERNATING)
//!    │
//!    └─cancel──► CANCELLED ──activate──► DYING ──pickup──► released
//! ```

use crate::coroutine::{CoState, CoroutineId};
use crate::instance::Instance;
use crate::runloop::RunLoopHandle;
use parking_lot::Mutex;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Request flavor, deciding when the completion callback may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqKind {
    /// No frame association; runs as soon as it is picked up.
    Raw,
    /// Bound to the issuing frame; hibernates while that frame is not
    /// current.
    Sync,
    /// Bound to the coroutine; hibernates while it is not ready.
    Async,
}

/// Request life-cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqState {
    /// Issued, not yet serviced.
    Pending,
    /// Serviced; completion queued to the owner thread.
    Activating,
    /// Completion arrived while the binding was not runnable.
    Hibernating,
    /// Cancelled before service.
    Cancelled,
    /// Cancelled and serviced; awaiting release.
    Dying,
}

impl ReqState {
    fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Activating => "activating",
            Self::Hibernating => "hibernating",
            Self::Cancelled => "cancelled",
            Self::Dying => "dying",
        }
    }
}

/// Request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReqId(pub u64);

/// What the completion callback receives.
pub enum ReqOutcome {
    /// The serviced payload.
    Completed(String),
}

/// Completion callback; runs on the owner thread with the instance.
pub type ReqCallback = Box<dyn FnOnce(&Rc<Instance>, ReqOutcome) + Send>;

/// Cancel callback; runs on the issuing thread during `cancel_req`.
pub type CancelCallback = Box<dyn FnOnce() + Send>;

struct ReqRecord {
    id: ReqId,
    kind: ReqKind,
    owner: CoroutineId,
    /// Issuing frame depth (SYNC binding).
    frame_depth: Option<usize>,
    callback: Option<ReqCallback>,
    cancel: Option<CancelCallback>,
    payload: Option<String>,
}

/// The five heap request lists plus a transition journal.
#[derive(Default)]
pub struct RequestLists {
    pending: Vec<ReqRecord>,
    active: Vec<ReqRecord>,
    hibernating: Vec<ReqRecord>,
    cancelled: Vec<ReqRecord>,
    dying: Vec<ReqRecord>,
    next_id: u64,
    /// `(id, state-name)` transitions, in order. Drives shutdown
    /// verification.
    pub journal: Vec<(u64, &'static str)>,
}

impl RequestLists {
    fn list(&mut self, state: ReqState) -> &mut Vec<ReqRecord> {
        match state {
            ReqState::Pending => &mut self.pending,
            ReqState::Activating => &mut self.active,
            ReqState::Hibernating => &mut self.hibernating,
            ReqState::Cancelled => &mut self.cancelled,
            ReqState::Dying => &mut self.dying,
        }
    }

    fn take(&mut self, state: ReqState, id: ReqId) -> Option<ReqRecord> {
        let list = self.list(state);
        let idx = list.iter().position(|r| r.id == id)?;
        Some(list.remove(idx))
    }

    fn state_of(&self, id: ReqId) -> Option<ReqState> {
        for (state, list) in [
            (ReqState::Pending, &self.pending),
            (ReqState::Activating, &self.active),
            (ReqState::Hibernating, &self.hibernating),
            (ReqState::Cancelled, &self.cancelled),
            (ReqState::Dying, &self.dying),
        ] {
            if list.iter().any(|r| r.id == id) {
                return Some(state);
            }
        }
        None
    }

    fn push(&mut self, state: ReqState, record: ReqRecord) {
        self.journal.push((record.id.0, state.name()));
        self.list(state).push(record);
    }

    /// Whether every list is empty (asserted at shutdown).
    #[must_use]
    pub fn all_empty(&self) -> bool {
        self.pending.is_empty()
            && self.active.is_empty()
            && self.hibernating.is_empty()
            && self.cancelled.is_empty()
            && self.dying.is_empty()
    }

    /// Ids of pending requests owned by `co`.
    #[must_use]
    pub fn pending_of(&self, co: CoroutineId) -> Vec<ReqId> {
        self.pending
            .iter()
            .filter(|r| r.owner == co)
            .map(|r| r.id)
            .collect()
    }
}

/// A `Send` ticket the servicing side uses to complete a request.
#[derive(Clone)]
pub struct RequestTicket {
    id: ReqId,
    lists: Arc<Mutex<RequestLists>>,
    wakeup: RunLoopHandle,
}

impl RequestTicket {
    /// The request id.
    #[must_use]
    pub fn id(&self) -> ReqId {
        self.id
    }

    /// Service the request with `payload`. A pending request activates;
    /// a cancelled one transitions to dying and is released on pickup.
    pub fn complete(&self, payload: String) {
        let id = self.id;
        let mut lists = self.lists.lock();
        match lists.state_of(id) {
            Some(ReqState::Pending) => {
                let mut record = lists.take(ReqState::Pending, id).expect("state checked");
                record.payload = Some(payload);
                lists.push(ReqState::Activating, record);
                drop(lists);
                self.wakeup.dispatch(move || {
                    if let Some(inst) = Instance::current() {
                        on_req_activating(&inst, id);
                    }
                });
            }
            Some(ReqState::Cancelled) => {
                let record = lists.take(ReqState::Cancelled, id).expect("state checked");
                lists.push(ReqState::Dying, record);
                drop(lists);
                self.wakeup.dispatch(move || {
                    if let Some(inst) = Instance::current() {
                        on_req_dying(&inst, id);
                    }
                });
            }
            other => {
                warn!(req = id.0, state = ?other, "complete on unexpected state");
            }
        }
    }
}

/// Issue a request owned by `co`. `starter` receives the ticket and kicks
/// off the servicing work (possibly on another thread).
pub fn post_req(
    inst: &Rc<Instance>,
    kind: ReqKind,
    co: CoroutineId,
    frame_depth: Option<usize>,
    callback: ReqCallback,
    cancel: Option<CancelCallback>,
    starter: impl FnOnce(RequestTicket),
) -> ReqId {
    let lists = inst.heap_request_lists();
    let id = {
        let mut guard = lists.lock();
        guard.next_id += 1;
        let id = ReqId(guard.next_id);
        guard.push(
            ReqState::Pending,
            ReqRecord {
                id,
                kind,
                owner: co,
                frame_depth,
                callback: Some(callback),
                cancel,
                payload: None,
            },
        );
        id
    };
    debug!(req = id.0, ?kind, co = co.raw(), "request posted");

    starter(RequestTicket {
        id,
        lists,
        wakeup: inst.runloop.handle(),
    });
    id
}

/// Cancel a pending request; one already activating is left to its
/// callback path.
pub fn cancel_req(inst: &Rc<Instance>, id: ReqId) {
    let lists = inst.heap_request_lists();
    let cancel_cb = {
        let mut guard = lists.lock();
        match guard.state_of(id) {
            Some(ReqState::Pending) => {
                let mut record = guard.take(ReqState::Pending, id).expect("state checked");
                let cb = record.cancel.take();
                record.callback = None;
                guard.push(ReqState::Cancelled, record);
                cb
            }
            Some(ReqState::Activating) => None,
            other => {
                trace!(req = id.0, state = ?other, "cancel on settled request");
                None
            }
        }
    };
    debug!(req = id.0, "request cancelled");
    if let Some(cb) = cancel_cb {
        cb();
    }
}

/// Owner-thread pickup of an activating request.
pub fn on_req_activating(inst: &Rc<Instance>, id: ReqId) {
    let lists = inst.heap_request_lists();
    let record = {
        let mut guard = lists.lock();
        guard.take(ReqState::Activating, id)
    };
    let Some(mut record) = record else {
        return;
    };

    let runnable = match record.kind {
        ReqKind::Raw => true,
        ReqKind::Sync => {
            // Runs only while the issuing frame is current again.
            match inst.heap.coroutine(record.owner) {
                Some(cell) => {
                    let co = cell.borrow();
                    record.frame_depth == Some(co.stack.nr_frames().saturating_sub(1))
                }
                None => false,
            }
        }
        ReqKind::Async => match inst.heap.coroutine(record.owner) {
            Some(cell) => cell.borrow().state == CoState::Ready,
            None => false,
        },
    };

    if runnable {
        let payload = record.payload.take().unwrap_or_default();
        if let Some(cb) = record.callback.take() {
            trace!(req = id.0, "request callback runs");
            cb(inst, ReqOutcome::Completed(payload));
        }
        lists.lock().journal.push((id.0, "released"));
    } else {
        trace!(req = id.0, "request hibernates");
        lists.lock().push(ReqState::Hibernating, record);
    }
}

/// Owner-thread pickup of a dying request: release it.
pub fn on_req_dying(inst: &Rc<Instance>, id: ReqId) {
    let lists = inst.heap_request_lists();
    let mut guard = lists.lock();
    if guard.take(ReqState::Dying, id).is_some() {
        guard.journal.push((id.0, "released"));
        debug!(req = id.0, "request released");
    }
}

/// Re-examine hibernating requests of `co`; run those whose binding is
/// now runnable. Called by the scheduler when a coroutine's state or
/// frame depth changes.
pub fn pump_hibernating(inst: &Rc<Instance>, co: CoroutineId) {
    let lists = inst.heap_request_lists();
    let ids: Vec<ReqId> = {
        let guard = lists.lock();
        guard
            .hibernating
            .iter()
            .filter(|r| r.owner == co)
            .map(|r| r.id)
            .collect()
    };
    for id in ids {
        let record = {
            let mut guard = lists.lock();
            guard.take(ReqState::Hibernating, id)
        };
        if let Some(record) = record {
            let mut guard = lists.lock();
            guard.push(ReqState::Activating, record);
            drop(guard);
            on_req_activating(inst, id);
        }
    }
}

/// Track an async request id on the issuing coroutine's stack so that
/// shutdown can cancel it.
pub fn save_async_request_id(co: &mut crate::coroutine::Coroutine, id: ReqId) {
    let _ = co
        .stack
        .async_request_ids
        .array_append(hvml_core::Variant::ulongint(id.0));
}

/// Forget a completed async request id.
pub fn remove_async_request_id(co: &mut crate::coroutine::Coroutine, id: ReqId) {
    let ids = &co.stack.async_request_ids;
    for i in 0..ids.array_len() {
        if ids.array_get(i).and_then(|v| v.as_u64()) == Some(id.0) {
            let _ = ids.array_remove(i);
            break;
        }
    }
}

/// Cancel every pending request of `co` (shutdown path). Requests already
/// activating run out through their callback path; hibernating ones are
/// dropped and released.
pub fn cancel_all_of(inst: &Rc<Instance>, co: CoroutineId) {
    let lists = inst.heap_request_lists();
    let pending = lists.lock().pending_of(co);
    for id in pending {
        cancel_req(inst, id);
    }
    // Hibernating completions can never run once the coroutine is gone.
    let hibernating: Vec<ReqId> = {
        let guard = lists.lock();
        guard
            .hibernating
            .iter()
            .filter(|r| r.owner == co)
            .map(|r| r.id)
            .collect()
    };
    for id in hibernating {
        let mut guard = lists.lock();
        if guard.take(ReqState::Hibernating, id).is_some() {
            guard.journal.push((id.0, "released"));
        }
    }
}
