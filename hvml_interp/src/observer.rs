//! Observers and message dispatch.
//!
//! An observer subscribes a vDOM element (the handler body) to an
//! `(observed variant, event, sub-type)` triple. Observers live on the
//! coroutine in three lists keyed by the observed variant's kind; the
//! coroutine's `waits` counter tracks how many are alive, which is what
//! keeps a finished coroutine parked instead of terminated.
//!
//! A message is posted to the runloop and handled on the owner thread:
//! every matching observer gets a fresh frame pushed (ops from the
//! handler element), the coroutine is made ready, and the scheduler is
//! pumped inline.

use crate::coroutine::{CoState, Coroutine, CoroutineId};
use crate::instance::Instance;
use crate::scheduler;
use hvml_core::{Atom, Variant, VariantKind};
use hvml_dom::{ENodeId, VNodeId};
use hvml_exec::Pattern;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::{debug, trace};

/// One observer record.
pub struct Observer {
    /// Stable id for revocation.
    pub id: u64,
    /// The observed variant (held alive by this reference).
    pub observed: Variant,
    /// The event-type atom.
    pub event: Atom,
    /// Optional sub-type; literal or `/regex/`-form.
    pub sub: Option<String>,
    /// Scope for the handler frame.
    pub scope: Option<VNodeId>,
    /// Output-DOM insertion point for the handler frame.
    pub edom_element: Option<ENodeId>,
    /// The handler element (an `observe` vDOM node).
    pub pos: VNodeId,
}

impl Observer {
    /// Whether this observer matches `(source, event, sub)`.
    ///
    /// Sub matching is literal equality, or a regex match when the stored
    /// sub is a `/…/flags` string.
    #[must_use]
    pub fn matches(&self, source: &Variant, event: Atom, sub: Option<&str>) -> bool {
        if !self.observed.ptr_eq(source) || self.event != event {
            return false;
        }
        match (&self.sub, sub) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => {
                if mine == theirs {
                    return true;
                }
                match Pattern::parse(mine, None) {
                    Ok(p) if p.is_regex() => p.matches(theirs),
                    _ => false,
                }
            }
        }
    }
}

/// The three per-kind observer lists of one coroutine.
#[derive(Default)]
pub struct ObserverLists {
    /// Observers of dynamic variants.
    pub dynamic: Vec<Observer>,
    /// Observers of native variants.
    pub native: Vec<Observer>,
    /// Everything else.
    pub common: Vec<Observer>,
    next_id: u64,
    /// Live `(entity, event, sub)` registration counts, for the
    /// `on_observe` / `on_forget` native hooks.
    native_pairs: FxHashMap<(usize, Atom, Option<String>), u32>,
}

impl ObserverLists {
    fn list_for(&mut self, kind: VariantKind) -> &mut Vec<Observer> {
        match kind {
            VariantKind::Dynamic => &mut self.dynamic,
            VariantKind::Native => &mut self.native,
            _ => &mut self.common,
        }
    }

    /// Total live observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.common.len() + self.dynamic.len() + self.native.len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Register an observer on `co`, bumping its `waits` counter. For native
/// variants, the entity's `on_observe` fires on the first registration of
/// each `(event, sub)` pair.
pub fn register_observer(
    co: &mut Coroutine,
    observed: Variant,
    event: Atom,
    sub: Option<String>,
    scope: Option<VNodeId>,
    edom_element: Option<ENodeId>,
    pos: VNodeId,
) -> u64 {
    let lists = &mut co.stack.observers;
    let id = lists.next_id;
    lists.next_id += 1;

    if let Some(entity) = observed.as_native() {
        let key = (observed.id(), event, sub.clone());
        let count = lists.native_pairs.entry(key).or_insert(0);
        if *count == 0 {
            entity.on_observe(event, sub.as_deref());
        }
        *count += 1;
    }

    let kind = observed.kind();
    lists.list_for(kind).push(Observer {
        id,
        observed,
        event,
        sub,
        scope,
        edom_element,
        pos,
    });
    co.waits += 1;
    debug!(observer = id, event = %event, waits = co.waits, "observer registered");
    id
}

/// Revoke the observer with `id`, decrementing `waits`. Each record is
/// removed exactly once; revoking an unknown id is a no-op.
pub fn revoke_observer(co: &mut Coroutine, id: u64) -> bool {
    let lists = &mut co.stack.observers;
    let mut removed = None;
    for list in [&mut lists.common, &mut lists.dynamic, &mut lists.native] {
        if let Some(idx) = list.iter().position(|o| o.id == id) {
            removed = Some(list.remove(idx));
            break;
        }
    }
    let Some(observer) = removed else {
        return false;
    };

    if let Some(entity) = observer.observed.as_native() {
        let key = (observer.observed.id(), observer.event, observer.sub.clone());
        if let Some(count) = lists.native_pairs.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                lists.native_pairs.remove(&key);
                entity.on_forget(observer.event, observer.sub.as_deref());
            }
        }
    }

    debug_assert!(co.waits > 0);
    co.waits = co.waits.saturating_sub(1);
    debug!(observer = id, waits = co.waits, "observer revoked");
    true
}

/// Revoke the first observer matching `(observed, event, sub)`.
pub fn revoke_observer_matching(
    co: &mut Coroutine,
    observed: &Variant,
    event: Atom,
    sub: Option<&str>,
) -> bool {
    let lists = &co.stack.observers;
    let found = [&lists.common, &lists.dynamic, &lists.native]
        .into_iter()
        .flat_map(|l| l.iter())
        .find(|o| o.matches(observed, event, sub))
        .map(|o| o.id);
    match found {
        Some(id) => revoke_observer(co, id),
        None => false,
    }
}

/// Drain every observer list at coroutine shutdown, firing `on_forget`
/// exactly once per retiring native pair.
pub fn free_observer_lists(co: &mut Coroutine) {
    loop {
        let next = {
            let lists = &co.stack.observers;
            [&lists.common, &lists.dynamic, &lists.native]
                .into_iter()
                .flat_map(|l| l.iter())
                .map(|o| o.id)
                .next()
        };
        match next {
            Some(id) => {
                revoke_observer(co, id);
            }
            None => break,
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// A typed message addressed to one coroutine's observers.
pub struct Message {
    /// Target coroutine.
    pub co: CoroutineId,
    /// The source variant observers are matched against.
    pub source: Variant,
    /// Event-type atom.
    pub event: Atom,
    /// Optional sub-type.
    pub sub: Option<String>,
    /// Optional payload delivered to the handler's `<` input.
    pub extra: Option<Variant>,
}

/// Post `msg` to the runloop as a self-contained task.
pub fn dispatch_message(inst: &Rc<Instance>, msg: Message) {
    trace!(co = msg.co.raw(), event = %msg.event, sub = ?msg.sub, "message dispatched");
    inst.runloop.post(move || {
        if let Some(inst) = Instance::current() {
            handle_message(&inst, msg);
        }
    });
}

/// Deliver `msg`: push a handler frame per matching observer, make the
/// coroutine ready, and pump the scheduler inline.
pub fn handle_message(inst: &Rc<Instance>, msg: Message) {
    let Some(co_cell) = inst.heap.coroutine(msg.co) else {
        trace!(co = msg.co.raw(), "message for a gone coroutine dropped");
        return;
    };

    let mut woke = false;
    {
        let mut co = co_cell.borrow_mut();

        // Snapshot ids first: a handler may revoke observers while the
        // remaining matches are still being delivered.
        let matching: Vec<(u64, Option<VNodeId>, Option<ENodeId>, VNodeId)> = {
            let lists = &co.stack.observers;
            [&lists.common, &lists.dynamic, &lists.native]
                .into_iter()
                .flat_map(|l| l.iter())
                .filter(|o| o.matches(&msg.source, msg.event, msg.sub.as_deref()))
                .map(|o| (o.id, o.scope, o.edom_element, o.pos))
                .collect()
        };

        for (id, scope, edom, pos) in matching {
            // Re-check liveness: an earlier handler may have revoked it.
            let still_live = {
                let lists = &co.stack.observers;
                [&lists.common, &lists.dynamic, &lists.native]
                    .into_iter()
                    .flat_map(|l| l.iter())
                    .any(|o| o.id == id)
            };
            if !still_live {
                continue;
            }

            debug!(observer = id, event = %msg.event, "observer wakes");
            co.stack.push_frame_for(pos, false);
            if let Some(frame) = co.stack.top_mut() {
                frame.scope = scope;
                frame.edom_element = edom;
                if let Some(extra) = &msg.extra {
                    frame.set_input(extra.clone());
                }
            }
            co.stack.refresh_at();
            co.state = CoState::Ready;
            woke = true;
        }
    }

    if woke {
        scheduler::run_coroutines(inst);
    }
}
