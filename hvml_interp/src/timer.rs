//! Timers: runloop wrappers, the `$TIMERS` document variable, and the
//! expression-observer tick.
//!
//! `$TIMERS` is a set variant (unique by `id`) bound at document scope.
//! A listener on the set translates `grow` into timer creation and start,
//! `shrink` into destruction; a per-element `change` listener translates
//! interval/active edits into `set_interval`/`start`/`stop`. On expiry a
//! timer dispatches `expired:<id>` against the set.

use crate::coroutine::{Coroutine, CoroutineId};
use crate::instance::Instance;
use crate::observer::{dispatch_message, Message};
use crate::runloop::TimerId;
use crate::vcm;
use hvml_core::atom::{events, Atom};
use hvml_core::Variant;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};

const TIMERS_KEY_ID: &str = "id";
const TIMERS_KEY_INTERVAL: &str = "interval";
const TIMERS_KEY_ACTIVE: &str = "active";
const TIMERS_ACTIVE_ON: &str = "on";
const TIMERS_VAR_NAME: &str = "TIMERS";
const EXPIRED_EVENT: &str = "expired";

/// Cadence of the expression-observer re-evaluation tick.
pub const EVENT_TIMER_INTERVAL: Duration = Duration::from_millis(10);

type InnerTimers = Rc<RefCell<FxHashMap<String, TimerId>>>;

/// The `$TIMERS` machinery of one coroutine.
pub struct DocTimers {
    /// The bound set variant.
    pub timers_var: Variant,
    inner: InnerTimers,
}

impl DocTimers {
    /// Drop every runloop timer (coroutine shutdown).
    pub fn teardown(&self, inst: &Instance) {
        for (_, id) in self.inner.borrow_mut().drain() {
            inst.runloop.timer_drop(id);
        }
    }
}

/// The `expired` event atom.
#[must_use]
pub fn expired_atom() -> Atom {
    hvml_core::atom::intern_in(hvml_core::atom::Bucket::Event, EXPIRED_EVENT)
}

fn fire_expired(inst: &Rc<Instance>, co: CoroutineId, timer_id: &str) {
    let Some(cell) = inst.heap.coroutine(co) else {
        return;
    };
    let source = {
        let co_ref = cell.borrow();
        match &co_ref.stack.doc_timers {
            Some(t) => t.timers_var.clone(),
            None => return,
        }
    };
    trace!(timer = timer_id, "timer expired");
    dispatch_message(
        inst,
        Message {
            co,
            source,
            event: expired_atom(),
            sub: Some(timer_id.to_owned()),
            extra: None,
        },
    );
}

fn start_timer_for(inst: &Instance, slot: TimerId, elem: &Variant) {
    let interval = elem
        .object_get(TIMERS_KEY_INTERVAL)
        .and_then(|v| v.cast_to_ulongint(true).ok())
        .unwrap_or(0);
    inst.runloop
        .timer_start(slot, Duration::from_millis(interval), true);
}

fn ensure_inner_timer(
    weak: &Weak<Instance>,
    co: CoroutineId,
    inner: &InnerTimers,
    elem: &Variant,
) -> Option<TimerId> {
    let inst = weak.upgrade()?;
    let id = elem.object_get(TIMERS_KEY_ID)?.stringify();
    if let Some(existing) = inner.borrow().get(&id) {
        return Some(*existing);
    }

    let slot = {
        let weak = weak.clone();
        let fire_id = id.clone();
        inst.runloop.timer_new(Rc::new(move |_| {
            if let Some(inst) = weak.upgrade() {
                fire_expired(&inst, co, &fire_id);
            }
        }))
    };
    inner.borrow_mut().insert(id.clone(), slot);
    debug!(timer = %id, "timer created");

    // Per-element edits (interval, active) drive the inner timer.
    let change_weak = weak.clone();
    let change_inner = Rc::clone(inner);
    elem.register_post_listener(
        events::change(),
        Rc::new(move |source, _event, args| {
            let Some(inst) = change_weak.upgrade() else {
                return false;
            };
            let Some(id_var) = source.object_get(TIMERS_KEY_ID) else {
                return false;
            };
            let Some(slot) = change_inner.borrow().get(&id_var.stringify()).copied() else {
                return false;
            };
            let key = args.first().map(Variant::stringify).unwrap_or_default();
            if key == TIMERS_KEY_INTERVAL {
                start_timer_for(&inst, slot, source);
            } else if key == TIMERS_KEY_ACTIVE {
                let on = args
                    .get(1)
                    .is_some_and(|v| v.stringify() == TIMERS_ACTIVE_ON);
                if on {
                    start_timer_for(&inst, slot, source);
                } else {
                    inst.runloop.timer_stop(slot);
                }
            }
            true
        }),
    );

    Some(slot)
}

/// Bind `$TIMERS` at document scope and wire its listeners.
pub fn timers_init(inst: &Rc<Instance>, co: &mut Coroutine) {
    let timers_var = Variant::set_by_key(Some(TIMERS_KEY_ID));
    let inner: InnerTimers = Rc::new(RefCell::new(FxHashMap::default()));
    let weak = Rc::downgrade(inst);
    let co_id = co.id;

    // grow: create + start when active.
    {
        let weak = weak.clone();
        let inner = Rc::clone(&inner);
        timers_var.register_post_listener(
            events::grow(),
            Rc::new(move |_source, _event, args| {
                let Some(elem) = args.first() else {
                    return false;
                };
                let Some(slot) = ensure_inner_timer(&weak, co_id, &inner, elem) else {
                    warn!("timer element without an id ignored");
                    return false;
                };
                let Some(inst) = weak.upgrade() else {
                    return false;
                };
                let active = elem
                    .object_get(TIMERS_KEY_ACTIVE)
                    .is_some_and(|v| v.stringify() == TIMERS_ACTIVE_ON);
                if active {
                    start_timer_for(&inst, slot, elem);
                }
                true
            }),
        );
    }

    // shrink: destroy.
    {
        let weak = weak.clone();
        let inner = Rc::clone(&inner);
        timers_var.register_post_listener(
            events::shrink(),
            Rc::new(move |_source, _event, args| {
                let Some(elem) = args.first() else {
                    return false;
                };
                let Some(id) = elem.object_get(TIMERS_KEY_ID) else {
                    return false;
                };
                if let Some(slot) = inner.borrow_mut().remove(&id.stringify()) {
                    if let Some(inst) = weak.upgrade() {
                        inst.runloop.timer_drop(slot);
                        debug!(timer = %id.stringify(), "timer destroyed");
                    }
                }
                true
            }),
        );
    }

    let doc_node = co.stack.vdom.document_node();
    co.stack
        .scoped
        .bind(doc_node, TIMERS_VAR_NAME, timers_var.clone());
    co.stack.doc_timers = Some(DocTimers { timers_var, inner });
}

// =============================================================================
// Expression-Observer Tick
// =============================================================================

/// Start the shared 10 ms tick when the first expression observer
/// registers.
pub fn ensure_event_timer(inst: &Rc<Instance>, co: &mut Coroutine) {
    if co.stack.event_timer.is_some() {
        return;
    }
    let weak = Rc::downgrade(inst);
    let co_id = co.id;
    let id = inst.runloop.timer_new(Rc::new(move |_| {
        if let Some(inst) = weak.upgrade() {
            event_timer_tick(&inst, co_id);
        }
    }));
    inst.runloop.timer_start(id, EVENT_TIMER_INTERVAL, true);
    co.stack.event_timer = Some(id);
    debug!(co = co_id.raw(), "expression tick started");
}

/// Re-evaluate every observed expression variable; dispatch `change` only
/// when the new value differs from the cached last value.
pub fn event_timer_tick(inst: &Rc<Instance>, co: CoroutineId) {
    let Some(cell) = inst.heap.coroutine(co) else {
        return;
    };
    let changed: Vec<Variant> = {
        let co_ref = cell.borrow();
        let stack = &co_ref.stack;
        let mut changed = Vec::new();
        for obs in &stack.observers.native {
            let is_changed = vcm::with_expr_var(&obs.observed, |expr| {
                match expr.evaluate(stack, true) {
                    Ok(new) => expr.update_last_value(&new),
                    Err(_) => false,
                }
            })
            .unwrap_or(false);
            if is_changed && !changed.iter().any(|c: &Variant| c.ptr_eq(&obs.observed)) {
                changed.push(obs.observed.clone());
            }
        }
        changed
    };

    for source in changed {
        dispatch_message(
            inst,
            Message {
                co,
                source,
                event: events::change(),
                sub: None,
                extra: None,
            },
        );
    }
}
