//! Events: `$TIMERS` expiry, observer registration and revocation,
//! message sub-type matching, and wait accounting.

use hvml_core::atom::{events, intern_in, Bucket};
use hvml_core::Variant;
use hvml_dom::vcm::VcmNode;
use hvml_dom::{VdomBuilder, VdomDocument};
use hvml_interp::observer::{register_observer, revoke_observer, Observer};
use hvml_interp::{CoroutineId, Instance};
use std::rc::Rc;

fn timer_elem(id: &str, interval: u64, active: &str) -> hvml_dom::Vcm {
    VcmNode::object(vec![
        ("id", VcmNode::text(id)),
        ("interval", VcmNode::ulongint(interval)),
        ("active", VcmNode::text(active)),
    ])
}

fn run_doc(vdom: Rc<VdomDocument>) -> (Rc<Instance>, CoroutineId) {
    let inst = Instance::boot(None);
    let co = inst.schedule_vdom(vdom);
    inst.run().expect("run failed");
    (inst, co)
}

// =============================================================================
// A. Timer Expiry
// =============================================================================

#[test]
fn test_timer_expiry_wakes_the_observer() {
    // Arm a 20 ms timer, observe its expiry, exit from the handler.
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("update")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("to", VcmNode::text("append"))
        .attr_eq("with", timer_elem("t", 20, "on"))
        .close()
        .open("observe")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("for", VcmNode::text("expired:t"))
        .open("exit")
        .attr_eq("with", VcmNode::text("fired"))
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co) = run_doc(doc);
    assert_eq!(inst.coroutine_result(co).unwrap().stringify(), "fired");
    assert!(inst.coroutine_exception(co).is_none());
}

#[test]
fn test_inactive_timer_never_fires_but_forget_unparks() {
    // The timer is off; a second 30 ms timer drives a forget that drops
    // the only observer, letting the coroutine terminate.
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("update")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("to", VcmNode::text("append"))
        .attr_eq("with", timer_elem("silent", 10, "off"))
        .close()
        .open("update")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("to", VcmNode::text("append"))
        .attr_eq("with", timer_elem("sweeper", 30, "on"))
        .close()
        .open("observe")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("for", VcmNode::text("expired:silent"))
        .open("exit")
        .attr_eq("with", VcmNode::text("wrong"))
        .close()
        .close()
        .open("observe")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("for", VcmNode::text("expired:sweeper"))
        .open("forget")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("for", VcmNode::text("expired:silent"))
        .close()
        .open("forget")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("for", VcmNode::text("expired:sweeper"))
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co) = run_doc(doc);
    // Neither exit ran; the run ended because every observer was revoked.
    assert!(inst.coroutine_result(co).is_none());
    assert!(inst.coroutine_exception(co).is_none());
}

// =============================================================================
// B. Observer Records
// =============================================================================

fn bare_coroutine() -> (Rc<Instance>, CoroutineId) {
    let inst = Instance::boot(None);
    let vdom = VdomBuilder::new().open("hvml").close().finish();
    let co = inst.heap.new_coroutine(vdom);
    (inst, co)
}

#[test]
fn test_waits_counter_tracks_observer_lists() {
    let (inst, co_id) = bare_coroutine();
    let cell = inst.heap.coroutine(co_id).unwrap();
    let mut co = cell.borrow_mut();
    let pos = co.stack.vdom.document_element().unwrap();

    let source = Variant::array();
    let a = register_observer(
        &mut co,
        source.clone(),
        events::grow(),
        None,
        None,
        None,
        pos,
    );
    let b = register_observer(
        &mut co,
        source.clone(),
        events::shrink(),
        Some("x".into()),
        None,
        None,
        pos,
    );
    assert_eq!(co.waits, 2);
    assert_eq!(co.stack.observers.len(), 2);

    assert!(revoke_observer(&mut co, a));
    assert_eq!(co.waits, 1);
    // A second revocation of the same id is a no-op.
    assert!(!revoke_observer(&mut co, a));
    assert_eq!(co.waits, 1);

    assert!(revoke_observer(&mut co, b));
    assert_eq!(co.waits, 0);
    assert!(co.stack.observers.is_empty());
}

#[test]
fn test_observer_matching_literal_and_regex() {
    let source = Variant::array();
    let other = Variant::array();
    let event = events::grow();

    let literal = Observer {
        id: 1,
        observed: source.clone(),
        event,
        sub: Some("alpha".into()),
        scope: None,
        edom_element: None,
        pos: VdomBuilder::new()
            .open("hvml")
            .close()
            .finish()
            .document_element()
            .unwrap(),
    };

    assert!(literal.matches(&source, event, Some("alpha")));
    assert!(!literal.matches(&source, event, Some("beta")));
    assert!(!literal.matches(&other, event, Some("alpha")));
    assert!(!literal.matches(&source, events::shrink(), Some("alpha")));

    let regex = Observer {
        sub: Some("/^a.*a$/".into()),
        ..literal
    };
    assert!(regex.matches(&source, event, Some("alpha")));
    assert!(!regex.matches(&source, event, Some("beta")));
}

#[test]
fn test_native_on_observe_and_on_forget_pair_once() {
    use hvml_core::NativeEntity;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Probe {
        log: RefCell<Vec<&'static str>>,
    }
    impl NativeEntity for Probe {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn on_observe(&self, _event: hvml_core::Atom, _sub: Option<&str>) {
            self.log.borrow_mut().push("observe");
        }
        fn on_forget(&self, _event: hvml_core::Atom, _sub: Option<&str>) {
            self.log.borrow_mut().push("forget");
        }
    }

    let (inst, co_id) = bare_coroutine();
    let cell = inst.heap.coroutine(co_id).unwrap();
    let mut co = cell.borrow_mut();
    let pos = co.stack.vdom.document_element().unwrap();

    let entity = Rc::new(Probe::default());
    let native = Variant::native(entity.clone());
    let event = intern_in(Bucket::Event, "change");

    // Two observers on the same (event, sub): one on_observe.
    let a = register_observer(&mut co, native.clone(), event, None, None, None, pos);
    let b = register_observer(&mut co, native.clone(), event, None, None, None, pos);
    assert_eq!(&*entity.log.borrow(), &["observe"]);

    // on_forget only when the last one goes.
    revoke_observer(&mut co, a);
    assert_eq!(&*entity.log.borrow(), &["observe"]);
    revoke_observer(&mut co, b);
    assert_eq!(&*entity.log.borrow(), &["observe", "forget"]);
}
