//! The request subsystem across threads: raw completion, async
//! cancellation at shutdown, and the state journal.

use hvml_dom::vcm::VcmNode;
use hvml_dom::VdomBuilder;
use hvml_interp::request::{post_req, ReqKind, ReqOutcome, RequestTicket};
use hvml_interp::Instance;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A document that arms a timer and exits when it fires, keeping the
/// runloop alive for `ms` milliseconds.
fn doc_exiting_after(ms: u64) -> Rc<hvml_dom::VdomDocument> {
    VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("update")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("to", VcmNode::text("append"))
        .attr_eq(
            "with",
            VcmNode::object(vec![
                ("id", VcmNode::text("quit")),
                ("interval", VcmNode::ulongint(ms)),
                ("active", VcmNode::text("on")),
            ]),
        )
        .close()
        .open("observe")
        .attr_eq("on", VcmNode::named("TIMERS"))
        .attr_eq("for", VcmNode::text("expired:quit"))
        .open("exit")
        .attr_eq("with", VcmNode::text("bye"))
        .close()
        .close()
        .close()
        .close()
        .finish()
}

fn journal_of(inst: &Instance, id: u64) -> Vec<&'static str> {
    inst.heap
        .requests
        .lock()
        .journal
        .iter()
        .filter(|(req, _)| *req == id)
        .map(|(_, state)| *state)
        .collect()
}

// =============================================================================
// A. Raw Requests
// =============================================================================

#[test]
fn test_raw_request_completes_on_the_owner_thread() {
    let inst = Instance::boot(None);
    let co = inst.schedule_vdom(doc_exiting_after(40));

    let seen = Arc::new(Mutex::new(None::<String>));
    let seen2 = Arc::clone(&seen);
    let id = post_req(
        &inst,
        ReqKind::Raw,
        co,
        None,
        Box::new(move |inst, outcome| {
            assert!(inst.is_current_thread());
            let ReqOutcome::Completed(payload) = outcome;
            *seen2.lock().unwrap() = Some(payload);
        }),
        None,
        |ticket| {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                ticket.complete("payload".to_owned());
            });
        },
    );

    inst.run().unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some("payload"));
    assert_eq!(
        journal_of(&inst, id.0),
        vec!["pending", "activating", "released"]
    );
}

// =============================================================================
// B. Async Cancellation at Shutdown
// =============================================================================

#[test]
fn test_async_requests_cancelled_when_the_coroutine_exits() {
    // The coroutine exits at ~20 ms; the fetches complete at ~40 ms; a
    // second coroutine keeps the loop alive until ~70 ms so the dying
    // requests get released.
    let inst = Instance::boot(None);
    let co_a = inst.schedule_vdom(doc_exiting_after(20));
    let _co_b = inst.schedule_vdom(doc_exiting_after(70));

    let fired = Arc::new(AtomicBool::new(false));
    let tickets: Arc<Mutex<Vec<RequestTicket>>> = Arc::new(Mutex::new(Vec::new()));

    let mut ids = Vec::new();
    for _ in 0..2 {
        let fired2 = Arc::clone(&fired);
        let tickets2 = Arc::clone(&tickets);
        let id = post_req(
            &inst,
            ReqKind::Async,
            co_a,
            None,
            Box::new(move |_inst, _outcome| {
                fired2.store(true, Ordering::SeqCst);
            }),
            Some(Box::new(|| {})),
            |ticket| {
                tickets2.lock().unwrap().push(ticket);
            },
        );
        ids.push(id);
        if let Some(cell) = inst.heap.coroutine(co_a) {
            hvml_interp::request::save_async_request_id(&mut cell.borrow_mut(), id);
        }
    }

    // The "fetcher": completes both requests after the owner exited.
    {
        let tickets = Arc::clone(&tickets);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            for t in tickets.lock().unwrap().drain(..) {
                t.complete("late".to_owned());
            }
        });
    }

    inst.run().unwrap();

    assert!(
        !fired.load(Ordering::SeqCst),
        "no callback may fire after shutdown"
    );
    for id in ids {
        assert_eq!(
            journal_of(&inst, id.0),
            vec!["pending", "cancelled", "dying", "released"],
            "request {} walked the wrong path",
            id.0
        );
    }
    assert!(inst.heap.requests.lock().all_empty());
}
