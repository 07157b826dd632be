//! The cooperative scheduler.
//!
//! One sweep advances every ready coroutine by exactly one frame-phase
//! transition:
//!
//! ```text
//! AFTER_PUSHED : run after_pushed; ok -> SELECT_CHILD, else ON_POPPING
//! SELECT_CHILD : run select_child; child -> push frame; none -> ON_POPPING
//! ON_POPPING   : run on_popping; true -> pop frame, else RERUN
//! RERUN        : run rerun; -> SELECT_CHILD
//! ```
//!
//! Errors crossing a step boundary are captured into the coroutine's
//! exception slot and the coroutine keeps stepping, so `catch` frames
//! downstream can consume them. After the sweep, remaining readies
//! re-post the sweep; when nothing is ready and nothing waits, the
//! runloop stops.

use crate::coroutine::{CoState, Coroutine};
use crate::frame::NextStep;
use crate::heap::CoResult;
use crate::instance::Instance;
use crate::observer::free_observer_lists;
use crate::ops::StepCtx;
use crate::request::{self, ReqId};
use crate::exception::Exception;
use crate::stack::{BackAnchor, StackStage};
use hvml_core::CoreResult;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error, trace, warn};

/// Advance every coroutine once, then reschedule or stop the loop.
pub fn run_coroutines(inst: &Rc<Instance>) {
    let mut readies = 0usize;
    let mut waits = 0usize;

    for cell in inst.heap.coroutine_cells() {
        let alive = run_co(inst, &cell);
        if !alive {
            continue;
        }
        match cell.borrow().state {
            CoState::Ready => readies += 1,
            CoState::Wait => waits += 1,
            CoState::Run => {
                // Legal only when a preemptor parked the coroutine
                // mid-transition; it resumes on the next sweep.
                readies += 1;
            }
        }
    }

    if readies > 0 {
        inst.coroutine_ready();
    } else if waits == 0 {
        debug!("all coroutines exited; stopping the loop");
        inst.runloop.stop();
    }
}

/// Returns whether the coroutine is still alive.
fn run_co(inst: &Rc<Instance>, cell: &Rc<RefCell<Coroutine>>) -> bool {
    let (has_frames, exited, state) = {
        let co = cell.borrow();
        (co.stack.nr_frames() > 0, co.stack.exited, co.state)
    };

    if has_frames {
        match state {
            CoState::Ready | CoState::Run => execute_one_step(inst, cell),
            CoState::Wait => true,
        }
    } else if exited {
        terminate(inst, cell);
        false
    } else {
        true
    }
}

/// One phase transition plus the step-boundary bookkeeping.
fn execute_one_step(inst: &Rc<Instance>, cell: &Rc<RefCell<Coroutine>>) -> bool {
    let finished = {
        let mut co = cell.borrow_mut();
        co.state = CoState::Run;
        inst.heap.set_running(Some(co.id));

        let step_result = {
            let mut ctx = StepCtx {
                inst,
                co: &mut co,
            };
            step_frame(&mut ctx)
        };

        co.state = CoState::Ready;
        inst.heap.set_running(None);

        // Move a step-boundary error into the exception slot.
        if let Err(err) = step_result {
            let silently = co.stack.top().is_some_and(|f| f.silently);
            if silently {
                warn!(%err, "silent frame demoted an error");
            } else if co.stack.exception.is_none() {
                debug!(%err, "exception captured");
                co.stack.capture_exception(&err);
            } else {
                trace!(%err, "error while an exception travels; kept the first");
            }
        }

        // Non-local unwinds installed by exit/back.
        if let Some(anchor) = co.stack.back_anchor.take() {
            match anchor {
                BackAnchor::Exit(value) => {
                    co.stack.co_result = Some(value);
                    co.stack.unwind_to(0);
                    // An explicit exit overrides parking on live observers.
                    co.stack.exited = true;
                }
                BackAnchor::ToFrame { depth, with } => {
                    co.stack.unwind_to(depth + 1);
                    if let Some(value) = with {
                        if let Some(top) = co.stack.top_mut() {
                            top.set_question(value);
                        }
                    }
                }
            }
        }

        if co.stack.nr_frames() == 0 {
            // End of a full round.
            if co.stack.stage == StackStage::FirstRound {
                if let Err(err) = attach_renderer(inst, &mut co) {
                    warn!(%err, "renderer attach failed");
                    co.stack.capture_exception(&err);
                    co.stack.exited = true;
                }
                co.stack.stage = StackStage::EventLoop;
            }

            if !co.stack.exited {
                if co.stack.exception.is_none() && co.waits > 0 {
                    trace!(co = co.id.raw(), waits = co.waits, "coroutine parks");
                    co.state = CoState::Wait;
                } else {
                    co.stack.exited = true;
                }
            }
            co.stack.exited
        } else {
            false
        }
    };

    if finished {
        terminate(inst, cell);
        return false;
    }

    let co_id = cell.borrow().id;
    request::pump_hibernating(inst, co_id);
    true
}

/// The pure phase dispatcher: preemptor first, then `next_step`.
fn step_frame(ctx: &mut StepCtx) -> CoreResult<()> {
    let (preemptor, next_step, ops) = {
        let Some(frame) = ctx.co.stack.top_mut() else {
            return Ok(());
        };
        (frame.preemptor.take(), frame.next_step, frame.ops)
    };

    if let Some(preemptor) = preemptor {
        trace!("preemptor runs");
        return preemptor(ctx);
    }

    match next_step {
        NextStep::AfterPushed => {
            let outcome = match ops.after_pushed {
                Some(f) => f(ctx),
                None => Ok(true),
            };
            match outcome {
                Ok(true) => {
                    ctx.frame()?.next_step = NextStep::SelectChild;
                    Ok(())
                }
                Ok(false) => {
                    ctx.frame()?.next_step = NextStep::OnPopping;
                    Ok(())
                }
                Err(err) => {
                    ctx.frame()?.next_step = NextStep::OnPopping;
                    Err(err)
                }
            }
        }

        NextStep::SelectChild => {
            let outcome = match ops.select_child {
                Some(f) => f(ctx),
                None => Ok(None),
            };
            match outcome {
                Ok(Some(child)) => {
                    let silently = ctx
                        .co
                        .stack
                        .vdom
                        .element(child)
                        .is_some_and(|e| e.has_attr("silently"));
                    ctx.co.stack.push_frame_for(child, silently);
                    Ok(())
                }
                Ok(None) => {
                    ctx.frame()?.next_step = NextStep::OnPopping;
                    Ok(())
                }
                // The cursor advanced past the failing child; retrying
                // select_child lets catch siblings see the exception.
                Err(err) => Err(err),
            }
        }

        NextStep::OnPopping => {
            let outcome = match ops.on_popping {
                Some(f) => f(ctx),
                None => Ok(true),
            };
            match outcome {
                Ok(true) => {
                    ctx.co.stack.pop_frame();
                    Ok(())
                }
                Ok(false) => {
                    ctx.frame()?.next_step = NextStep::Rerun;
                    Ok(())
                }
                Err(err) => {
                    ctx.co.stack.pop_frame();
                    Err(err)
                }
            }
        }

        NextStep::Rerun => {
            let outcome = match ops.rerun {
                Some(f) => f(ctx),
                None => Ok(true),
            };
            ctx.frame()?.next_step = NextStep::SelectChild;
            outcome.map(|_| ())
        }
    }
}

/// First-round attach: create the plain window carrying the serialized
/// document.
fn attach_renderer(inst: &Rc<Instance>, co: &mut Coroutine) -> CoreResult<()> {
    let mut conn = inst.rdr_conn.borrow_mut();
    let Some(conn) = conn.as_mut() else {
        return Ok(());
    };
    let html = co.stack.doc.borrow().serialize();
    let page = conn.attach_page("main", &html)?;
    co.stack.rdr_page = Some(page);
    debug!(page, "attached to the renderer");
    Ok(())
}

/// Unlink a finished coroutine: dump an unclaimed exception, revoke
/// observers, cancel outstanding requests, tear down timers, and record
/// the result.
fn terminate(inst: &Rc<Instance>, cell: &Rc<RefCell<Coroutine>>) {
    let (id, result) = {
        let mut co = cell.borrow_mut();
        let id = co.id;

        if let Some(exc) = &co.stack.exception {
            error!(co = id.raw(), exception = %exc, "coroutine terminated with an unhandled exception");
        }

        // Cancel every outstanding async request id (snapshot first).
        if let Ok(ids) = co.stack.async_request_ids.container_clone() {
            for i in 0..ids.array_len() {
                if let Some(raw) = ids.array_get(i).and_then(|v| v.as_u64()) {
                    request::cancel_req(inst, ReqId(raw));
                }
            }
        }
        request::cancel_all_of(inst, id);

        free_observer_lists(&mut co);
        debug_assert_eq!(co.waits, 0);

        if let Some(timers) = co.stack.doc_timers.take() {
            timers.teardown(inst);
        }
        if let Some(event_timer) = co.stack.event_timer.take() {
            inst.runloop.timer_drop(event_timer);
        }
        co.stack.scoped.clear();
        co.stack.loaded_vars.clear();

        let result = CoResult {
            value: co.stack.co_result.clone(),
            exception: co.stack.exception.clone(),
            doc_html: Some(co.stack.doc.borrow().serialize()),
        };
        (id, result)
    };

    debug!(co = id.raw(), "coroutine terminated");
    inst.heap.unlink_coroutine(id, result);
}

/// The exception of the most recently terminated coroutine, if any.
#[must_use]
pub fn last_exception(inst: &Rc<Instance>) -> Option<Exception> {
    inst.heap.last_exception()
}
