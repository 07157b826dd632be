//! Observation ops: `observe` and `forget`.
//!
//! During the first round, `observe` registers an observer and executes
//! no children; its subtree is the handler body, run in the transient
//! frame the message path pushes. During the event loop the same element
//! is re-entered as that handler, so it walks its children normally.

use super::{advance_child, attr_of, eval_attr_vars, ContentPolicy, ElementOps, StepCtx};
use crate::observer::{register_observer, revoke_observer_matching};
use crate::stack::StackStage;
use crate::timer::ensure_event_timer;
use crate::vcm;
use hvml_core::atom::{intern_in, Bucket};
use hvml_core::{CoreError, CoreResult};
use hvml_dom::VNodeId;
use tracing::debug;

/// Ops for `<observe>`.
pub const OBSERVE_OPS: ElementOps = ElementOps {
    after_pushed: Some(observe_after_pushed),
    select_child: Some(observe_select_child),
    on_popping: None,
    rerun: None,
};

/// Ops for `<forget>`.
pub const FORGET_OPS: ElementOps = ElementOps {
    after_pushed: Some(forget_after_pushed),
    select_child: None,
    on_popping: None,
    rerun: None,
};

struct ObserveCtxt {
    cursor: usize,
    handler_mode: bool,
}

/// Split a `for` value into `(event, sub)`: `"expired:t"` observes the
/// `expired` event with sub-type `t`.
fn split_for(text: &str) -> (String, Option<String>) {
    match text.split_once(':') {
        Some((event, sub)) => (event.to_owned(), Some(sub.to_owned())),
        None => (text.to_owned(), None),
    }
}

fn observe_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;

    if ctx.co.stack.stage == StackStage::EventLoop {
        // Re-entered as a message handler: run the body.
        ctx.frame()?.ctxt = Some(Box::new(ObserveCtxt {
            cursor: 0,
            handler_mode: true,
        }));
        return Ok(true);
    }

    let observed = attr_of(ctx, "on")
        .ok_or_else(|| CoreError::bad_arg("observe without a source"))?;
    let for_text = attr_of(ctx, "for")
        .map(|v| v.stringify())
        .ok_or_else(|| CoreError::bad_arg("observe without an event"))?;
    let (event_name, sub) = split_for(&for_text);
    let event = intern_in(Bucket::Event, &event_name);

    let pos = ctx.pos()?;
    let scope = ctx.co.stack.top().and_then(|f| f.scope);
    let edom = ctx.co.stack.top().and_then(|f| f.edom_element);

    // Expression sources are re-evaluated on the shared tick.
    if vcm::with_expr_var(&observed, |_| ()).is_some() {
        ensure_event_timer(ctx.inst, ctx.co);
    }

    let id = register_observer(ctx.co, observed, event, sub, scope, edom, pos);
    debug!(observer = id, event = %event_name, "observe registered");
    Ok(false)
}

fn observe_select_child(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    let (mut cursor, handler) = {
        let c = ctx.ctxt_mut::<ObserveCtxt>()?;
        (c.cursor, c.handler_mode)
    };
    if !handler {
        return Ok(None);
    }
    let child = advance_child(ctx, &mut cursor, ContentPolicy::AppendToDom)?;
    ctx.ctxt_mut::<ObserveCtxt>()?.cursor = cursor;
    Ok(child)
}

fn forget_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let observed = attr_of(ctx, "on")
        .ok_or_else(|| CoreError::bad_arg("forget without a source"))?;
    let (event_name, sub) = match attr_of(ctx, "for").map(|v| v.stringify()) {
        Some(text) => split_for(&text),
        None => (String::new(), None),
    };
    let event = intern_in(Bucket::Event, &event_name);
    let revoked = revoke_observer_matching(ctx.co, &observed, event, sub.as_deref());
    debug!(revoked, event = %event_name, "forget");
    Ok(false)
}
