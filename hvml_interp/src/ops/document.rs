//! Document-structure ops: `hvml`, `head`, `body`, and foreign elements.
//!
//! These tags position the output-DOM insertion point and drive the
//! insertion mode; foreign elements materialize themselves in the output
//! tree and mirror their attributes to the renderer.

use super::{advance_child, eval_attr_vars, ContentPolicy, ElementOps, StepCtx};
use crate::domutil;
use crate::stack::StackMode;
use hvml_core::{CoreError, CoreResult};
use hvml_dom::{Tag, VNodeId};

/// Ops for `<hvml>`.
pub const HVML_OPS: ElementOps = ElementOps {
    after_pushed: Some(hvml_after_pushed),
    select_child: Some(hvml_select_child),
    on_popping: Some(hvml_on_popping),
    rerun: None,
};

/// Ops for `<head>`.
pub const HEAD_OPS: ElementOps = ElementOps {
    after_pushed: Some(head_after_pushed),
    select_child: Some(section_select_child),
    on_popping: Some(head_on_popping),
    rerun: None,
};

/// Ops for `<body>`.
pub const BODY_OPS: ElementOps = ElementOps {
    after_pushed: Some(body_after_pushed),
    select_child: Some(section_select_child),
    on_popping: Some(body_on_popping),
    rerun: None,
};

/// Ops for foreign (output) elements.
pub const FOREIGN_OPS: ElementOps = ElementOps {
    after_pushed: Some(foreign_after_pushed),
    select_child: Some(section_select_child),
    on_popping: None,
    rerun: None,
};

struct WalkCtxt {
    cursor: usize,
}

// =============================================================================
// hvml
// =============================================================================

fn hvml_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let html = ctx.stack().doc.borrow().html();
    ctx.stack().mode = StackMode::InHvml;
    let frame = ctx.frame()?;
    frame.edom_element = Some(html);
    frame.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    ctx.stack().refresh_at();
    Ok(true)
}

fn hvml_select_child(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    let mut cursor = ctx.ctxt_mut::<WalkCtxt>()?.cursor;
    let child = advance_child(ctx, &mut cursor, ContentPolicy::Skip)?;
    ctx.ctxt_mut::<WalkCtxt>()?.cursor = cursor;

    if let Some(id) = child {
        match ctx.co.stack.vdom.element(id).map(|e| e.tag) {
            Some(Tag::Head) => ctx.stack().mode = StackMode::InHead,
            Some(Tag::Body) => ctx.stack().mode = StackMode::InBody,
            _ => {}
        }
    }
    Ok(child)
}

fn hvml_on_popping(ctx: &mut StepCtx) -> CoreResult<bool> {
    ctx.stack().mode = StackMode::AfterHvml;
    Ok(true)
}

// =============================================================================
// head / body
// =============================================================================

fn head_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let head = ctx.stack().doc.borrow().head();
    ctx.stack().mode = StackMode::InHead;
    let frame = ctx.frame()?;
    frame.edom_element = Some(head);
    frame.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    ctx.stack().refresh_at();
    Ok(true)
}

fn head_on_popping(ctx: &mut StepCtx) -> CoreResult<bool> {
    ctx.stack().mode = StackMode::AfterHead;
    Ok(true)
}

fn body_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let body = ctx.stack().doc.borrow().body();
    ctx.stack().mode = StackMode::InBody;
    let frame = ctx.frame()?;
    frame.edom_element = Some(body);
    frame.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    ctx.stack().refresh_at();
    Ok(true)
}

fn body_on_popping(ctx: &mut StepCtx) -> CoreResult<bool> {
    ctx.stack().mode = StackMode::AfterBody;
    Ok(true)
}

/// Shared child walk for the sectioning tags and foreign elements:
/// content nodes become output text under the current insertion point.
fn section_select_child(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    let mut cursor = ctx.ctxt_mut::<WalkCtxt>()?.cursor;
    let child = advance_child(ctx, &mut cursor, ContentPolicy::AppendToDom)?;
    ctx.ctxt_mut::<WalkCtxt>()?.cursor = cursor;
    Ok(child)
}

// =============================================================================
// Foreign Elements
// =============================================================================

fn foreign_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    match ctx.stack().mode {
        StackMode::InHead | StackMode::InBody => {}
        mode => {
            return Err(CoreError::wrong_stage(format!(
                "output element in insertion mode {mode:?}"
            )));
        }
    }

    eval_attr_vars(ctx)?;
    let element = ctx.element()?;
    let parent = ctx
        .co
        .stack
        .top()
        .and_then(|f| f.edom_element)
        .ok_or_else(|| CoreError::wrong_stage("output element without an insertion point"))?;

    let created = domutil::append_element(&mut ctx.co.stack, ctx.inst, parent, &element.name)?;

    // Attributes are applied one by one against the value already in
    // place, so a repeated name combines through its operator.
    let silently = ctx.co.stack.top().is_some_and(|f| f.silently);
    for attr in &element.attrs {
        let value = match &attr.value {
            Some(vcm_tree) => crate::vcm::eval(vcm_tree, &ctx.co.stack, silently)?,
            None => hvml_core::Variant::boolean(true),
        };
        let existing = ctx
            .co
            .stack
            .doc
            .borrow()
            .attribute(created, &attr.name)
            .map(hvml_core::Variant::string);
        let combined = hvml_dom::attr::apply(attr.op, existing.as_ref(), &value)?;
        let text = combined.stringify();
        domutil::set_attribute(&mut ctx.co.stack, ctx.inst, created, &attr.name, &text)?;
    }

    let frame = ctx.frame()?;
    frame.edom_element = Some(created);
    frame.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    ctx.stack().refresh_at();
    Ok(true)
}
