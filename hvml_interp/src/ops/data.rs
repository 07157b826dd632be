//! Data-binding ops: `init`, `bind`, `archetype`.
//!
//! `init` evaluates a value and binds it to a name in scope; `bind`
//! binds the *expression* itself (an expression variant, optionally
//! constant); `archetype` stores a named template for later `update`
//! substitution.

use super::{advance_child, attr_of, eval_attr_vars, has_attr, ContentPolicy, ElementOps, StepCtx};
use crate::vcm;
use hvml_core::{CoreError, CoreResult, Variant};
use hvml_dom::vcm::Vcm;
use hvml_dom::{SymbolName, VNodeId, VPayload};

/// Ops for `<init>`.
pub const INIT_OPS: ElementOps = ElementOps {
    after_pushed: Some(init_after_pushed),
    select_child: Some(consume_content_children),
    on_popping: Some(init_on_popping),
    rerun: None,
};

/// Ops for `<bind>`.
pub const BIND_OPS: ElementOps = ElementOps {
    after_pushed: Some(bind_after_pushed),
    select_child: None,
    on_popping: None,
    rerun: None,
};

/// Ops for `<archetype>`.
pub const ARCHETYPE_OPS: ElementOps = ElementOps {
    after_pushed: Some(archetype_after_pushed),
    select_child: None,
    on_popping: None,
    rerun: None,
};

struct InitCtxt {
    cursor: usize,
}

/// Resolve where a binding lands: the parent frame's `!` bag
/// (`temporarily`), the document node (`at="_root"`), or the element's
/// parent vDOM node.
fn bind_value(ctx: &mut StepCtx, name: &str, value: Variant) -> CoreResult<()> {
    if has_attr(ctx, "temporarily") {
        let bag = ctx
            .co
            .stack
            .parent()
            .map(|p| p.get_symbol(SymbolName::Exclamation))
            .ok_or_else(|| CoreError::not_allowed("temporarily outside any frame"))?;
        return bag.object_set(name, value);
    }

    let pos = ctx.pos()?;
    let target = match attr_of(ctx, "at").map(|v| v.stringify()) {
        Some(at) if at == "_root" => ctx.co.stack.vdom.document_node(),
        _ => ctx
            .co
            .stack
            .vdom
            .parent(pos)
            .unwrap_or_else(|| ctx.co.stack.vdom.document_node()),
    };
    ctx.co.stack.scoped.bind(target, name, value);
    Ok(())
}

// =============================================================================
// init
// =============================================================================

fn init_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    ctx.frame()?.ctxt = Some(Box::new(InitCtxt { cursor: 0 }));
    Ok(true)
}

/// Drain content children (their value lands in `?`); element children
/// are not executed by value-producing tags.
fn consume_content_children(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    let mut cursor = ctx.ctxt_mut::<InitCtxt>()?.cursor;
    while advance_child(ctx, &mut cursor, ContentPolicy::Evaluate)?.is_some() {}
    ctx.ctxt_mut::<InitCtxt>()?.cursor = cursor;
    Ok(None)
}

fn init_on_popping(ctx: &mut StepCtx) -> CoreResult<bool> {
    let mut value = match attr_of(ctx, "with") {
        Some(v) => v,
        None => {
            let frame = ctx.frame()?;
            if frame.symbol_touched(SymbolName::Question) {
                frame.question()
            } else {
                Variant::undefined()
            }
        }
    };

    // `uniquely against <key>` turns the value into a keyed set.
    if has_attr(ctx, "uniquely") {
        let key_field = attr_of(ctx, "against").map(|v| v.stringify());
        let set = Variant::set_by_key(key_field.as_deref());
        match value.kind() {
            hvml_core::VariantKind::Array => {
                for i in 0..value.array_len() {
                    if let Some(elem) = value.array_get(i) {
                        set.set_add(elem)?;
                    }
                }
            }
            _ => {
                set.set_add(value.clone())?;
            }
        }
        value = set;
    }

    if let Some(name) = attr_of(ctx, "as").map(|v| v.stringify()) {
        bind_value(ctx, &name, value.clone())?;
    }
    ctx.frame()?.result = Some(value);
    Ok(true)
}

// =============================================================================
// bind / archetype
// =============================================================================

/// The first unevaluated expression attached to the current element:
/// the `on` attribute's tree, or the first content child's.
fn raw_expression(ctx: &mut StepCtx, attr: &str) -> Option<Vcm> {
    let element = ctx.element().ok()?;
    if let Some(a) = element.attr(attr) {
        if let Some(vcm) = &a.value {
            return Some(vcm.clone());
        }
    }
    let pos = ctx.pos().ok()?;
    let vdom = ctx.co.stack.vdom.clone();
    vdom.children(pos).iter().find_map(|&c| match vdom.payload(c) {
        VPayload::Content(vcm) => Some(vcm.clone()),
        _ => None,
    })
}

fn bind_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let Some(expr) = raw_expression(ctx, "on") else {
        return Err(CoreError::bad_arg("bind without an expression"));
    };
    let constantly = has_attr(ctx, "constantly");
    let value = vcm::make_expression_variant(expr, constantly);

    let Some(name) = attr_of(ctx, "as").map(|v| v.stringify()) else {
        return Err(CoreError::bad_arg("bind without a name"));
    };
    bind_value(ctx, &name, value.clone())?;
    ctx.frame()?.result = Some(value);
    Ok(false)
}

fn archetype_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let Some(template) = raw_expression(ctx, "with") else {
        return Err(CoreError::bad_arg("archetype without content"));
    };
    let Some(name) = attr_of(ctx, "name")
        .or_else(|| attr_of(ctx, "as"))
        .map(|v| v.stringify())
    else {
        return Err(CoreError::bad_arg("archetype without a name"));
    };
    let value = vcm::make_expression_variant(template, false);
    bind_value(ctx, &name, value)?;
    Ok(false)
}
