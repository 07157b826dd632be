//! Invocation and mutation ops: `define`, `call`, `include`, `update`,
//! `load`.
//!
//! `define` stores a named operation group (its vDOM subtree);
//! `include`/`call` run the group's children in a frame of their own.
//! `update` routes DOM targets through the output-DOM helpers (which
//! mirror to the renderer) and container targets through the variant
//! mutators (which fire listeners). `load` schedules a nested coroutine
//! over a wrapped vDOM.

use super::{attr_of, eval_attr_vars, ElementOps, StepCtx};
use crate::domutil::{self, elements_of};
use crate::vcm;
use hvml_core::{CoreError, CoreResult, NativeEntity, Variant, VariantKind};
use hvml_dom::{Tag, VNodeId, VPayload, VdomDocument};
use std::rc::Rc;
use tracing::debug;

/// Ops for `<define>`.
pub const DEFINE_OPS: ElementOps = ElementOps {
    after_pushed: Some(define_after_pushed),
    select_child: None,
    on_popping: None,
    rerun: None,
};

/// Ops for `<call>`.
pub const CALL_OPS: ElementOps = ElementOps {
    after_pushed: Some(group_after_pushed),
    select_child: Some(group_select_child),
    on_popping: None,
    rerun: None,
};

/// Ops for `<include>`.
pub const INCLUDE_OPS: ElementOps = ElementOps {
    after_pushed: Some(group_after_pushed),
    select_child: Some(group_select_child),
    on_popping: None,
    rerun: None,
};

/// Ops for `<update>`.
pub const UPDATE_OPS: ElementOps = ElementOps {
    after_pushed: Some(update_after_pushed),
    select_child: None,
    on_popping: None,
    rerun: None,
};

/// Ops for `<load>`.
pub const LOAD_OPS: ElementOps = ElementOps {
    after_pushed: Some(load_after_pushed),
    select_child: None,
    on_popping: None,
    rerun: None,
};

// =============================================================================
// Operation Groups
// =============================================================================

/// Native wrapper around a vDOM element: a defined operation group.
pub struct GroupEntity {
    /// The `define` element whose children are the group body.
    pub node: VNodeId,
}

impl NativeEntity for GroupEntity {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn entity_name(&self) -> &'static str {
        "group"
    }
}

/// Native wrapper around a whole vDOM document, consumed by `load`.
pub struct VdomEntity {
    /// The wrapped document.
    pub vdom: Rc<VdomDocument>,
}

impl NativeEntity for VdomEntity {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn entity_name(&self) -> &'static str {
        "vdom"
    }
}

/// Wrap a parsed document for `load`.
#[must_use]
pub fn wrap_vdom(vdom: Rc<VdomDocument>) -> Variant {
    Variant::native(Rc::new(VdomEntity { vdom }))
}

fn define_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let name = attr_of(ctx, "as")
        .map(|v| v.stringify())
        .ok_or_else(|| CoreError::bad_arg("define without a name"))?;
    let pos = ctx.pos()?;
    let group = Variant::native(Rc::new(GroupEntity { node: pos }));

    let target = ctx
        .co
        .stack
        .vdom
        .parent(pos)
        .unwrap_or_else(|| ctx.co.stack.vdom.document_node());
    ctx.co.stack.scoped.bind(target, &name, group);
    debug!(group = %name, "operation group defined");
    Ok(false)
}

struct GroupCtxt {
    group: VNodeId,
    cursor: usize,
}

fn group_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let on = attr_of(ctx, "on")
        .ok_or_else(|| CoreError::bad_arg("call without a group"))?;

    // Accept a group value directly, or a name resolving to one.
    let group_node = match on.as_native() {
        Some(entity) => entity.as_any().downcast_ref::<GroupEntity>().map(|g| g.node),
        None => {
            let name = on.stringify();
            ctx.co
                .stack
                .resolve_named(&name)
                .and_then(|v| v.as_native())
                .and_then(|e| e.as_any().downcast_ref::<GroupEntity>().map(|g| g.node))
        }
    };
    let Some(group) = group_node else {
        return Err(CoreError::not_exists("operation group"));
    };

    let is_call = ctx.element()?.tag == Tag::Call;
    if let Some(with) = attr_of(ctx, "with") {
        ctx.frame()?.set_input(with);
    }
    let frame = ctx.frame()?;
    if is_call {
        // A call runs with the group's own scope, isolating binds made
        // inside from the caller's chain.
        frame.scope = Some(group);
    }
    frame.ctxt = Some(Box::new(GroupCtxt { group, cursor: 0 }));
    Ok(true)
}

/// Walk the *group's* children instead of our own.
fn group_select_child(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    loop {
        let (group, cursor) = {
            let c = ctx.ctxt_mut::<GroupCtxt>()?;
            (c.group, c.cursor)
        };
        let vdom = ctx.co.stack.vdom.clone();
        let Some(&child) = vdom.children(group).get(cursor) else {
            return Ok(None);
        };
        ctx.ctxt_mut::<GroupCtxt>()?.cursor = cursor + 1;

        match vdom.payload(child) {
            VPayload::Comment(_) | VPayload::Document => {}
            VPayload::Content(vcm_tree) => {
                let silently = ctx.co.stack.top().is_some_and(|f| f.silently);
                let value = vcm::eval(vcm_tree, &ctx.co.stack, silently)?;
                ctx.frame()?.set_question(value);
            }
            VPayload::Element(element) => {
                if ctx.co.stack.exception.is_some()
                    && !matches!(element.tag, Tag::Catch | Tag::Except)
                {
                    continue;
                }
                return Ok(Some(child));
            }
        }
    }
}

// =============================================================================
// update
// =============================================================================

fn update_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let target = attr_of(ctx, "on")
        .ok_or_else(|| CoreError::bad_arg("update without a target"))?;
    let verb = attr_of(ctx, "to")
        .map(|v| v.stringify())
        .unwrap_or_else(|| "displace".to_owned());
    let at = attr_of(ctx, "at").map(|v| v.stringify());
    let with = attr_of(ctx, "with")
        .ok_or_else(|| CoreError::bad_arg("update without a value"))?;

    // An expression value (archetype/bind) substitutes at use.
    let with = match vcm::with_expr_var(&with, |e| e.evaluate(&ctx.co.stack, false)) {
        Some(evaluated) => evaluated?,
        None => with,
    };

    if let Some(nodes) = elements_of(&target) {
        update_dom(ctx, &nodes, &verb, at.as_deref(), &with)?;
    } else {
        update_container(&target, &verb, at.as_deref(), &with)?;
    }

    ctx.frame()?.result = Some(with);
    Ok(false)
}

fn update_dom(
    ctx: &mut StepCtx,
    nodes: &[hvml_dom::ENodeId],
    verb: &str,
    at: Option<&str>,
    with: &Variant,
) -> CoreResult<()> {
    let text = with.stringify();
    for &node in nodes {
        match at {
            None | Some("textContent") => match verb {
                "append" => {
                    domutil::append_content(&mut ctx.co.stack, ctx.inst, node, &text)?;
                }
                "displace" => {
                    domutil::displace_content(&mut ctx.co.stack, ctx.inst, node, &text)?;
                }
                other => {
                    return Err(CoreError::not_implemented(format!(
                        "update to '{other}' on textContent"
                    )));
                }
            },
            Some("content") => match verb {
                "append" => {
                    domutil::add_child_chunk(&mut ctx.co.stack, ctx.inst, node, &text)?;
                }
                "displace" => {
                    domutil::set_child_chunk(&mut ctx.co.stack, ctx.inst, node, &text)?;
                }
                other => {
                    return Err(CoreError::not_implemented(format!(
                        "update to '{other}' on content"
                    )));
                }
            },
            Some(attr_name) => {
                let attr_name = attr_name.strip_prefix("attr.").unwrap_or(attr_name);
                domutil::set_attribute(&mut ctx.co.stack, ctx.inst, node, attr_name, &text)?;
            }
        }
    }
    Ok(())
}

fn update_container(
    target: &Variant,
    verb: &str,
    at: Option<&str>,
    with: &Variant,
) -> CoreResult<()> {
    match target.kind() {
        VariantKind::Object => match (verb, at) {
            ("merge", None) => {
                for (k, v) in with.object_entries() {
                    target.object_set(&k, v)?;
                }
                Ok(())
            }
            (_, Some(key)) => target.object_set(key, with.clone()),
            ("displace", None) => {
                for k in target.object_keys() {
                    target.object_remove(&k)?;
                }
                for (k, v) in with.object_entries() {
                    target.object_set(&k, v)?;
                }
                Ok(())
            }
            (other, None) => Err(CoreError::not_implemented(format!(
                "update to '{other}' on an object"
            ))),
        },
        VariantKind::Array => match verb {
            "append" => target.array_append(with.clone()),
            "prepend" => target.array_insert(0, with.clone()),
            "displace" => {
                while target.array_len() > 0 {
                    target.array_remove(0)?;
                }
                target.array_append(with.clone())
            }
            other => Err(CoreError::not_implemented(format!(
                "update to '{other}' on an array"
            ))),
        },
        VariantKind::Set => match verb {
            "append" | "merge" | "displace" => {
                target.set_add(with.clone())?;
                Ok(())
            }
            other => Err(CoreError::not_implemented(format!(
                "update to '{other}' on a set"
            ))),
        },
        other => Err(CoreError::invalid_value(format!(
            "update cannot target a {other}"
        ))),
    }
}

// =============================================================================
// load
// =============================================================================

fn load_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let from = attr_of(ctx, "from")
        .or_else(|| attr_of(ctx, "on"))
        .ok_or_else(|| CoreError::bad_arg("load without a document"))?;

    let vdom = from
        .as_native()
        .and_then(|e| {
            e.as_any()
                .downcast_ref::<VdomEntity>()
                .map(|w| Rc::clone(&w.vdom))
        })
        .ok_or_else(|| CoreError::not_implemented("load from a remote URI"))?;

    let child_id = ctx.inst.schedule_vdom(vdom);
    debug!(child = child_id.raw(), "nested coroutine loaded");
    ctx.frame()?.result = Some(Variant::ulongint(child_id.raw()));
    Ok(false)
}
