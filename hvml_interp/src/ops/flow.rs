//! Non-local flow ops: `catch`, `except`, `exit`, `back`, `inherit`.
//!
//! `catch` consumes a travelling exception when its `for` rule matches
//! the exception name; `exit` and `back` install a back anchor the
//! scheduler unwinds after the step; `inherit` is a grouping element
//! whose inline content is evaluated for effect.

use super::{advance_child, attr_of, eval_attr_vars, ContentPolicy, ElementOps, StepCtx};
use crate::stack::BackAnchor;
use hvml_core::{CoreError, CoreResult, Variant};
use hvml_dom::{SymbolName, VNodeId};
use tracing::debug;

/// Ops for `<catch>`.
pub const CATCH_OPS: ElementOps = ElementOps {
    after_pushed: Some(catch_after_pushed),
    select_child: Some(walk_children),
    on_popping: None,
    rerun: None,
};

/// Ops for `<except>`.
pub const EXCEPT_OPS: ElementOps = ElementOps {
    after_pushed: Some(except_after_pushed),
    select_child: Some(walk_children),
    on_popping: None,
    rerun: None,
};

/// Ops for `<exit>`.
pub const EXIT_OPS: ElementOps = ElementOps {
    after_pushed: Some(exit_after_pushed),
    select_child: None,
    on_popping: None,
    rerun: None,
};

/// Ops for `<back>`.
pub const BACK_OPS: ElementOps = ElementOps {
    after_pushed: Some(back_after_pushed),
    select_child: None,
    on_popping: None,
    rerun: None,
};

/// Ops for `<inherit>`.
pub const INHERIT_OPS: ElementOps = ElementOps {
    after_pushed: Some(inherit_after_pushed),
    select_child: Some(inherit_select_child),
    on_popping: None,
    rerun: None,
};

struct WalkCtxt {
    cursor: usize,
}

fn walk_children(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    let mut cursor = ctx.ctxt_mut::<WalkCtxt>()?.cursor;
    let child = advance_child(ctx, &mut cursor, ContentPolicy::AppendToDom)?;
    ctx.ctxt_mut::<WalkCtxt>()?.cursor = cursor;
    Ok(child)
}

// =============================================================================
// catch / except
// =============================================================================

/// Whether the `for` rule text names the travelling exception.
/// Names come backtick-quoted (`` `BadName` ``) or bare; `*` catches all.
fn for_rule_matches(rule: Option<String>, exception_name: &str) -> bool {
    let Some(rule) = rule else {
        return true;
    };
    rule.split([',', ' '])
        .map(|part| part.trim().trim_matches('`'))
        .filter(|part| !part.is_empty())
        .any(|part| part == "*" || part == exception_name)
}

fn catch_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;

    let Some(exception) = ctx.co.stack.exception.as_ref() else {
        return Ok(false);
    };
    let name = exception.atom.to_string();
    if !for_rule_matches(attr_of(ctx, "for").map(|v| v.stringify()), &name) {
        return Ok(false);
    }

    // Consume the exception; its payload becomes this frame's input.
    let exception = ctx.co.stack.exception.take().expect("checked above");
    debug!(exception = %name, "catch consumed an exception");
    let frame = ctx.frame()?;
    if let Some(info) = exception.info {
        frame.set_input(info);
    } else {
        frame.set_input(Variant::string(name));
    }
    frame.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    Ok(true)
}

fn except_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;

    let Some(exception) = ctx.co.stack.exception.as_ref() else {
        return Ok(false);
    };
    let name = exception.atom.to_string();
    let rule = attr_of(ctx, "type")
        .or_else(|| attr_of(ctx, "for"))
        .map(|v| v.stringify());
    if !for_rule_matches(rule, &name) {
        return Ok(false);
    }

    // Render the error template without consuming the exception.
    ctx.frame()?.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    Ok(true)
}

// =============================================================================
// exit / back
// =============================================================================

fn exit_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let value = attr_of(ctx, "with")
        .unwrap_or_else(|| ctx.co.stack.resolve_symbol(SymbolName::Question));
    debug!("exit requested");
    ctx.co.stack.back_anchor = Some(BackAnchor::Exit(value));
    Ok(false)
}

fn back_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let with = attr_of(ctx, "with");
    let to = attr_of(ctx, "to")
        .map(|v| v.stringify())
        .unwrap_or_else(|| "_parent".to_owned());

    let own_depth = ctx.co.stack.nr_frames().saturating_sub(1);
    let target = if let Some(id) = to.strip_prefix('#') {
        // Innermost enclosing frame whose element has the given id.
        let mut found = None;
        for depth in (0..own_depth).rev() {
            let matches = ctx.co.stack.frame_at(depth).is_some_and(|f| {
                f.attr_vars
                    .as_ref()
                    .and_then(|v| v.object_get("id"))
                    .is_some_and(|v| v.stringify() == id)
            });
            if matches {
                found = Some(depth);
                break;
            }
        }
        found.ok_or_else(|| CoreError::not_exists(format!("back target #{id}")))?
    } else {
        // `_parent`: the frame above the element containing this `back`.
        own_depth.saturating_sub(2)
    };

    ctx.co.stack.back_anchor = Some(BackAnchor::ToFrame {
        depth: target,
        with,
    });
    Ok(false)
}

// =============================================================================
// inherit
// =============================================================================

fn inherit_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    ctx.frame()?.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    Ok(true)
}

/// Inline content is evaluated for effect; the result lands in `?`.
fn inherit_select_child(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    let mut cursor = ctx.ctxt_mut::<WalkCtxt>()?.cursor;
    let child = advance_child(ctx, &mut cursor, ContentPolicy::Evaluate)?;
    ctx.ctxt_mut::<WalkCtxt>()?.cursor = cursor;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_rule_matching() {
        assert!(for_rule_matches(None, "BadName"));
        assert!(for_rule_matches(Some("`BadName`".into()), "BadName"));
        assert!(for_rule_matches(Some("BadName".into()), "BadName"));
        assert!(for_rule_matches(Some("*".into()), "Whatever"));
        assert!(for_rule_matches(
            Some("`NoSuchKey`, `BadName`".into()),
            "BadName"
        ));
        assert!(!for_rule_matches(Some("`NoSuchKey`".into()), "BadName"));
    }
}
