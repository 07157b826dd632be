//! Control-flow ops: `iterate`, `choose`, `reduce`, `sort`, and the
//! `test`/`match`/`differ` family.
//!
//! `iterate` re-runs its subtree once per input value, incrementing the
//! `%` counter between rounds; an executor (`by` rule) drives the value
//! sequence when present. `test` evaluates a value its `match` children
//! compare against; `differ` runs when no arm matched.

use super::{advance_child, attr_of, eval_attr_vars, has_attr, ContentPolicy, ElementOps, StepCtx};
use crate::vcm;
use hvml_core::{CoreError, CoreResult, Variant, VariantKind};
use hvml_dom::{SymbolName, VNodeId};
use hvml_exec::{create_executor, parse_match, Executor};
use tracing::trace;

/// Ops for `<iterate>`.
pub const ITERATE_OPS: ElementOps = ElementOps {
    after_pushed: Some(iterate_after_pushed),
    select_child: Some(iterate_select_child),
    on_popping: Some(iterate_on_popping),
    rerun: Some(iterate_rerun),
};

/// Ops for `<choose>`.
pub const CHOOSE_OPS: ElementOps = ElementOps {
    after_pushed: Some(choose_after_pushed),
    select_child: Some(walk_children),
    on_popping: None,
    rerun: None,
};

/// Ops for `<reduce>`.
pub const REDUCE_OPS: ElementOps = ElementOps {
    after_pushed: Some(reduce_after_pushed),
    select_child: Some(walk_children),
    on_popping: None,
    rerun: None,
};

/// Ops for `<sort>`.
pub const SORT_OPS: ElementOps = ElementOps {
    after_pushed: Some(sort_after_pushed),
    select_child: None,
    on_popping: None,
    rerun: None,
};

/// Ops for `<test>`.
pub const TEST_OPS: ElementOps = ElementOps {
    after_pushed: Some(test_after_pushed),
    select_child: Some(test_select_child),
    on_popping: None,
    rerun: None,
};

/// Ops for `<match>`.
pub const MATCH_OPS: ElementOps = ElementOps {
    after_pushed: Some(match_after_pushed),
    select_child: Some(walk_children),
    on_popping: None,
    rerun: None,
};

/// Ops for `<differ>`.
pub const DIFFER_OPS: ElementOps = ElementOps {
    after_pushed: Some(differ_after_pushed),
    select_child: Some(walk_children),
    on_popping: None,
    rerun: None,
};

struct WalkCtxt {
    cursor: usize,
}

/// Plain child walk with output content.
fn walk_children(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    let mut cursor = ctx.ctxt_mut::<WalkCtxt>()?.cursor;
    let child = advance_child(ctx, &mut cursor, ContentPolicy::AppendToDom)?;
    ctx.ctxt_mut::<WalkCtxt>()?.cursor = cursor;
    Ok(child)
}

/// Snapshot a container's members for iteration: array/set elements, or
/// `{key, value}` objects for an object input.
fn members_of(input: &Variant) -> Vec<Variant> {
    match input.kind() {
        VariantKind::Array => (0..input.array_len())
            .filter_map(|i| input.array_get(i))
            .collect(),
        VariantKind::Set => (0..input.set_len())
            .filter_map(|i| input.set_get(i))
            .collect(),
        VariantKind::Object => input
            .object_entries()
            .into_iter()
            .map(|(k, v)| {
                Variant::object_with([("key", Variant::string(k)), ("value", v)])
            })
            .collect(),
        _ => vec![input.clone()],
    }
}

// =============================================================================
// iterate
// =============================================================================

enum IterSource {
    /// A numeric input `n`: rounds `0..n`, each delivering the index.
    Counter { n: u64, i: u64 },
    /// Container members, in order.
    Items { items: Vec<Variant>, i: usize },
    /// Executor-driven (`by` rule).
    Executor {
        exec: Box<dyn Executor>,
        rule: String,
    },
}

struct IterateCtxt {
    cursor: usize,
    source: IterSource,
    pending: Option<Variant>,
    nosetotail: bool,
    rounds: u64,
    /// False when the input was empty; on_popping then pops untouched.
    started: bool,
}

fn max_iterations(ctx: &mut StepCtx) -> u64 {
    // $HVML.maxIterationCount, when reachable.
    let Some(hvml) = ctx.co.stack.resolve_named("HVML") else {
        return u64::MAX;
    };
    vcm::member_of(&hvml, "maxIterationCount")
        .ok()
        .and_then(|m| vcm::invoke(&m, &[]).ok())
        .and_then(|v| v.as_u64())
        .unwrap_or(u64::MAX)
}

fn iterate_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let input = match attr_of(ctx, "on") {
        Some(v) => v,
        None => ctx.co.stack.resolve_symbol(SymbolName::Question),
    };
    let nosetotail = has_attr(ctx, "nosetotail");

    let (mut source, first) = match attr_of(ctx, "by").map(|v| v.stringify()) {
        Some(rule) => {
            let head = rule.split(':').next().unwrap_or("").trim().to_owned();
            let mut exec = create_executor(&head, input)?;
            let first = exec.it_begin(&rule)?;
            (IterSource::Executor { exec, rule }, first)
        }
        None => match input.as_u64() {
            Some(n) => {
                let first = (n > 0).then(|| Variant::ulongint(0));
                (IterSource::Counter { n, i: 0 }, first)
            }
            None => {
                let items = members_of(&input);
                let first = items.first().cloned();
                (IterSource::Items { items, i: 0 }, first)
            }
        },
    };

    // `onlyif` gates the first round.
    if let Some(cond) = attr_of(ctx, "onlyif") {
        if !cond.truthy() {
            return Ok(false);
        }
    }

    if let IterSource::Counter { i, .. } = &mut source {
        *i = 0;
    }

    let started = first.is_some();
    let frame = ctx.frame()?;
    frame.set_symbol(SymbolName::Percent, Variant::ulongint(0));
    if let Some(first) = first {
        frame.set_input(first);
    }
    frame.ctxt = Some(Box::new(IterateCtxt {
        cursor: 0,
        source,
        pending: None,
        nosetotail,
        rounds: 0,
        started,
    }));
    Ok(started)
}

fn iterate_select_child(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    let mut cursor = ctx.ctxt_mut::<IterateCtxt>()?.cursor;
    let child = advance_child(ctx, &mut cursor, ContentPolicy::AppendToDom)?;
    ctx.ctxt_mut::<IterateCtxt>()?.cursor = cursor;
    Ok(child)
}

fn iterate_on_popping(ctx: &mut StepCtx) -> CoreResult<bool> {
    if !ctx.ctxt_mut::<IterateCtxt>()?.started {
        return Ok(true);
    }

    // A round just finished.
    ctx.frame()?.inc_percent();

    let cap = max_iterations(ctx);
    {
        let ctxt = ctx.ctxt_mut::<IterateCtxt>()?;
        ctxt.rounds += 1;
        if ctxt.rounds >= cap {
            return Err(CoreError::not_allowed("max iteration count exceeded"));
        }
    }

    // `while` gates continuation, re-evaluated each round.
    if let Ok(element) = ctx.element() {
        if let Some(attr) = element.attr("while") {
            if let Some(vcm_tree) = &attr.value {
                let silently = ctx.co.stack.top().is_some_and(|f| f.silently);
                let cond = vcm::eval(vcm_tree, &ctx.co.stack, silently)?;
                if !cond.truthy() {
                    return Ok(true);
                }
            }
        }
    }

    let next = {
        let ctxt = ctx.ctxt_mut::<IterateCtxt>()?;
        match &mut ctxt.source {
            IterSource::Counter { n, i } => {
                *i += 1;
                (*i < *n).then(|| Variant::ulongint(*i))
            }
            IterSource::Items { items, i } => {
                *i += 1;
                items.get(*i).cloned()
            }
            IterSource::Executor { exec, .. } => exec.it_next(None)?,
        }
    };

    match next {
        Some(value) => {
            trace!("iterate advances");
            ctx.ctxt_mut::<IterateCtxt>()?.pending = Some(value);
            Ok(false)
        }
        None => Ok(true),
    }
}

fn iterate_rerun(ctx: &mut StepCtx) -> CoreResult<bool> {
    let (pending, nosetotail) = {
        let ctxt = ctx.ctxt_mut::<IterateCtxt>()?;
        ctxt.cursor = 0;
        (ctxt.pending.take(), ctxt.nosetotail)
    };
    let input = if nosetotail {
        // Forward the previous round's result into the next round.
        ctx.co.stack.resolve_symbol(SymbolName::Question)
    } else {
        pending.ok_or_else(|| CoreError::not_allowed("rerun without a pending value"))?
    };
    ctx.frame()?.set_input(input);
    Ok(true)
}

// =============================================================================
// choose / reduce / sort
// =============================================================================

fn executor_rule(ctx: &mut StepCtx) -> Option<String> {
    attr_of(ctx, "by").map(|v| v.stringify())
}

fn choose_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let input = attr_of(ctx, "on")
        .ok_or_else(|| CoreError::bad_arg("choose without an input"))?;
    let chosen = match executor_rule(ctx) {
        Some(rule) => {
            let head = rule.split(':').next().unwrap_or("").trim().to_owned();
            let mut exec = create_executor(&head, input)?;
            exec.choose(&rule)?
        }
        None => input,
    };
    let frame = ctx.frame()?;
    frame.set_question(chosen.clone());
    frame.set_input(chosen);
    frame.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    Ok(true)
}

fn reduce_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let input = attr_of(ctx, "on")
        .ok_or_else(|| CoreError::bad_arg("reduce without an input"))?;
    let rule = executor_rule(ctx)
        .ok_or_else(|| CoreError::bad_arg("reduce without a rule"))?;
    let head = rule.split(':').next().unwrap_or("").trim().to_owned();
    let mut exec = create_executor(&head, input)?;
    let reduced = exec.reduce(&rule)?;
    let frame = ctx.frame()?;
    frame.set_question(reduced.clone());
    frame.set_input(reduced);
    frame.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    Ok(true)
}

fn sort_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let input = attr_of(ctx, "on")
        .ok_or_else(|| CoreError::bad_arg("sort without an input"))?;
    let against = attr_of(ctx, "against").map(|v| v.stringify());
    let descending = has_attr(ctx, "descendingly");

    let mut items = members_of(&input);
    items.sort_by(|a, b| {
        let (ka, kb) = match &against {
            Some(key) => (
                a.object_get(key).unwrap_or_else(Variant::undefined),
                b.object_get(key).unwrap_or_else(Variant::undefined),
            ),
            None => (a.clone(), b.clone()),
        };
        let ord = ka.compare_auto(&kb);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });

    let sorted = Variant::array_with(items);
    ctx.frame()?.result = Some(sorted);
    Ok(false)
}

// =============================================================================
// test / match / differ
// =============================================================================

struct TestCtxt {
    cursor: usize,
    matched_any: bool,
    exclusively_hit: bool,
}

fn test_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    let value = attr_of(ctx, "on")
        .ok_or_else(|| CoreError::bad_arg("test without an input"))?;
    let frame = ctx.frame()?;
    frame.set_question(value);
    frame.ctxt = Some(Box::new(TestCtxt {
        cursor: 0,
        matched_any: false,
        exclusively_hit: false,
    }));
    Ok(true)
}

fn test_select_child(ctx: &mut StepCtx) -> CoreResult<Option<VNodeId>> {
    let mut cursor = ctx.ctxt_mut::<TestCtxt>()?.cursor;
    let child = advance_child(ctx, &mut cursor, ContentPolicy::Skip)?;
    ctx.ctxt_mut::<TestCtxt>()?.cursor = cursor;
    Ok(child)
}

/// The nearest enclosing `test` frame's context, read via the parent
/// frame of the current `match`/`differ`.
fn with_parent_test<R>(
    ctx: &mut StepCtx,
    f: impl FnOnce(&mut TestCtxt) -> R,
) -> CoreResult<R> {
    let parent = ctx
        .co
        .stack
        .parent_mut()
        .ok_or_else(|| CoreError::not_allowed("match outside a test"))?;
    let ctxt = parent
        .ctxt
        .as_mut()
        .and_then(|c| c.downcast_mut::<TestCtxt>())
        .ok_or_else(|| CoreError::not_allowed("match outside a test"))?;
    Ok(f(ctxt))
}

fn match_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;

    if with_parent_test(ctx, |t| t.exclusively_hit)? {
        return Ok(false);
    }

    // The tested value is the parent's `?`, visible through the walk.
    let value = ctx.co.stack.resolve_symbol(SymbolName::Question);
    let matched = match attr_of(ctx, "for").map(|v| v.stringify()) {
        None => true,
        Some(text) => {
            let rule_text = if text.trim_start().starts_with("MATCH") {
                text
            } else {
                format!("MATCH: {text}")
            };
            parse_match(&rule_text)?.matches(&value)
        }
    };

    if !matched {
        return Ok(false);
    }

    let exclusively = has_attr(ctx, "exclusively") || has_attr(ctx, "excl");
    with_parent_test(ctx, |t| {
        t.matched_any = true;
        if exclusively {
            t.exclusively_hit = true;
        }
    })?;

    let frame = ctx.frame()?;
    frame.set_input(value);
    frame.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    Ok(true)
}

fn differ_after_pushed(ctx: &mut StepCtx) -> CoreResult<bool> {
    eval_attr_vars(ctx)?;
    if with_parent_test(ctx, |t| t.matched_any)? {
        return Ok(false);
    }
    ctx.frame()?.ctxt = Some(Box::new(WalkCtxt { cursor: 0 }));
    Ok(true)
}
