//! VCM evaluation: expression trees against the current stack.
//!
//! `eval(tree, stack, silently)` is the single entry point the tags use
//! for attribute values and inline content. Evaluation is pure except for
//! `raise(...)`, which surfaces as an HVML exception through the error
//! path, and dynamic-member invocation.
//!
//! Also home of the expression variable: the native entity a `bind` tag
//! produces, carrying the unevaluated tree, an optional constant cache,
//! and the last-value slot the expression-observer tick compares against.

use crate::stack::Stack;
use hvml_core::atom::excepts;
use hvml_core::{CoreError, CoreResult, NativeEntity, Variant};
use hvml_dom::vcm::{Vcm, VcmNode};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::warn;

/// Evaluate `tree` against `stack`. With `silently`, errors are demoted
/// to warnings and the result is undefined.
pub fn eval(tree: &Vcm, stack: &Stack, silently: bool) -> CoreResult<Variant> {
    match eval_inner(tree, stack) {
        Ok(v) => Ok(v),
        Err(err) if silently => {
            warn!(%err, "silent frame demoted an evaluation error");
            Ok(Variant::undefined())
        }
        Err(err) => Err(err),
    }
}

fn eval_inner(tree: &Vcm, stack: &Stack) -> CoreResult<Variant> {
    match &**tree {
        VcmNode::Undefined => Ok(Variant::undefined()),
        VcmNode::Null => Ok(Variant::null()),
        VcmNode::Boolean(b) => Ok(Variant::boolean(*b)),
        VcmNode::Number(n) => Ok(Variant::number(*n)),
        VcmNode::LongInt(n) => Ok(Variant::longint(*n)),
        VcmNode::ULongInt(n) => Ok(Variant::ulongint(*n)),
        VcmNode::Text(s) => Ok(Variant::string(s.as_str())),

        VcmNode::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&eval_inner(part, stack)?.stringify());
            }
            Ok(Variant::string(out))
        }

        VcmNode::MakeArray(items) => {
            let arr = Variant::array();
            for item in items {
                arr.array_append(eval_inner(item, stack)?)?;
            }
            Ok(arr)
        }

        VcmNode::MakeObject(pairs) => {
            let obj = Variant::object();
            for (k, v) in pairs {
                obj.object_set(k, eval_inner(v, stack)?)?;
            }
            Ok(obj)
        }

        VcmNode::SymbolVar(sym) => Ok(stack.resolve_symbol(*sym)),

        VcmNode::NamedVar(name) => stack
            .resolve_named(name)
            .ok_or_else(|| CoreError::not_exists(name.clone())),

        VcmNode::Member { base, name } => {
            let base = eval_inner(base, stack)?;
            member_of(&base, name)
        }

        VcmNode::Call { callee, args } => {
            // `raise` is the interpreter's exception intrinsic.
            if let VcmNode::NamedVar(name) = &**callee {
                if name == "raise" {
                    return eval_raise(args, stack);
                }
            }
            let callee = eval_inner(callee, stack)?;
            let mut evaled = Vec::with_capacity(args.len());
            for a in args {
                evaled.push(eval_inner(a, stack)?);
            }
            invoke(&callee, &evaled)
        }
    }
}

fn eval_raise(args: &[Vcm], stack: &Stack) -> CoreResult<Variant> {
    let name = match args.first() {
        Some(a) => eval_inner(a, stack)?.stringify(),
        None => "ExternalFailure".to_owned(),
    };
    let info = match args.get(1) {
        Some(a) => Some(eval_inner(a, stack)?),
        None => None,
    };
    Err(CoreError::raised(excepts::named(&name), info))
}

/// Resolve member `name` of `base`: object key, or a bound native method
/// wrapped as a dynamic value.
pub fn member_of(base: &Variant, name: &str) -> CoreResult<Variant> {
    if base.object_has(name) {
        return base.object_get_req(name);
    }
    if let Some(entity) = base.as_native() {
        if let Some(getter) = entity.property_getter(name) {
            let setter = entity.property_setter(name);
            return Ok(Variant::dynamic(Some(getter), setter));
        }
        return Err(CoreError::not_exists(name));
    }
    match base.kind() {
        hvml_core::VariantKind::Object => Err(CoreError::not_exists(name)),
        other => Err(CoreError::invalid_value(format!(
            "member access on a {other}"
        ))),
    }
}

/// Invoke a dynamic value with `args`.
pub fn invoke(callee: &Variant, args: &[Variant]) -> CoreResult<Variant> {
    match callee.as_dynamic() {
        Some(dynamic) => dynamic.get(args, false),
        None => Err(CoreError::invalid_value(format!(
            "cannot call a {}",
            callee.kind()
        ))),
    }
}

// =============================================================================
// Expression Variables
// =============================================================================

/// The native entity behind a `bind` tag: an unevaluated expression.
pub struct ExprVar {
    /// The expression tree.
    pub vcm: Vcm,
    /// Evaluate once and reuse (`constantly`).
    pub constantly: bool,
    /// The constant cache, keyed by this expression's identity.
    const_cache: RefCell<Option<Variant>>,
    /// The value the expression-observer tick last saw.
    last_value: RefCell<Option<Variant>>,
}

impl NativeEntity for ExprVar {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn entity_name(&self) -> &'static str {
        "expression"
    }
}

impl ExprVar {
    /// Evaluate the expression against `stack`.
    pub fn evaluate(&self, stack: &Stack, silently: bool) -> CoreResult<Variant> {
        if self.constantly {
            if let Some(cached) = self.const_cache.borrow().clone() {
                return Ok(cached);
            }
            let value = eval(&self.vcm, stack, silently)?;
            *self.const_cache.borrow_mut() = Some(value.clone());
            return Ok(value);
        }
        eval(&self.vcm, stack, silently)
    }

    /// Compare `new` against the cached last value; when different, cache
    /// it and return true (a `change` should dispatch).
    pub fn update_last_value(&self, new: &Variant) -> bool {
        let changed = match &*self.last_value.borrow() {
            Some(old) => old.compare_auto(new) != Ordering::Equal,
            None => true,
        };
        if changed {
            *self.last_value.borrow_mut() = Some(new.clone());
        }
        changed
    }

    /// The last value the tick saw, if any.
    #[must_use]
    pub fn last_value(&self) -> Option<Variant> {
        self.last_value.borrow().clone()
    }
}

/// Wrap `vcm` as an expression variant.
#[must_use]
pub fn make_expression_variant(vcm: Vcm, constantly: bool) -> Variant {
    Variant::native(Rc::new(ExprVar {
        vcm,
        constantly,
        const_cache: RefCell::new(None),
        last_value: RefCell::new(None),
    }))
}

/// Run `f` with the [`ExprVar`] wrapped by `value`, if it is one.
pub fn with_expr_var<R>(value: &Variant, f: impl FnOnce(&ExprVar) -> R) -> Option<R> {
    let entity = value.as_native()?;
    entity.as_any().downcast_ref::<ExprVar>().map(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvml_dom::VdomBuilder;

    fn stack_with_root() -> Stack {
        let vdom = VdomBuilder::new().open("hvml").close().finish();
        let mut stack = Stack::new(vdom);
        let root = stack.vdom.document_element().unwrap();
        stack.push_frame_for(root, false);
        stack
    }

    #[test]
    fn test_literals_and_concat() {
        let stack = stack_with_root();
        let v = eval(&VcmNode::longint(3), &stack, false).unwrap();
        assert_eq!(v.as_i64(), Some(3));

        let c = VcmNode::concat(vec![VcmNode::text("n="), VcmNode::longint(3)]);
        assert_eq!(eval(&c, &stack, false).unwrap().stringify(), "n=3");
    }

    #[test]
    fn test_symbol_resolution_walks_frames() {
        let mut stack = stack_with_root();
        stack
            .top_mut()
            .unwrap()
            .set_symbol(hvml_dom::SymbolName::Percent, Variant::ulongint(7));
        let tree = VcmNode::symbol(hvml_dom::SymbolName::Percent);
        assert_eq!(eval(&tree, &stack, false).unwrap().as_u64(), Some(7));
    }

    #[test]
    fn test_named_var_miss_is_not_exists() {
        let stack = stack_with_root();
        let err = eval(&VcmNode::named("nope"), &stack, false).unwrap_err();
        assert!(matches!(err, CoreError::NotExists { .. }));
        // Silent demotion yields undefined.
        let v = eval(&VcmNode::named("nope"), &stack, true).unwrap();
        assert!(v.is_undefined());
    }

    #[test]
    fn test_raise_surfaces_named_exception() {
        let stack = stack_with_root();
        let err = eval(&VcmNode::raise("BadName"), &stack, false).unwrap_err();
        assert_eq!(err.except_atom(), excepts::bad_name());
    }

    #[test]
    fn test_expression_variant_const_cache() {
        let stack = stack_with_root();
        let expr = make_expression_variant(VcmNode::longint(5), true);
        let first = with_expr_var(&expr, |e| e.evaluate(&stack, false))
            .unwrap()
            .unwrap();
        let second = with_expr_var(&expr, |e| e.evaluate(&stack, false))
            .unwrap()
            .unwrap();
        // Cached: both reads are the same cell.
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_last_value_change_detection() {
        let expr = make_expression_variant(VcmNode::longint(5), false);
        with_expr_var(&expr, |e| {
            assert!(e.update_last_value(&Variant::longint(1)));
            assert!(!e.update_last_value(&Variant::longint(1)));
            assert!(e.update_last_value(&Variant::longint(2)));
        });
    }
}
