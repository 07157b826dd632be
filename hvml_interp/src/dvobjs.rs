//! Built-in document variables.
//!
//! Bound at document scope when a coroutine is scheduled: `$HVML`,
//! `$SYSTEM`, `$DATETIME`, `$T`, `$L`, `$STR`, `$EJSON`, `$STREAM`,
//! `$DOC`, `$SESSION`. (`$TIMERS` is wired by the timer module.)
//!
//! Members are dynamic variants: reading `$L.lt` yields a bound method
//! value, and calling it runs the getter.

use crate::coroutine::Coroutine;
use crate::domutil::ElementsEntity;
use crate::instance::Instance;
use hvml_core::{CoreError, CoreResult, NativeEntity, NativeMethod, Variant};
use hvml_dom::EDocument;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

fn getter(f: impl Fn(&[Variant]) -> CoreResult<Variant> + 'static) -> NativeMethod {
    Rc::new(move |args, _silently| f(args))
}

fn method_member(obj: &Variant, name: &str, m: NativeMethod) {
    let _ = obj.object_set(name, Variant::dynamic(Some(m), None));
}

fn arg(args: &[Variant], i: usize) -> CoreResult<Variant> {
    args.get(i)
        .cloned()
        .ok_or_else(|| CoreError::bad_arg(format!("missing argument #{i}")))
}

fn num_arg(args: &[Variant], i: usize) -> CoreResult<f64> {
    arg(args, i)?.cast_to_number(true)
}

// =============================================================================
// $L
// =============================================================================

fn make_logical() -> Variant {
    let l = Variant::object();
    method_member(&l, "not", getter(|a| Ok(Variant::boolean(!arg(a, 0)?.truthy()))));
    method_member(
        &l,
        "and",
        getter(|a| Ok(Variant::boolean(a.iter().all(Variant::truthy)))),
    );
    method_member(
        &l,
        "or",
        getter(|a| Ok(Variant::boolean(a.iter().any(Variant::truthy)))),
    );
    method_member(
        &l,
        "streq",
        getter(|a| Ok(Variant::boolean(arg(a, 0)?.stringify() == arg(a, 1)?.stringify()))),
    );

    for (name, f) in [
        ("lt", (|x, y| x < y) as fn(f64, f64) -> bool),
        ("gt", |x, y| x > y),
        ("le", |x, y| x <= y),
        ("ge", |x, y| x >= y),
        ("eq", |x, y| x == y),
        ("ne", |x, y| x != y),
    ] {
        method_member(
            &l,
            name,
            getter(move |a| Ok(Variant::boolean(f(num_arg(a, 0)?, num_arg(a, 1)?)))),
        );
    }
    l
}

// =============================================================================
// $SYSTEM / $DATETIME
// =============================================================================

fn epoch_now() -> (u64, u32) {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs(), d.subsec_nanos()),
        Err(_) => (0, 0),
    }
}

/// Civil date from a day count (days since 1970-01-01).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

fn iso_now() -> String {
    let (secs, _) = epoch_now();
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    format!(
        "{y:04}-{m:02}-{d:02}T{:02}:{:02}:{:02}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

fn make_system() -> Variant {
    let sys = Variant::object();
    method_member(&sys, "locale", getter(|_| Ok(Variant::string("C"))));
    method_member(
        &sys,
        "time",
        getter(|_| Ok(Variant::number(epoch_now().0 as f64))),
    );
    method_member(
        &sys,
        "random",
        getter(|_| {
            let (s, n) = epoch_now();
            // Mix the clock through an LCG step for a cheap pseudo-random.
            let mixed = (s ^ u64::from(n))
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            Ok(Variant::number((mixed >> 11) as f64 / (1u64 << 53) as f64))
        }),
    );
    sys
}

fn make_datetime() -> Variant {
    let dt = Variant::object();
    method_member(
        &dt,
        "now",
        getter(|_| {
            let (s, n) = epoch_now();
            Ok(Variant::ulongint(s * 1000 + u64::from(n) / 1_000_000))
        }),
    );
    method_member(&dt, "time_prt", getter(|_| Ok(Variant::string(iso_now()))));
    dt
}

// =============================================================================
// $T / $STR / $EJSON
// =============================================================================

fn make_text() -> Variant {
    let t = Variant::object();
    let map = Variant::object();
    let _ = t.object_set("map", map.clone());
    method_member(
        &t,
        "get",
        getter(move |a| {
            let key = arg(a, 0)?.stringify();
            Ok(map.object_get(&key).unwrap_or_else(|| Variant::string(key)))
        }),
    );
    t
}

fn make_string_ops() -> Variant {
    let s = Variant::object();
    method_member(
        &s,
        "contains",
        getter(|a| {
            Ok(Variant::boolean(
                arg(a, 0)?.stringify().contains(&arg(a, 1)?.stringify()),
            ))
        }),
    );
    method_member(
        &s,
        "join",
        getter(|a| {
            let mut out = String::new();
            for v in a {
                out.push_str(&v.stringify());
            }
            Ok(Variant::string(out))
        }),
    );
    method_member(
        &s,
        "tolower",
        getter(|a| Ok(Variant::string(arg(a, 0)?.stringify().to_lowercase()))),
    );
    method_member(
        &s,
        "toupper",
        getter(|a| Ok(Variant::string(arg(a, 0)?.stringify().to_uppercase()))),
    );
    s
}

fn make_ejson() -> Variant {
    let e = Variant::object();
    method_member(
        &e,
        "type",
        getter(|a| Ok(Variant::string(arg(a, 0)?.kind().to_string()))),
    );
    method_member(
        &e,
        "count",
        getter(|a| {
            let v = arg(a, 0)?;
            let n = v.container_len().unwrap_or(usize::from(!v.is_undefined()));
            Ok(Variant::ulongint(n as u64))
        }),
    );
    method_member(
        &e,
        "numberify",
        getter(|a| Ok(Variant::number(arg(a, 0)?.cast_to_number(true).unwrap_or(0.0)))),
    );
    e
}

// =============================================================================
// $STREAM
// =============================================================================

struct StdoutStream;

impl NativeEntity for StdoutStream {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn entity_name(&self) -> &'static str {
        "stream"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        match name {
            "writelines" => Some(getter(|a| {
                let mut count = 0u64;
                for v in a {
                    info!(target: "hvml_stream", "{}", v.stringify());
                    count += 1;
                }
                Ok(Variant::ulongint(count))
            })),
            _ => None,
        }
    }
}

fn make_stream() -> Variant {
    let s = Variant::object();
    let _ = s.object_set("stdout", Variant::native(Rc::new(StdoutStream)));
    s
}

// =============================================================================
// $HVML
// =============================================================================

/// Document control properties behind `$HVML`.
pub struct HvmlCtrlProps {
    /// Base URL for relative loads.
    pub base: RefCell<String>,
    /// Iteration guard.
    pub max_iteration_count: Cell<u64>,
    /// Frame-depth guard.
    pub max_recursion_depth: Cell<u64>,
    /// Renderer/request timeout in seconds.
    pub timeout: Cell<f64>,
}

impl Default for HvmlCtrlProps {
    fn default() -> Self {
        Self {
            base: RefCell::new(String::new()),
            max_iteration_count: Cell::new(u64::MAX),
            max_recursion_depth: Cell::new(1000),
            timeout: Cell::new(5.0),
        }
    }
}

struct HvmlEntity {
    props: Rc<HvmlCtrlProps>,
}

impl NativeEntity for HvmlEntity {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn entity_name(&self) -> &'static str {
        "hvml"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        let props = Rc::clone(&self.props);
        match name {
            "base" => Some(getter(move |_| Ok(Variant::string(props.base.borrow().clone())))),
            "maxIterationCount" => Some(getter(move |_| {
                Ok(Variant::ulongint(props.max_iteration_count.get()))
            })),
            "maxRecursionDepth" => Some(getter(move |_| {
                Ok(Variant::ulongint(props.max_recursion_depth.get()))
            })),
            "timeout" => Some(getter(move |_| Ok(Variant::number(props.timeout.get())))),
            _ => None,
        }
    }

    fn property_setter(&self, name: &str) -> Option<NativeMethod> {
        let props = Rc::clone(&self.props);
        match name {
            "base" => Some(getter(move |a| {
                *props.base.borrow_mut() = arg(a, 0)?.stringify();
                Ok(Variant::boolean(true))
            })),
            "maxIterationCount" => Some(getter(move |a| {
                props
                    .max_iteration_count
                    .set(arg(a, 0)?.cast_to_ulongint(true)?);
                Ok(Variant::boolean(true))
            })),
            "maxRecursionDepth" => Some(getter(move |a| {
                props
                    .max_recursion_depth
                    .set(arg(a, 0)?.cast_to_ulongint(true)?);
                Ok(Variant::boolean(true))
            })),
            "timeout" => Some(getter(move |a| {
                props.timeout.set(arg(a, 0)?.cast_to_number(true)?);
                Ok(Variant::boolean(true))
            })),
            _ => None,
        }
    }
}

// =============================================================================
// $DOC
// =============================================================================

struct DocEntity {
    doc: Weak<RefCell<EDocument>>,
}

impl NativeEntity for DocEntity {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn entity_name(&self) -> &'static str {
        "doc"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        if name != "query" {
            return None;
        }
        let weak = self.doc.clone();
        Some(getter(move |a| {
            let selector = arg(a, 0)?.stringify();
            let Some(doc) = weak.upgrade() else {
                return Err(CoreError::not_allowed("document is gone"));
            };
            let nodes = query_selector(&doc.borrow(), &selector);
            Ok(Variant::native(Rc::new(ElementsEntity {
                nodes,
                doc: weak.clone(),
            })))
        }))
    }
}

/// Minimal selector support: `#id` by attribute, otherwise by tag name.
fn query_selector(doc: &EDocument, selector: &str) -> Vec<hvml_dom::ENodeId> {
    let mut out = Vec::new();
    let mut queue = vec![doc.html()];
    while let Some(node) = queue.pop() {
        queue.extend(doc.children(node).iter().copied());
        let matched = match selector.strip_prefix('#') {
            Some(id) => doc.attribute(node, "id") == Some(id),
            None => doc
                .tag_name(node)
                .is_some_and(|n| n.as_ref() == selector),
        };
        if matched {
            out.push(node);
        }
    }
    out
}

// =============================================================================
// Binding
// =============================================================================

/// Bind every built-in document variable on `co` at document scope.
pub fn bind_document_variables(_inst: &Rc<Instance>, co: &mut Coroutine) {
    let doc_node = co.stack.vdom.document_node();
    let scoped = &mut co.stack.scoped;

    let props = Rc::new(HvmlCtrlProps::default());
    scoped.bind(
        doc_node,
        "HVML",
        Variant::native(Rc::new(HvmlEntity { props })),
    );
    scoped.bind(doc_node, "SYSTEM", make_system());
    scoped.bind(doc_node, "DATETIME", make_datetime());
    scoped.bind(doc_node, "T", make_text());
    scoped.bind(doc_node, "L", make_logical());
    scoped.bind(doc_node, "STR", make_string_ops());
    scoped.bind(doc_node, "EJSON", make_ejson());
    scoped.bind(doc_node, "STREAM", make_stream());
    scoped.bind(
        doc_node,
        "DOC",
        Variant::native(Rc::new(DocEntity {
            doc: Rc::downgrade(&co.stack.doc),
        })),
    );
    scoped.bind(doc_node, "SESSION", Variant::object());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_members() {
        let l = make_logical();
        let lt = l.object_get("lt").unwrap().as_dynamic().unwrap();
        let out = lt
            .get(&[Variant::longint(1), Variant::longint(2)], false)
            .unwrap();
        assert_eq!(out.as_bool(), Some(true));

        let streq = l.object_get("streq").unwrap().as_dynamic().unwrap();
        let out = streq
            .get(&[Variant::string("a"), Variant::string("a")], false)
            .unwrap();
        assert_eq!(out.as_bool(), Some(true));
    }

    #[test]
    fn test_ejson_type_and_count() {
        let e = make_ejson();
        let ty = e.object_get("type").unwrap().as_dynamic().unwrap();
        assert_eq!(
            ty.get(&[Variant::array()], false).unwrap().stringify(),
            "array"
        );
        let count = e.object_get("count").unwrap().as_dynamic().unwrap();
        let arr = Variant::array_with([Variant::null(), Variant::null()]);
        assert_eq!(count.get(&[arr], false).unwrap().as_u64(), Some(2));
    }

    #[test]
    fn test_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }

    #[test]
    fn test_hvml_ctrl_roundtrip() {
        let entity = HvmlEntity {
            props: Rc::new(HvmlCtrlProps::default()),
        };
        let set = entity.property_setter("timeout").unwrap();
        set(&[Variant::number(2.5)], false).unwrap();
        let get = entity.property_getter("timeout").unwrap();
        assert_eq!(get(&[], false).unwrap().as_number(), Some(2.5));
    }
}
