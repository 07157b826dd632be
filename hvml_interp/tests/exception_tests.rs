//! Exception propagation: capture at step boundaries, `catch`
//! consumption, silent demotion, and unhandled termination.

use hvml_dom::vcm::VcmNode;
use hvml_dom::{VdomBuilder, VdomDocument};
use hvml_interp::{CoroutineId, Instance};
use std::rc::Rc;

fn run_doc(vdom: Rc<VdomDocument>) -> (Rc<Instance>, CoroutineId, bool) {
    let inst = Instance::boot(None);
    let co = inst.schedule_vdom(vdom);
    let ok = inst.run().is_ok();
    (inst, co, ok)
}

// =============================================================================
// A. Catch
// =============================================================================

#[test]
fn test_catch_named_exception() {
    // <hvml><inherit>{{ raise('BadName') }}
    //   <catch for `BadName`><exit with 'ok'/></catch></inherit></hvml>
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("inherit")
        .content(VcmNode::raise("BadName"))
        .open("catch")
        .attr_eq("for", VcmNode::text("`BadName`"))
        .open("exit")
        .attr_eq("with", VcmNode::text("ok"))
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, ok) = run_doc(doc);
    assert!(ok, "catch should have consumed the exception");
    assert_eq!(inst.coroutine_result(co).unwrap().stringify(), "ok");
    assert!(inst.coroutine_exception(co).is_none());
}

#[test]
fn test_catch_wildcard() {
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("inherit")
        .content(VcmNode::raise("SomethingElse"))
        .open("catch")
        .attr_eq("for", VcmNode::text("*"))
        .open("exit")
        .attr_eq("with", VcmNode::text("caught"))
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, ok) = run_doc(doc);
    assert!(ok);
    assert_eq!(inst.coroutine_result(co).unwrap().stringify(), "caught");
}

#[test]
fn test_catch_with_wrong_name_does_not_consume() {
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("inherit")
        .content(VcmNode::raise("BadName"))
        .open("catch")
        .attr_eq("for", VcmNode::text("`NoSuchKey`"))
        .open("exit")
        .attr_eq("with", VcmNode::text("wrong"))
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, ok) = run_doc(doc);
    assert!(!ok, "the exception should have survived");
    let exc = inst.coroutine_exception(co).unwrap();
    assert_eq!(exc.atom.to_string(), "BadName");
}

// =============================================================================
// B. Unhandled Exceptions
// =============================================================================

#[test]
fn test_unhandled_exception_terminates_with_error() {
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("inherit")
        .content(VcmNode::raise("NoSuchKey"))
        .close()
        .close()
        .finish();

    let (inst, co, ok) = run_doc(doc);
    assert!(!ok);
    let exc = inst.coroutine_exception(co).unwrap();
    assert_eq!(exc.atom.to_string(), "NoSuchKey");
    // The process did not crash and the heap is clean.
    assert_eq!(inst.heap.coroutine_count(), 0);
}

#[test]
fn test_exception_skips_remaining_siblings() {
    // The <p> after the raising element must not render.
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("inherit")
        .content(VcmNode::raise("BadName"))
        .close()
        .open("p")
        .content(VcmNode::text("skipped"))
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, ok) = run_doc(doc);
    assert!(!ok);
    assert!(!inst.document_html(co).unwrap().contains("skipped"));
}

// =============================================================================
// C. Silent Frames
// =============================================================================

#[test]
fn test_silently_demotes_missing_variable() {
    // <p silently>$missing</p> renders as undefined text.
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("p")
        .attr_bare("silently")
        .content(VcmNode::named("missing"))
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, ok) = run_doc(doc);
    assert!(ok, "silent frame should demote the error");
    assert!(inst.coroutine_exception(co).is_none());
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body><p>undefined</p></body></html>"
    );
}

#[test]
fn test_missing_variable_without_silently_raises() {
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("p")
        .content(VcmNode::named("missing"))
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, ok) = run_doc(doc);
    assert!(!ok);
    let exc = inst.coroutine_exception(co).unwrap();
    assert_eq!(exc.atom.to_string(), "NoSuchKey");
}
