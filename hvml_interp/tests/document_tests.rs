//! End-to-end document runs: empty documents, output elements,
//! iteration, and renderer parity.

use hvml_dom::vcm::VcmNode;
use hvml_dom::{AttrOp, SymbolName, VdomBuilder, VdomDocument};
use hvml_interp::rdr::LoopbackRenderer;
use hvml_interp::{CoroutineId, Instance, RendererEndpoint};
use std::rc::Rc;

// =============================================================================
// Test Helpers
// =============================================================================

fn run_doc(
    vdom: Rc<VdomDocument>,
) -> (Rc<Instance>, CoroutineId, Rc<LoopbackRenderer>) {
    let renderer = LoopbackRenderer::new();
    let endpoint: Rc<dyn RendererEndpoint> = renderer.clone();
    let inst = Instance::boot(Some(endpoint));
    let co = inst.schedule_vdom(vdom);
    inst.run().expect("document run failed");
    (inst, co, renderer)
}

fn empty_doc() -> Rc<VdomDocument> {
    VdomBuilder::new().open("hvml").close().finish()
}

// =============================================================================
// A. Empty Document
// =============================================================================

#[test]
fn test_empty_document_creates_window_and_exits() {
    let (inst, co, renderer) = run_doc(empty_doc());

    assert_eq!(renderer.operations(), vec!["createPlainWindow"]);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body></body></html>"
    );
    assert!(inst.coroutine_exception(co).is_none());
    assert_eq!(inst.heap.coroutine_count(), 0);
}

#[test]
fn test_run_without_renderer_still_builds_the_document() {
    let inst = Instance::boot(None);
    let co = inst.schedule_vdom(empty_doc());
    inst.run().unwrap();
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body></body></html>"
    );
}

#[test]
fn test_renderer_refusal_surfaces_server_refused() {
    let endpoint: Rc<dyn RendererEndpoint> = LoopbackRenderer::refusing(500);
    let inst = Instance::boot(Some(endpoint));
    let co = inst.schedule_vdom(empty_doc());
    let result = inst.run();
    assert!(result.is_err());
    let exc = inst.coroutine_exception(co).unwrap();
    assert_eq!(exc.atom.to_string(), "ServerRefused");
}

// =============================================================================
// B. Output Elements
// =============================================================================

#[test]
fn test_foreign_elements_and_content() {
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("p")
        .attr_eq("class", VcmNode::text("greeting"))
        .content(VcmNode::text("hello"))
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, _renderer) = run_doc(doc);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body><p class=\"greeting\">hello</p></body></html>"
    );
}

#[test]
fn test_nested_output_elements() {
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("ul")
        .open("li")
        .content(VcmNode::text("one"))
        .close()
        .open("li")
        .content(VcmNode::text("two"))
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, _) = run_doc(doc);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body><ul><li>one</li><li>two</li></ul></body></html>"
    );
}

#[test]
fn test_head_content_lands_in_head() {
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("head")
        .open("title")
        .content(VcmNode::text("t"))
        .close()
        .close()
        .open("body")
        .close()
        .close()
        .finish();

    let (inst, co, _) = run_doc(doc);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head><title>t</title></head><body></body></html>"
    );
}

// =============================================================================
// C. Iteration
// =============================================================================

#[test]
fn test_iterate_with_counter() {
    // <iterate on 3L><span>$%</span></iterate>
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("iterate")
        .attr_eq("on", VcmNode::longint(3))
        .open("span")
        .content(VcmNode::symbol(SymbolName::Percent))
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, _) = run_doc(doc);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body>\
         <span>0</span><span>1</span><span>2</span>\
         </body></html>"
    );
}

#[test]
fn test_iterate_over_array_delivers_input() {
    // <iterate on [10, 20]><i>$<</i></iterate>
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("iterate")
        .attr_eq(
            "on",
            VcmNode::array(vec![VcmNode::longint(10), VcmNode::longint(20)]),
        )
        .open("i")
        .content(VcmNode::symbol(SymbolName::LessThan))
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, _) = run_doc(doc);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body><i>10</i><i>20</i></body></html>"
    );
}

#[test]
fn test_iterate_with_executor_rule() {
    // <iterate on {a:1,b:2} by "KEY: ALL, FOR VALUE">
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("iterate")
        .attr_eq(
            "on",
            VcmNode::object(vec![
                ("a", VcmNode::longint(1)),
                ("b", VcmNode::longint(2)),
            ]),
        )
        .attr_eq("by", VcmNode::text("KEY: ALL, FOR VALUE"))
        .open("b")
        .content(VcmNode::symbol(SymbolName::LessThan))
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, _) = run_doc(doc);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body><b>1</b><b>2</b></body></html>"
    );
}

// =============================================================================
// D. Renderer Parity
// =============================================================================

#[test]
fn test_attach_carries_the_serialized_document() {
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("span")
        .content(VcmNode::text("x"))
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, renderer) = run_doc(doc);
    let messages = renderer.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].operation, "createPlainWindow");
    let html_sent = messages[0].data["html"].as_str().unwrap();
    assert_eq!(html_sent, inst.document_html(co).unwrap());
}

// =============================================================================
// E. Data Tags
// =============================================================================

#[test]
fn test_init_binds_a_scoped_value() {
    // <init as 'msg' with 'hi'/><p>$msg</p>
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("init")
        .attr_eq("as", VcmNode::text("msg"))
        .attr_eq("with", VcmNode::text("hi"))
        .close()
        .open("p")
        .content(VcmNode::named("msg"))
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, _) = run_doc(doc);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body><p>hi</p></body></html>"
    );
}

#[test]
fn test_test_match_differ() {
    // <test on 2L><match for "EQ 1">a</match><match for "EQ 2">b</match>
    //   <differ>c</differ></test>
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("test")
        .attr_eq("on", VcmNode::longint(2))
        .open("match")
        .attr_eq("for", VcmNode::text("EQ 1"))
        .open("em")
        .content(VcmNode::text("a"))
        .close()
        .close()
        .open("match")
        .attr_eq("for", VcmNode::text("EQ 2"))
        .open("em")
        .content(VcmNode::text("b"))
        .close()
        .close()
        .open("differ")
        .open("em")
        .content(VcmNode::text("c"))
        .close()
        .close()
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, _) = run_doc(doc);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body><em>b</em></body></html>"
    );
}

#[test]
fn test_attribute_operator_on_existing_value() {
    // Two class attributes: `=` then `$=` appends.
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("div")
        .attr("class", AttrOp::Assign, Some(VcmNode::text("a")))
        .attr("class", AttrOp::Append, Some(VcmNode::text("-b")))
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, _) = run_doc(doc);
    assert_eq!(
        inst.document_html(co).unwrap(),
        "<html><head></head><body><div class=\"a-b\"></div></body></html>"
    );
}

#[test]
fn test_exit_with_value_terminates_the_run() {
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("body")
        .open("exit")
        .attr_eq("with", VcmNode::text("done"))
        .close()
        .open("p")
        .content(VcmNode::text("never reached"))
        .close()
        .close()
        .close()
        .finish();

    let (inst, co, _) = run_doc(doc);
    assert_eq!(inst.coroutine_result(co).unwrap().stringify(), "done");
    assert!(!inst.document_html(co).unwrap().contains("never reached"));
}

#[test]
fn test_output_element_outside_a_section_is_rejected() {
    // A <span> directly under <hvml> is in the wrong insertion mode.
    let doc = VdomBuilder::new()
        .open("hvml")
        .open("span")
        .content(VcmNode::text("misplaced"))
        .close()
        .close()
        .finish();

    let inst = Instance::boot(None);
    let co = inst.schedule_vdom(doc);
    assert!(inst.run().is_err());
    let exc = inst.coroutine_exception(co).unwrap();
    assert_eq!(exc.atom.to_string(), "WrongStage");
    assert!(!inst.document_html(co).unwrap().contains("misplaced"));
}

#[test]
fn test_refcount_balance_across_a_run() {
    let inst = Instance::boot(None);
    let vdom = empty_doc();
    let co = inst.schedule_vdom(Rc::clone(&vdom));

    // Hand a value into the coroutine's scope and keep our own handle.
    let probe = hvml_core::Variant::object();
    {
        let cell = inst.heap.coroutine(co).unwrap();
        let mut co_ref = cell.borrow_mut();
        let doc_node = vdom.document_node();
        co_ref.stack.scoped.bind(doc_node, "probe", probe.clone());
        assert_eq!(probe.ref_count(), 2);
    }

    inst.run().unwrap();
    // Termination released the coroutine's reference.
    assert_eq!(probe.ref_count(), 1);
}
