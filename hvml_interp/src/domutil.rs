//! Output-DOM helpers.
//!
//! Every primitive (a) mutates the internal output document and (b) emits
//! the corresponding renderer message, unless the stack is rebuilding
//! without a renderer or no page has been attached yet (the whole
//! document travels with the attach in that case).
//!
//! Also home of the `elements` wrapper: the native value behind a frame's
//! `@` symbol and the target of `update on $@`.

use crate::instance::Instance;
use crate::stack::Stack;
use hvml_core::{CoreResult, NativeEntity, Variant};
use hvml_dom::{EDocument, ENodeId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;

/// Native entity wrapping output-DOM element handles.
pub struct ElementsEntity {
    /// The wrapped element handles.
    pub nodes: Vec<ENodeId>,
    /// The document they live in.
    pub doc: Weak<RefCell<EDocument>>,
}

impl NativeEntity for ElementsEntity {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn entity_name(&self) -> &'static str {
        "elements"
    }
}

/// Wrap `element` as an `elements` native value (the `@` symbol).
#[must_use]
pub fn make_elements(doc: &Rc<RefCell<EDocument>>, element: ENodeId) -> Variant {
    Variant::native(Rc::new(ElementsEntity {
        nodes: vec![element],
        doc: Rc::downgrade(doc),
    }))
}

/// The element handles wrapped by an `elements` value, if it is one.
#[must_use]
pub fn elements_of(value: &Variant) -> Option<Vec<ENodeId>> {
    let entity = value.as_native()?;
    entity
        .as_any()
        .downcast_ref::<ElementsEntity>()
        .map(|e| e.nodes.clone())
}

fn emit(
    stack: &Stack,
    inst: &Rc<Instance>,
    operation: &str,
    element: ENodeId,
    property: Option<&str>,
    data: serde_json::Value,
) -> CoreResult<()> {
    if stack.rebuild_without_renderer || stack.rdr_page.is_none() {
        return Ok(());
    }
    let conn = inst.rdr_conn.borrow();
    let Some(conn) = conn.as_ref() else {
        return Ok(());
    };
    trace!(operation, element = element.handle(), "renderer mirror");
    conn.dom_edit(operation, element.handle(), property, data)
}

/// Append a fresh element under `parent`, mirroring `appendChild`.
pub fn append_element(
    stack: &mut Stack,
    inst: &Rc<Instance>,
    parent: ENodeId,
    tag: &str,
) -> CoreResult<ENodeId> {
    let id = stack.doc.borrow_mut().append_element(parent, tag)?;
    emit(
        stack,
        inst,
        "appendChild",
        parent,
        None,
        serde_json::json!({ "tag": tag, "handle": id.handle() }),
    )?;
    Ok(id)
}

/// Append a text node under `parent`, mirroring `appendContent`.
pub fn append_content(
    stack: &mut Stack,
    inst: &Rc<Instance>,
    parent: ENodeId,
    text: &str,
) -> CoreResult<ENodeId> {
    let id = stack.doc.borrow_mut().append_content(parent, text)?;
    emit(
        stack,
        inst,
        "appendContent",
        parent,
        None,
        serde_json::json!({ "content": text }),
    )?;
    Ok(id)
}

/// Replace `parent`'s children with a text node, mirroring
/// `displaceContent`.
pub fn displace_content(
    stack: &mut Stack,
    inst: &Rc<Instance>,
    parent: ENodeId,
    text: &str,
) -> CoreResult<ENodeId> {
    let id = stack.doc.borrow_mut().displace_content(parent, text)?;
    emit(
        stack,
        inst,
        "displaceContent",
        parent,
        None,
        serde_json::json!({ "content": text }),
    )?;
    Ok(id)
}

/// Set an attribute, mirroring `updateElementProperty`.
pub fn set_attribute(
    stack: &mut Stack,
    inst: &Rc<Instance>,
    element: ENodeId,
    key: &str,
    value: &str,
) -> CoreResult<()> {
    stack.doc.borrow_mut().set_attribute(element, key, value)?;
    emit(
        stack,
        inst,
        "updateElementProperty",
        element,
        Some(key),
        serde_json::json!({ "value": value }),
    )
}

/// Graft a parsed HTML chunk under `parent`, mirroring `appendChild`.
pub fn add_child_chunk(
    stack: &mut Stack,
    inst: &Rc<Instance>,
    parent: ENodeId,
    chunk: &str,
) -> CoreResult<Vec<ENodeId>> {
    let grafted = stack.doc.borrow_mut().append_chunk(parent, chunk)?;
    emit(
        stack,
        inst,
        "appendChild",
        parent,
        None,
        serde_json::json!({ "content": chunk }),
    )?;
    Ok(grafted)
}

/// Replace `parent`'s children with a parsed HTML chunk, mirroring
/// `displaceChild`.
pub fn set_child_chunk(
    stack: &mut Stack,
    inst: &Rc<Instance>,
    parent: ENodeId,
    chunk: &str,
) -> CoreResult<Vec<ENodeId>> {
    let grafted = stack.doc.borrow_mut().set_chunk(parent, chunk)?;
    emit(
        stack,
        inst,
        "displaceChild",
        parent,
        None,
        serde_json::json!({ "content": chunk }),
    )?;
    Ok(grafted)
}
