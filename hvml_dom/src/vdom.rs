//! The virtual DOM: the immutable parse tree of an HVML document.
//!
//! Nodes live in an arena indexed by [`VNodeId`]; parent links make the
//! ancestor chain walkable, which the scoped-variable lookup depends on.
//! The tree is immutable once built. [`VdomBuilder`] stands in for the
//! out-of-scope tokenizer/parser.

use crate::attr::AttrOp;
use crate::tag::Tag;
use crate::vcm::Vcm;
use std::rc::Rc;

/// Index of a vDOM node within its document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VNodeId(u32);

impl VNodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One attribute of a vDOM element.
#[derive(Debug, Clone)]
pub struct VAttr {
    /// Attribute name.
    pub name: String,
    /// The operator between name and value.
    pub op: AttrOp,
    /// The unevaluated value; `None` for bare (valueless) attributes.
    pub value: Option<Vcm>,
}

/// Element payload.
#[derive(Debug, Clone)]
pub struct VElement {
    /// The recognized tag.
    pub tag: Tag,
    /// The literal tag name (meaningful for `Tag::Foreign`).
    pub name: Rc<str>,
    /// Attributes, in source order.
    pub attrs: Vec<VAttr>,
}

impl VElement {
    /// The attribute named `name`, if present.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&VAttr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Whether the bare attribute `name` is present (with or without value).
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum VPayload {
    /// The document node (arena root).
    Document,
    /// An element.
    Element(VElement),
    /// Inline content: an unevaluated expression.
    Content(Vcm),
    /// A comment (skipped by execution).
    Comment(String),
}

struct VNode {
    parent: Option<VNodeId>,
    children: Vec<VNodeId>,
    payload: VPayload,
}

/// An immutable vDOM document.
pub struct VdomDocument {
    nodes: Vec<VNode>,
}

impl VdomDocument {
    /// The document (root) node id.
    #[must_use]
    pub fn document_node(&self) -> VNodeId {
        VNodeId(0)
    }

    /// The document element (the `<hvml>` element), if the document has one.
    #[must_use]
    pub fn document_element(&self) -> Option<VNodeId> {
        self.children(self.document_node())
            .iter()
            .copied()
            .find(|&id| self.element(id).is_some())
    }

    /// The payload of `id`.
    #[must_use]
    pub fn payload(&self, id: VNodeId) -> &VPayload {
        &self.nodes[id.index()].payload
    }

    /// The element payload of `id`, if it is an element.
    #[must_use]
    pub fn element(&self, id: VNodeId) -> Option<&VElement> {
        match &self.nodes[id.index()].payload {
            VPayload::Element(e) => Some(e),
            _ => None,
        }
    }

    /// The parent of `id` (`None` for the document node).
    #[must_use]
    pub fn parent(&self, id: VNodeId) -> Option<VNodeId> {
        self.nodes[id.index()].parent
    }

    /// The children of `id`, in source order.
    #[must_use]
    pub fn children(&self, id: VNodeId) -> &[VNodeId] {
        &self.nodes[id.index()].children
    }

    /// Walk the ancestor chain of `id`, starting at `id` itself.
    pub fn ancestors(&self, id: VNodeId) -> impl Iterator<Item = VNodeId> + '_ {
        std::iter::successors(Some(id), move |&cur| self.parent(cur))
    }

    /// The first child of `id` matching `tag`.
    #[must_use]
    pub fn child_by_tag(&self, id: VNodeId, tag: Tag) -> Option<VNodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.element(c).is_some_and(|e| e.tag == tag))
    }

    /// Total node count (diagnostics).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds only the document node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Fluent builder producing a [`VdomDocument`].
///
/// ```
/// use hvml_dom::{VdomBuilder, AttrOp};
/// use hvml_dom::vcm::VcmNode;
///
/// let doc = VdomBuilder::new()
///     .open("hvml")
///     .open("body")
///     .open("iterate")
///     .attr("on", AttrOp::Assign, Some(VcmNode::longint(3)))
///     .close()
///     .close()
///     .close()
///     .finish();
/// assert!(doc.document_element().is_some());
/// ```
pub struct VdomBuilder {
    nodes: Vec<VNode>,
    open: Vec<VNodeId>,
}

impl VdomBuilder {
    /// Start a document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![VNode {
                parent: None,
                children: Vec::new(),
                payload: VPayload::Document,
            }],
            open: vec![VNodeId(0)],
        }
    }

    fn push_node(&mut self, payload: VPayload) -> VNodeId {
        let parent = *self.open.last().expect("builder has no open node");
        let id = VNodeId(u32::try_from(self.nodes.len()).expect("vdom arena overflow"));
        self.nodes.push(VNode {
            parent: Some(parent),
            children: Vec::new(),
            payload,
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Open an element named `name`; subsequent nodes nest inside it.
    #[must_use]
    pub fn open(mut self, name: &str) -> Self {
        let elem = VElement {
            tag: Tag::from_name(name),
            name: Rc::from(name),
            attrs: Vec::new(),
        };
        let id = self.push_node(VPayload::Element(elem));
        self.open.push(id);
        self
    }

    /// Add an attribute to the innermost open element.
    ///
    /// # Panics
    /// Panics if the innermost open node is not an element.
    #[must_use]
    pub fn attr(mut self, name: &str, op: AttrOp, value: Option<Vcm>) -> Self {
        let id = *self.open.last().expect("builder has no open node");
        match &mut self.nodes[id.index()].payload {
            VPayload::Element(e) => e.attrs.push(VAttr {
                name: name.to_owned(),
                op,
                value,
            }),
            _ => panic!("attr outside an element"),
        }
        self
    }

    /// Shorthand for an `=` attribute.
    #[must_use]
    pub fn attr_eq(self, name: &str, value: Vcm) -> Self {
        self.attr(name, AttrOp::Assign, Some(value))
    }

    /// Shorthand for a bare (valueless) attribute.
    #[must_use]
    pub fn attr_bare(self, name: &str) -> Self {
        self.attr(name, AttrOp::Assign, None)
    }

    /// Add inline content (an unevaluated expression) to the open element.
    #[must_use]
    pub fn content(mut self, vcm: Vcm) -> Self {
        self.push_node(VPayload::Content(vcm));
        self
    }

    /// Add a comment node.
    #[must_use]
    pub fn comment(mut self, text: &str) -> Self {
        self.push_node(VPayload::Comment(text.to_owned()));
        self
    }

    /// Close the innermost open element.
    ///
    /// # Panics
    /// Panics when only the document node remains open.
    #[must_use]
    pub fn close(mut self) -> Self {
        assert!(self.open.len() > 1, "close without a matching open");
        self.open.pop();
        self
    }

    /// Finish the document, closing any elements still open.
    #[must_use]
    pub fn finish(self) -> Rc<VdomDocument> {
        Rc::new(VdomDocument { nodes: self.nodes })
    }
}

impl Default for VdomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcm::VcmNode;

    #[test]
    fn test_build_and_walk() {
        let doc = VdomBuilder::new()
            .open("hvml")
            .attr_eq("target", VcmNode::text("html"))
            .open("head")
            .close()
            .open("body")
            .open("span")
            .content(VcmNode::text("hi"))
            .close()
            .close()
            .close()
            .finish();

        let hvml = doc.document_element().unwrap();
        assert_eq!(doc.element(hvml).unwrap().tag, Tag::Hvml);
        let body = doc.child_by_tag(hvml, Tag::Body).unwrap();
        let span = doc.children(body)[0];
        assert_eq!(doc.element(span).unwrap().tag, Tag::Foreign);
        assert_eq!(&*doc.element(span).unwrap().name, "span");

        let chain: Vec<_> = doc.ancestors(span).collect();
        assert_eq!(chain, vec![span, body, hvml, doc.document_node()]);
    }

    #[test]
    fn test_attr_lookup() {
        let doc = VdomBuilder::new()
            .open("hvml")
            .open("iterate")
            .attr_eq("on", VcmNode::longint(3))
            .close()
            .close()
            .finish();
        let hvml = doc.document_element().unwrap();
        let iterate = doc.children(hvml)[0];
        let elem = doc.element(iterate).unwrap();
        assert!(elem.has_attr("on"));
        assert!(elem.attr("missing").is_none());
    }
}
