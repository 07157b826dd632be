//! The output DOM: the mutable HTML-shaped tree a coroutine builds.
//!
//! The tree starts as the `<html><head></head><body></body></html>`
//! skeleton; execution appends elements and text under the current
//! insertion point. Chunk helpers parse an HTML fragment inside a hidden
//! wrapper and graft its children in order.
//!
//! This module only stores and serializes; the interpreter's DOM helper
//! layer pairs every mutation here with the matching renderer message.

use hvml_core::{CoreError, CoreResult};
use std::rc::Rc;

/// Index of a node within the output-DOM arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ENodeId(u32);

impl ENodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }

    /// A stable handle value for renderer messages.
    #[must_use]
    pub fn handle(self) -> u64 {
        u64::from(self.0)
    }
}

enum EPayload {
    Element {
        name: Rc<str>,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

struct ENode {
    parent: Option<ENodeId>,
    children: Vec<ENodeId>,
    payload: EPayload,
}

/// The mutable output document.
pub struct EDocument {
    nodes: Vec<ENode>,
    html: ENodeId,
    head: ENodeId,
    body: ENodeId,
}

impl EDocument {
    /// A fresh document with the html/head/body skeleton.
    #[must_use]
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            html: ENodeId(0),
            head: ENodeId(0),
            body: ENodeId(0),
        };
        let html = doc.alloc(None, "html");
        let head = doc.alloc(Some(html), "head");
        let body = doc.alloc(Some(html), "body");
        doc.html = html;
        doc.head = head;
        doc.body = body;
        doc
    }

    fn alloc(&mut self, parent: Option<ENodeId>, name: &str) -> ENodeId {
        let id = ENodeId(u32::try_from(self.nodes.len()).expect("edom arena overflow"));
        self.nodes.push(ENode {
            parent,
            children: Vec::new(),
            payload: EPayload::Element {
                name: Rc::from(name),
                attrs: Vec::new(),
            },
        });
        if let Some(p) = parent {
            self.nodes[p.index()].children.push(id);
        }
        id
    }

    fn alloc_text(&mut self, parent: ENodeId, text: &str) -> ENodeId {
        let id = ENodeId(u32::try_from(self.nodes.len()).expect("edom arena overflow"));
        self.nodes.push(ENode {
            parent: Some(parent),
            children: Vec::new(),
            payload: EPayload::Text(text.to_owned()),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// The `<html>` element.
    #[must_use]
    pub fn html(&self) -> ENodeId {
        self.html
    }

    /// The `<head>` element.
    #[must_use]
    pub fn head(&self) -> ENodeId {
        self.head
    }

    /// The `<body>` element.
    #[must_use]
    pub fn body(&self) -> ENodeId {
        self.body
    }

    /// The tag name of an element node; `None` for text nodes.
    #[must_use]
    pub fn tag_name(&self, id: ENodeId) -> Option<Rc<str>> {
        match &self.nodes[id.index()].payload {
            EPayload::Element { name, .. } => Some(Rc::clone(name)),
            EPayload::Text(_) => None,
        }
    }

    /// The parent of `id`.
    #[must_use]
    pub fn parent(&self, id: ENodeId) -> Option<ENodeId> {
        self.nodes[id.index()].parent
    }

    /// The children of `id`, in order.
    #[must_use]
    pub fn children(&self, id: ENodeId) -> &[ENodeId] {
        &self.nodes[id.index()].children
    }

    /// The attribute `key` of element `id`.
    #[must_use]
    pub fn attribute(&self, id: ENodeId, key: &str) -> Option<&str> {
        match &self.nodes[id.index()].payload {
            EPayload::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            EPayload::Text(_) => None,
        }
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    /// Append a fresh `<tag>` element under `parent`.
    pub fn append_element(&mut self, parent: ENodeId, tag: &str) -> CoreResult<ENodeId> {
        if matches!(self.nodes[parent.index()].payload, EPayload::Text(_)) {
            return Err(CoreError::invalid_value("cannot append under a text node"));
        }
        Ok(self.alloc(Some(parent), tag))
    }

    /// Append a text node under `parent`.
    pub fn append_content(&mut self, parent: ENodeId, text: &str) -> CoreResult<ENodeId> {
        if matches!(self.nodes[parent.index()].payload, EPayload::Text(_)) {
            return Err(CoreError::invalid_value("cannot append under a text node"));
        }
        Ok(self.alloc_text(parent, text))
    }

    /// Replace all children of `parent` with a single text node.
    pub fn displace_content(&mut self, parent: ENodeId, text: &str) -> CoreResult<ENodeId> {
        self.remove_children(parent)?;
        self.append_content(parent, text)
    }

    /// Set attribute `key` on element `id`, overwriting any existing value.
    pub fn set_attribute(&mut self, id: ENodeId, key: &str, value: &str) -> CoreResult<()> {
        match &mut self.nodes[id.index()].payload {
            EPayload::Element { attrs, .. } => {
                match attrs.iter_mut().find(|(k, _)| k == key) {
                    Some((_, v)) => *v = value.to_owned(),
                    None => attrs.push((key.to_owned(), value.to_owned())),
                }
                Ok(())
            }
            EPayload::Text(_) => Err(CoreError::invalid_value("set_attribute on a text node")),
        }
    }

    /// Detach all children of `parent` (their subtrees become unreachable).
    pub fn remove_children(&mut self, parent: ENodeId) -> CoreResult<()> {
        if matches!(self.nodes[parent.index()].payload, EPayload::Text(_)) {
            return Err(CoreError::invalid_value("remove_children on a text node"));
        }
        let children = std::mem::take(&mut self.nodes[parent.index()].children);
        for c in children {
            self.nodes[c.index()].parent = None;
        }
        Ok(())
    }

    /// Parse `chunk` as an HTML fragment and append its nodes under
    /// `parent`, in order. Returns the grafted top-level node ids.
    pub fn append_chunk(&mut self, parent: ENodeId, chunk: &str) -> CoreResult<Vec<ENodeId>> {
        let fragment = parse_fragment(chunk)?;
        let mut grafted = Vec::new();
        for part in fragment {
            grafted.push(self.graft(parent, &part)?);
        }
        Ok(grafted)
    }

    /// Replace the children of `parent` with the parsed `chunk`.
    pub fn set_chunk(&mut self, parent: ENodeId, chunk: &str) -> CoreResult<Vec<ENodeId>> {
        self.remove_children(parent)?;
        self.append_chunk(parent, chunk)
    }

    fn graft(&mut self, parent: ENodeId, part: &FragmentNode) -> CoreResult<ENodeId> {
        match part {
            FragmentNode::Text(t) => self.append_content(parent, t),
            FragmentNode::Element {
                name,
                attrs,
                children,
            } => {
                let id = self.append_element(parent, name)?;
                for (k, v) in attrs {
                    self.set_attribute(id, k, v)?;
                }
                for c in children {
                    self.graft(id, c)?;
                }
                Ok(id)
            }
        }
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize the whole document.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.serialize_node_into(self.html, &mut out);
        out
    }

    /// Serialize the subtree rooted at `id`.
    #[must_use]
    pub fn serialize_node(&self, id: ENodeId) -> String {
        let mut out = String::new();
        self.serialize_node_into(id, &mut out);
        out
    }

    fn serialize_node_into(&self, id: ENodeId, out: &mut String) {
        use std::fmt::Write as _;
        match &self.nodes[id.index()].payload {
            EPayload::Text(t) => out.push_str(&escape_text(t)),
            EPayload::Element { name, attrs } => {
                let _ = write!(out, "<{name}");
                for (k, v) in attrs {
                    let _ = write!(out, " {k}=\"{}\"", escape_attr(v));
                }
                out.push('>');
                for &c in &self.nodes[id.index()].children {
                    self.serialize_node_into(c, out);
                }
                let _ = write!(out, "</{name}>");
            }
        }
    }

    /// Concatenated text content of the subtree rooted at `id`.
    #[must_use]
    pub fn text_content(&self, id: ENodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: ENodeId, out: &mut String) {
        match &self.nodes[id.index()].payload {
            EPayload::Text(t) => out.push_str(t),
            EPayload::Element { .. } => {
                for &c in &self.nodes[id.index()].children {
                    self.collect_text(c, out);
                }
            }
        }
    }
}

impl Default for EDocument {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

// =============================================================================
// Fragment Parsing
// =============================================================================

enum FragmentNode {
    Text(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<FragmentNode>,
    },
}

/// A minimal fragment parser: elements, attributes (quoted or bare),
/// self-closing tags, and text. Enough for chunk grafting; full HTML
/// parsing is out of scope.
fn parse_fragment(chunk: &str) -> CoreResult<Vec<FragmentNode>> {
    let mut parser = FragmentParser {
        input: chunk.as_bytes(),
        pos: 0,
    };
    let nodes = parser.parse_nodes(None)?;
    if parser.pos < parser.input.len() {
        return Err(CoreError::bad_arg("unbalanced fragment"));
    }
    Ok(nodes)
}

struct FragmentParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl FragmentParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s.as_bytes())
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn parse_nodes(&mut self, enclosing: Option<&str>) -> CoreResult<Vec<FragmentNode>> {
        let mut nodes = Vec::new();
        loop {
            if self.pos >= self.input.len() {
                if enclosing.is_some() {
                    return Err(CoreError::bad_arg("unterminated element in fragment"));
                }
                return Ok(nodes);
            }
            if self.starts_with("</") {
                return Ok(nodes);
            }
            if self.peek() == Some(b'<') {
                nodes.push(self.parse_element()?);
            } else {
                let start = self.pos;
                while self.pos < self.input.len() && self.peek() != Some(b'<') {
                    self.pos += 1;
                }
                let text = std::str::from_utf8(&self.input[start..self.pos])
                    .map_err(|_| CoreError::bad_arg("fragment is not UTF-8"))?;
                if !text.trim().is_empty() {
                    nodes.push(FragmentNode::Text(text.to_owned()));
                }
            }
        }
    }

    fn parse_name(&mut self) -> CoreResult<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(CoreError::bad_arg("expected a name in fragment"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn parse_element(&mut self) -> CoreResult<FragmentNode> {
        self.pos += 1; // consume '<'
        let name = self.parse_name()?;
        let mut attrs = Vec::new();

        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'/') => {
                    // self-closing
                    self.pos += 1;
                    if self.peek() != Some(b'>') {
                        return Err(CoreError::bad_arg("malformed self-closing tag"));
                    }
                    self.pos += 1;
                    return Ok(FragmentNode::Element {
                        name,
                        attrs,
                        children: Vec::new(),
                    });
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let attr_name = self.parse_name()?;
                    self.skip_ws();
                    let value = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_ws();
                        self.parse_attr_value()?
                    } else {
                        String::new()
                    };
                    attrs.push((attr_name, value));
                }
                None => return Err(CoreError::bad_arg("unterminated tag in fragment")),
            }
        }

        let children = self.parse_nodes(Some(&name))?;

        // closing tag
        if !self.starts_with("</") {
            return Err(CoreError::bad_arg("missing close tag in fragment"));
        }
        self.pos += 2;
        let close = self.parse_name()?;
        if close != name {
            return Err(CoreError::bad_arg(format!(
                "mismatched close tag: <{name}> closed by </{close}>"
            )));
        }
        self.skip_ws();
        if self.peek() != Some(b'>') {
            return Err(CoreError::bad_arg("malformed close tag"));
        }
        self.pos += 1;

        Ok(FragmentNode::Element {
            name,
            attrs,
            children,
        })
    }

    fn parse_attr_value(&mut self) -> CoreResult<String> {
        match self.peek() {
            Some(q @ (b'"' | b'\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != q) {
                    self.pos += 1;
                }
                if self.peek() != Some(q) {
                    return Err(CoreError::bad_arg("unterminated attribute value"));
                }
                let v = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                self.pos += 1;
                Ok(v)
            }
            _ => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| !c.is_ascii_whitespace() && c != b'>' && c != b'/')
                {
                    self.pos += 1;
                }
                Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_serialization() {
        let doc = EDocument::new();
        assert_eq!(doc.serialize(), "<html><head></head><body></body></html>");
    }

    #[test]
    fn test_append_and_serialize() {
        let mut doc = EDocument::new();
        let body = doc.body();
        let span = doc.append_element(body, "span").unwrap();
        doc.append_content(span, "0").unwrap();
        doc.set_attribute(span, "class", "n").unwrap();
        assert_eq!(
            doc.serialize(),
            "<html><head></head><body><span class=\"n\">0</span></body></html>"
        );
    }

    #[test]
    fn test_displace_content() {
        let mut doc = EDocument::new();
        let body = doc.body();
        doc.append_content(body, "before").unwrap();
        doc.displace_content(body, "after").unwrap();
        assert_eq!(doc.text_content(body), "after");
    }

    #[test]
    fn test_chunk_grafting() {
        let mut doc = EDocument::new();
        let body = doc.body();
        let grafted = doc
            .append_chunk(body, "<ul class=\"list\"><li>a</li><li>b</li></ul>tail")
            .unwrap();
        assert_eq!(grafted.len(), 2);
        assert_eq!(
            doc.serialize(),
            "<html><head></head><body><ul class=\"list\"><li>a</li><li>b</li></ul>tail</body></html>"
        );
    }

    #[test]
    fn test_set_chunk_replaces() {
        let mut doc = EDocument::new();
        let body = doc.body();
        doc.append_content(body, "old").unwrap();
        doc.set_chunk(body, "<p>new</p>").unwrap();
        assert_eq!(
            doc.serialize(),
            "<html><head></head><body><p>new</p></body></html>"
        );
    }

    #[test]
    fn test_bad_chunks_are_rejected() {
        let mut doc = EDocument::new();
        let body = doc.body();
        assert!(doc.append_chunk(body, "<p>unclosed").is_err());
        assert!(doc.append_chunk(body, "<a></b>").is_err());
    }

    #[test]
    fn test_text_escaping() {
        let mut doc = EDocument::new();
        let body = doc.body();
        doc.append_content(body, "a<b&c").unwrap();
        assert!(doc.serialize().contains("a&lt;b&amp;c"));
    }
}
