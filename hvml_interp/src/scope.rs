//! Scoped variables: per-vDOM-node name bindings.
//!
//! Lookup of a name from a node walks the node's vDOM ancestor chain and
//! returns the first binding found. Document-level binds live on the vDOM
//! document node. Resolution is case-sensitive on the full name.

use hvml_core::Variant;
use hvml_dom::{VNodeId, VdomDocument};
use rustc_hash::FxHashMap;

/// All scoped-variable managers of one coroutine, keyed by vDOM node.
#[derive(Default)]
pub struct ScopedVariables {
    managers: FxHashMap<VNodeId, FxHashMap<String, Variant>>,
}

impl ScopedVariables {
    /// Bind `name` at `node`, replacing any previous binding there.
    pub fn bind(&mut self, node: VNodeId, name: &str, value: Variant) {
        self.managers
            .entry(node)
            .or_default()
            .insert(name.to_owned(), value);
    }

    /// Remove the binding of `name` at exactly `node`.
    pub fn unbind(&mut self, node: VNodeId, name: &str) -> Option<Variant> {
        self.managers.get_mut(&node).and_then(|m| m.remove(name))
    }

    /// Look up `name` from `node`, walking the ancestor chain. The handle
    /// is cloned out; the binding keeps its own reference.
    #[must_use]
    pub fn lookup(&self, doc: &VdomDocument, node: VNodeId, name: &str) -> Option<Variant> {
        doc.ancestors(node)
            .find_map(|n| self.managers.get(&n).and_then(|m| m.get(name)).cloned())
    }

    /// Look up `name` at exactly `node`.
    #[must_use]
    pub fn lookup_at(&self, node: VNodeId, name: &str) -> Option<Variant> {
        self.managers.get(&node).and_then(|m| m.get(name)).cloned()
    }

    /// Drop every binding (coroutine shutdown).
    pub fn clear(&mut self) {
        self.managers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvml_dom::VdomBuilder;

    #[test]
    fn test_lookup_walks_ancestors() {
        let doc = VdomBuilder::new()
            .open("hvml")
            .open("body")
            .open("span")
            .close()
            .close()
            .close()
            .finish();
        let hvml = doc.document_element().unwrap();
        let body = doc.children(hvml)[0];
        let span = doc.children(body)[0];

        let mut vars = ScopedVariables::default();
        vars.bind(hvml, "x", Variant::longint(1));
        vars.bind(body, "x", Variant::longint(2));

        // The nearest binding wins.
        assert_eq!(vars.lookup(&doc, span, "x").unwrap().as_i64(), Some(2));
        assert_eq!(vars.lookup(&doc, hvml, "x").unwrap().as_i64(), Some(1));
        assert!(vars.lookup(&doc, span, "y").is_none());

        // Case-sensitive, full-name resolution.
        assert!(vars.lookup(&doc, span, "X").is_none());
    }

    #[test]
    fn test_document_level_bind() {
        let doc = VdomBuilder::new().open("hvml").close().finish();
        let mut vars = ScopedVariables::default();
        vars.bind(doc.document_node(), "TIMERS", Variant::set_by_key(Some("id")));
        let hvml = doc.document_element().unwrap();
        assert!(vars.lookup(&doc, hvml, "TIMERS").is_some());
    }
}
