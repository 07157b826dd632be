//! Execution frames and symbol variables.
//!
//! A frame is one node of a coroutine's execution stack: either `Normal`
//! (bound to a vDOM element) or `Pseudo` (synthetic, created by the
//! observer path). Each frame carries the eight punctuation-named symbol
//! variables in an inline array.
//!
//! Symbols start undefined and are per-frame: a child inherits none.
//! The expression layer resolves a symbol by walking frames from the
//! innermost outwards until it finds one where the symbol was explicitly
//! set, so `$%` inside an iterated subtree reads the iterating frame's
//! counter.

use crate::ops::ElementOps;
use hvml_core::Variant;
use hvml_dom::{ENodeId, SymbolName, VNodeId};
use std::any::Any;

/// Frame flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Executing a vDOM element.
    Normal,
    /// Synthetic frame running an observer handler.
    Pseudo,
}

/// The scheduler's per-frame cursor: which phase runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Run `after_pushed`.
    AfterPushed,
    /// Run `select_child`.
    SelectChild,
    /// Run `on_popping`.
    OnPopping,
    /// Run `rerun`.
    Rerun,
}

/// One execution frame.
pub struct Frame {
    /// Normal or pseudo.
    pub kind: FrameKind,
    /// Current vDOM element (`None` for pseudo frames).
    pub pos: Option<VNodeId>,
    /// vDOM node used for scoped-variable lookup.
    pub scope: Option<VNodeId>,
    /// Current output-DOM insertion point.
    pub edom_element: Option<ENodeId>,
    /// Per-tag context, downcast by the tag's ops.
    pub ctxt: Option<Box<dyn Any>>,
    /// Evaluated attribute values (object variant).
    pub attr_vars: Option<Variant>,
    /// Value returned by the most recent completed child frame.
    pub result_from_child: Option<Variant>,
    /// Value this frame delivers to its parent when it pops.
    pub result: Option<Variant>,
    /// The eight symbol variables.
    symbols: [Variant; SymbolName::COUNT],
    /// Which symbols were explicitly set (resolution stops here).
    touched: [bool; SymbolName::COUNT],
    /// Which phase runs next.
    pub next_step: NextStep,
    /// Errors in this frame are demoted to warnings.
    pub silently: bool,
    /// One-shot transition override; cleared before it runs.
    pub preemptor: Option<crate::ops::PreemptorFn>,
    /// The element's phase vtable.
    pub ops: ElementOps,
}

impl Frame {
    /// A fresh frame with all symbols undefined.
    #[must_use]
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            pos: None,
            scope: None,
            edom_element: None,
            ctxt: None,
            attr_vars: None,
            result_from_child: None,
            result: None,
            symbols: std::array::from_fn(|_| Variant::undefined()),
            touched: [false; SymbolName::COUNT],
            next_step: NextStep::AfterPushed,
            silently: false,
            preemptor: None,
            ops: ElementOps::default(),
        }
    }

    // =========================================================================
    // Symbol Variables
    // =========================================================================

    /// Set symbol `sym`, releasing the old value.
    pub fn set_symbol(&mut self, sym: SymbolName, value: Variant) {
        self.symbols[sym as usize] = value;
        self.touched[sym as usize] = true;
    }

    /// Read symbol `sym` of this frame (no outward walk).
    #[must_use]
    pub fn get_symbol(&self, sym: SymbolName) -> Variant {
        self.symbols[sym as usize].clone()
    }

    /// Whether `sym` was explicitly set on this frame.
    #[must_use]
    pub fn symbol_touched(&self, sym: SymbolName) -> bool {
        self.touched[sym as usize]
    }

    /// Initialize `%` to zero without marking it set; iterating tags mark
    /// it when they start counting.
    pub fn init_percent(&mut self) {
        self.symbols[SymbolName::Percent as usize] = Variant::ulongint(0);
    }

    /// Initialize `!` to a fresh scratch object.
    pub fn init_exclamation(&mut self) {
        self.symbols[SymbolName::Exclamation as usize] = Variant::object();
        self.touched[SymbolName::Exclamation as usize] = true;
    }

    /// Increment the `%` counter.
    pub fn inc_percent(&mut self) {
        let next = self
            .symbols[SymbolName::Percent as usize]
            .as_u64()
            .unwrap_or(0)
            + 1;
        self.set_symbol(SymbolName::Percent, Variant::ulongint(next));
    }

    /// Shorthand: this frame's `?` value.
    #[must_use]
    pub fn question(&self) -> Variant {
        self.get_symbol(SymbolName::Question)
    }

    /// Shorthand: set this frame's `?` value.
    pub fn set_question(&mut self, value: Variant) {
        self.set_symbol(SymbolName::Question, value);
    }

    /// Shorthand: set this frame's `<` input.
    pub fn set_input(&mut self, value: Variant) {
        self.set_symbol(SymbolName::LessThan, value);
    }

    /// A diagnostic label for traces and exception dumps.
    #[must_use]
    pub fn label(&self) -> String {
        match self.kind {
            FrameKind::Pseudo => "<pseudo>".to_owned(),
            FrameKind::Normal => match self.pos {
                Some(pos) => format!("<element #{pos:?}>"),
                None => "<detached>".to_owned(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_start_undefined() {
        let frame = Frame::new(FrameKind::Normal);
        for sym in SymbolName::all() {
            assert!(frame.get_symbol(sym).is_undefined());
            assert!(!frame.symbol_touched(sym));
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut frame = Frame::new(FrameKind::Normal);
        let v = Variant::string("payload");
        frame.set_symbol(SymbolName::Question, v.clone());
        assert_eq!(frame.get_symbol(SymbolName::Question), v);
        assert!(frame.symbol_touched(SymbolName::Question));
    }

    #[test]
    fn test_percent_counter() {
        let mut frame = Frame::new(FrameKind::Normal);
        frame.init_percent();
        assert_eq!(frame.get_symbol(SymbolName::Percent).as_u64(), Some(0));
        assert!(!frame.symbol_touched(SymbolName::Percent));
        frame.inc_percent();
        frame.inc_percent();
        assert_eq!(frame.get_symbol(SymbolName::Percent).as_u64(), Some(2));
        assert!(frame.symbol_touched(SymbolName::Percent));
    }
}
