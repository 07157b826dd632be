//! The per-coroutine execution stack.
//!
//! The stack owns the frame list, the output document being built, the
//! scoped-variable managers, the observer lists, and the exception slot.
//! It also tracks the vDOM insertion mode and the document stage
//! (first round vs. event loop).

use crate::exception::Exception;
use crate::frame::{Frame, FrameKind, NextStep};
use crate::observer::ObserverLists;
use crate::ops;
use crate::runloop::TimerId;
use crate::scope::ScopedVariables;
use crate::timer::DocTimers;
use hvml_core::Variant;
use hvml_dom::{EDocument, SymbolName, VdomDocument, VNodeId};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Where the walker currently is relative to the document skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMode {
    /// Before the `<hvml>` element.
    BeforeHvml,
    /// Inside `<hvml>`, before `<head>`.
    InHvml,
    /// Inside `<head>`.
    InHead,
    /// Between `<head>` and `<body>`.
    AfterHead,
    /// Inside `<body>`.
    InBody,
    /// After `<body>`.
    AfterBody,
    /// After `</hvml>`.
    AfterHvml,
}

/// Document stage: the first full walk, then the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStage {
    /// The initial walk of the document tree.
    FirstRound,
    /// Parked/reacting; frames exist only while handling messages.
    EventLoop,
}

/// A pending non-local unwind.
pub enum BackAnchor {
    /// `<exit with …>`: unwind everything, terminate with the value.
    Exit(Variant),
    /// `<back>`: unwind to the frame at `depth`, delivering `with`.
    ToFrame {
        /// Target depth (index into the frame list).
        depth: usize,
        /// Value delivered to the target's `?`.
        with: Option<Variant>,
    },
}

/// The per-coroutine execution stack.
pub struct Stack {
    /// The immutable document being interpreted.
    pub vdom: Rc<VdomDocument>,
    /// The output document being built.
    pub doc: Rc<RefCell<EDocument>>,
    frames: Vec<Frame>,
    /// Insertion mode.
    pub mode: StackMode,
    /// First round or event loop.
    pub stage: StackStage,
    /// The coroutine finished its last round and may not run again.
    pub exited: bool,
    /// The travelling exception, if any.
    pub exception: Option<Exception>,
    /// Scoped variables keyed by vDOM node.
    pub scoped: ScopedVariables,
    /// Host-loaded variable bundles, released with the coroutine.
    pub loaded_vars: FxHashMap<String, Variant>,
    /// Observer records, one list per observed-variant kind.
    pub observers: ObserverLists,
    /// Ids of in-flight async requests (array variant).
    pub async_request_ids: Variant,
    /// The `$TIMERS` machinery, once initialized.
    pub doc_timers: Option<DocTimers>,
    /// The shared expression-observer tick timer.
    pub event_timer: Option<TimerId>,
    /// Pending non-local unwind, consumed by the scheduler.
    pub back_anchor: Option<BackAnchor>,
    /// The coroutine's final value.
    pub co_result: Option<Variant>,
    /// Renderer page handle after a successful attach.
    pub rdr_page: Option<u64>,
    /// Suppress renderer messages (rebuild mode).
    pub rebuild_without_renderer: bool,
}

impl Stack {
    /// A fresh stack over `vdom` with an empty output skeleton.
    #[must_use]
    pub fn new(vdom: Rc<VdomDocument>) -> Self {
        Self {
            vdom,
            doc: Rc::new(RefCell::new(EDocument::new())),
            frames: Vec::new(),
            mode: StackMode::BeforeHvml,
            stage: StackStage::FirstRound,
            exited: false,
            exception: None,
            scoped: ScopedVariables::default(),
            loaded_vars: FxHashMap::default(),
            observers: ObserverLists::default(),
            async_request_ids: Variant::array(),
            doc_timers: None,
            event_timer: None,
            back_anchor: None,
            co_result: None,
            rdr_page: None,
            rebuild_without_renderer: false,
        }
    }

    // =========================================================================
    // Frame Access
    // =========================================================================

    /// Number of live frames.
    #[must_use]
    pub fn nr_frames(&self) -> usize {
        self.frames.len()
    }

    /// The innermost frame.
    #[must_use]
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// The innermost frame, mutably.
    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// The parent of the innermost frame.
    #[must_use]
    pub fn parent(&self) -> Option<&Frame> {
        let n = self.frames.len();
        if n >= 2 {
            self.frames.get(n - 2)
        } else {
            None
        }
    }

    /// The parent of the innermost frame, mutably.
    pub fn parent_mut(&mut self) -> Option<&mut Frame> {
        let n = self.frames.len();
        if n >= 2 {
            self.frames.get_mut(n - 2)
        } else {
            None
        }
    }

    /// The frame at `depth` (0 is outermost).
    #[must_use]
    pub fn frame_at(&self, depth: usize) -> Option<&Frame> {
        self.frames.get(depth)
    }

    /// The frame at `depth`, mutably.
    pub fn frame_at_mut(&mut self, depth: usize) -> Option<&mut Frame> {
        self.frames.get_mut(depth)
    }

    /// Frames from innermost to outermost.
    pub fn frames_inward(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }

    // =========================================================================
    // Push / Pop
    // =========================================================================

    /// Push a `Normal` frame for `element`, inheriting the insertion point
    /// from the current top and initializing `%`, `@`, and `!`.
    pub fn push_frame_for(&mut self, element: VNodeId, silently: bool) {
        let parent_edom = self.top().and_then(|f| f.edom_element);
        let parent_silently = self.top().is_some_and(|f| f.silently);

        let mut frame = Frame::new(FrameKind::Normal);
        frame.pos = Some(element);
        frame.scope = Some(element);
        frame.edom_element = parent_edom;
        frame.silently = silently || parent_silently;
        frame.ops = ops::ops_for(self.vdom.element(element).map(|e| e.tag));
        frame.next_step = NextStep::AfterPushed;

        frame.init_percent();
        frame.init_exclamation();
        if let Some(at) = parent_edom {
            frame.set_symbol(SymbolName::At, crate::domutil::make_elements(&self.doc, at));
        }

        self.frames.push(frame);
    }

    /// Push a pseudo frame (observer handler bootstrap); symbols stay
    /// undefined.
    pub fn push_pseudo_frame(&mut self) {
        self.frames.push(Frame::new(FrameKind::Pseudo));
    }

    /// Pop the innermost frame, delivering its result to the parent's `?`
    /// (or to the coroutine result when it is the last frame).
    ///
    /// A frame that produced nothing (no explicit result, `?` never set)
    /// leaves the parent's `?` alone, so a skipped arm does not clobber
    /// the value its siblings are examining.
    pub fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let produced = frame.result.is_some() || frame.symbol_touched(SymbolName::Question);
        if !produced {
            return;
        }
        let result = frame
            .result
            .clone()
            .unwrap_or_else(|| frame.question());
        match self.frames.last_mut() {
            Some(parent) => {
                parent.set_question(result.clone());
                parent.result_from_child = Some(result);
            }
            None => {
                if self.co_result.is_none() {
                    self.co_result = Some(result);
                }
            }
        }
    }

    /// Pop frames without running phases until `depth` frames remain.
    pub fn unwind_to(&mut self, depth: usize) {
        while self.frames.len() > depth {
            self.frames.pop();
        }
    }

    /// Recompute the top frame's `@` from its current insertion point.
    pub fn refresh_at(&mut self) {
        let Some(edom) = self.top().and_then(|f| f.edom_element) else {
            return;
        };
        let at = crate::domutil::make_elements(&self.doc, edom);
        if let Some(frame) = self.top_mut() {
            frame.set_symbol(SymbolName::At, at);
        }
    }

    // =========================================================================
    // Symbol Resolution
    // =========================================================================

    /// Resolve a symbol variable by walking frames innermost-outwards to
    /// the nearest frame where it was explicitly set.
    #[must_use]
    pub fn resolve_symbol(&self, sym: SymbolName) -> Variant {
        for frame in self.frames.iter().rev() {
            if frame.symbol_touched(sym) {
                return frame.get_symbol(sym);
            }
        }
        Variant::undefined()
    }

    /// Resolve a named variable from the top frame's scope, walking the
    /// vDOM ancestor chain (document binds included).
    #[must_use]
    pub fn resolve_named(&self, name: &str) -> Option<Variant> {
        let from = self
            .top()
            .and_then(|f| f.scope.or(f.pos))
            .or_else(|| self.vdom.document_element())?;
        self.scoped.lookup(&self.vdom, from, name)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Frame labels, innermost first, for exception capture.
    #[must_use]
    pub fn frame_trace(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|f| match (f.kind, f.pos) {
                (FrameKind::Pseudo, _) => "<pseudo>".to_owned(),
                (_, Some(pos)) => match self.vdom.element(pos) {
                    Some(e) => format!("<{}>", e.name),
                    None => f.label(),
                },
                _ => f.label(),
            })
            .collect()
    }

    /// Move `err` into the exception slot, capturing the frame trace.
    pub fn capture_exception(&mut self, err: &hvml_core::CoreError) {
        let trace = self.frame_trace();
        self.exception = Some(Exception::capture(err, trace));
    }
}
