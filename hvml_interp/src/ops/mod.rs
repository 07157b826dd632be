//! Element operation tables.
//!
//! Every vDOM tag maps to an [`ElementOps`] vtable of four optional phase
//! callbacks. Handlers are plain functions over a [`StepCtx`] that
//! bundles the instance and the coroutine being advanced; per-tag state
//! lives in the frame's `ctxt` as a downcast-able box.
//!
//! Modules group tags by category, the way the dispatch layer groups
//! opcode handlers.

pub mod control;
pub mod data;
pub mod document;
pub mod flow;
pub mod invoke;
pub mod observe;

use crate::coroutine::Coroutine;
use crate::frame::Frame;
use crate::instance::Instance;
use crate::stack::Stack;
use crate::vcm;
use hvml_core::{CoreError, CoreResult, Variant};
use hvml_dom::{Tag, VElement, VNodeId, VPayload};
use std::rc::Rc;

/// `after_pushed`: build the per-tag context. Returning `false`
/// transitions straight to popping.
pub type AfterPushedFn = fn(&mut StepCtx) -> CoreResult<bool>;

/// `select_child`: advance the per-frame cursor; `None` transitions to
/// popping.
pub type SelectChildFn = fn(&mut StepCtx) -> CoreResult<Option<VNodeId>>;

/// `on_popping`: agree (`true`) or refuse (`false`, triggering `rerun`)
/// to pop.
pub type OnPoppingFn = fn(&mut StepCtx) -> CoreResult<bool>;

/// `rerun`: prepare the next round; transitions back to `select_child`.
pub type RerunFn = fn(&mut StepCtx) -> CoreResult<bool>;

/// One-shot transition override installed on a frame.
pub type PreemptorFn = fn(&mut StepCtx) -> CoreResult<()>;

/// The four-phase vtable of one tag.
#[derive(Clone, Copy, Default)]
pub struct ElementOps {
    /// Frame became current.
    pub after_pushed: Option<AfterPushedFn>,
    /// Advance the child cursor.
    pub select_child: Option<SelectChildFn>,
    /// May the frame pop?
    pub on_popping: Option<OnPoppingFn>,
    /// Prepare another round.
    pub rerun: Option<RerunFn>,
}

/// The ops for `tag` (`None` means a non-element frame).
#[must_use]
pub fn ops_for(tag: Option<Tag>) -> ElementOps {
    match tag {
        Some(Tag::Hvml) => document::HVML_OPS,
        Some(Tag::Head) => document::HEAD_OPS,
        Some(Tag::Body) => document::BODY_OPS,
        Some(Tag::Foreign) => document::FOREIGN_OPS,
        Some(Tag::Init) => data::INIT_OPS,
        Some(Tag::Bind) => data::BIND_OPS,
        Some(Tag::Archetype) => data::ARCHETYPE_OPS,
        Some(Tag::Iterate) => control::ITERATE_OPS,
        Some(Tag::Choose) => control::CHOOSE_OPS,
        Some(Tag::Reduce) => control::REDUCE_OPS,
        Some(Tag::Sort) => control::SORT_OPS,
        Some(Tag::Test) => control::TEST_OPS,
        Some(Tag::Match) => control::MATCH_OPS,
        Some(Tag::Differ) => control::DIFFER_OPS,
        Some(Tag::Observe) => observe::OBSERVE_OPS,
        Some(Tag::Forget) => observe::FORGET_OPS,
        Some(Tag::Catch) => flow::CATCH_OPS,
        Some(Tag::Except) => flow::EXCEPT_OPS,
        Some(Tag::Exit) => flow::EXIT_OPS,
        Some(Tag::Back) => flow::BACK_OPS,
        Some(Tag::Inherit) => flow::INHERIT_OPS,
        Some(Tag::Define) => invoke::DEFINE_OPS,
        Some(Tag::Call) => invoke::CALL_OPS,
        Some(Tag::Include) => invoke::INCLUDE_OPS,
        Some(Tag::Update) => invoke::UPDATE_OPS,
        Some(Tag::Load) => invoke::LOAD_OPS,
        None => ElementOps::default(),
    }
}

// =============================================================================
// Step Context
// =============================================================================

/// Everything a phase handler can touch.
pub struct StepCtx<'a> {
    /// The owning instance (runloop, renderer, requests).
    pub inst: &'a Rc<Instance>,
    /// The coroutine being advanced.
    pub co: &'a mut Coroutine,
}

impl StepCtx<'_> {
    /// The coroutine's stack.
    pub fn stack(&mut self) -> &mut Stack {
        &mut self.co.stack
    }

    /// The current (innermost) frame.
    pub fn frame(&mut self) -> CoreResult<&mut Frame> {
        self.co
            .stack
            .top_mut()
            .ok_or_else(|| CoreError::not_allowed("no current frame"))
    }

    /// The current frame's vDOM element, cloned out of the arena.
    pub fn element(&self) -> CoreResult<VElement> {
        let pos = self
            .co
            .stack
            .top()
            .and_then(|f| f.pos)
            .ok_or_else(|| CoreError::not_allowed("frame has no element"))?;
        self.co
            .stack
            .vdom
            .element(pos)
            .cloned()
            .ok_or_else(|| CoreError::invalid_value("frame position is not an element"))
    }

    /// The current frame's vDOM position.
    pub fn pos(&self) -> CoreResult<VNodeId> {
        self.co
            .stack
            .top()
            .and_then(|f| f.pos)
            .ok_or_else(|| CoreError::not_allowed("frame has no element"))
    }

    /// Downcast the current frame's per-tag context.
    pub fn ctxt_mut<T: 'static>(&mut self) -> CoreResult<&mut T> {
        self.frame()?
            .ctxt
            .as_mut()
            .and_then(|c| c.downcast_mut::<T>())
            .ok_or_else(|| CoreError::not_allowed("frame context has the wrong type"))
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Evaluate every attribute of the current element into the frame's
/// `attr_vars` object. Bare attributes evaluate to `true`.
pub(crate) fn eval_attr_vars(ctx: &mut StepCtx) -> CoreResult<()> {
    let element = ctx.element()?;
    let silently = ctx.co.stack.top().is_some_and(|f| f.silently);
    let vars = Variant::object();
    for attr in &element.attrs {
        let value = match &attr.value {
            Some(vcm) => vcm::eval(vcm, &ctx.co.stack, silently)?,
            None => Variant::boolean(true),
        };
        vars.object_set(&attr.name, value)?;
    }
    ctx.frame()?.attr_vars = Some(vars);
    Ok(())
}

/// The evaluated attribute `name` of the current frame, if present.
pub(crate) fn attr_of(ctx: &mut StepCtx, name: &str) -> Option<Variant> {
    ctx.co
        .stack
        .top()
        .and_then(|f| f.attr_vars.as_ref())
        .and_then(|vars| vars.object_get(name))
}

/// Whether the current element carries the bare attribute `name`.
pub(crate) fn has_attr(ctx: &mut StepCtx, name: &str) -> bool {
    attr_of(ctx, name).is_some()
}

/// What to do with inline content nodes while walking children.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentPolicy {
    /// Evaluate and append as output-DOM text.
    AppendToDom,
    /// Evaluate for effect; the result lands in the frame's `?`.
    Evaluate,
    /// Ignore.
    Skip,
}

/// Walk the vDOM children of the current element from `*cursor`, handling
/// comments and content per `policy`, and return the next element child.
///
/// While an exception is travelling, only `catch`/`except` children are
/// eligible; everything else is skipped.
pub(crate) fn advance_child(
    ctx: &mut StepCtx,
    cursor: &mut usize,
    policy: ContentPolicy,
) -> CoreResult<Option<VNodeId>> {
    let pos = ctx.pos()?;
    loop {
        let vdom = Rc::clone(&ctx.co.stack.vdom);
        let children = vdom.children(pos);
        let Some(&child) = children.get(*cursor) else {
            return Ok(None);
        };
        *cursor += 1;

        match vdom.payload(child) {
            VPayload::Comment(_) | VPayload::Document => {}
            VPayload::Content(vcm) => {
                if ctx.co.stack.exception.is_some() {
                    continue;
                }
                match policy {
                    ContentPolicy::Skip => {}
                    ContentPolicy::Evaluate => {
                        let silently = ctx.co.stack.top().is_some_and(|f| f.silently);
                        let value = vcm::eval(vcm, &ctx.co.stack, silently)?;
                        ctx.frame()?.set_question(value);
                    }
                    ContentPolicy::AppendToDom => {
                        let silently = ctx.co.stack.top().is_some_and(|f| f.silently);
                        let value = vcm::eval(vcm, &ctx.co.stack, silently)?;
                        let target = ctx
                            .co
                            .stack
                            .top()
                            .and_then(|f| f.edom_element)
                            .ok_or_else(|| {
                                CoreError::wrong_stage("content outside the document body")
                            })?;
                        let text = value.stringify();
                        crate::domutil::append_content(
                            &mut ctx.co.stack,
                            ctx.inst,
                            target,
                            &text,
                        )?;
                    }
                }
            }
            VPayload::Element(element) => {
                if ctx.co.stack.exception.is_some()
                    && !matches!(element.tag, Tag::Catch | Tag::Except)
                {
                    continue;
                }
                return Ok(Some(child));
            }
        }
    }
}
