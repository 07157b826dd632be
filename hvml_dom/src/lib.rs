//! # HVML DOM
//!
//! The two document trees of the HVML runtime, plus the expression trees
//! that connect them:
//!
//! - **vDOM**: the immutable parse tree of an HVML document. The tokenizer
//!   and parser live outside this workspace; [`vdom::VdomBuilder`] stands in
//!   for them, producing the same tree shape.
//! - **Output DOM**: the mutable HTML-shaped tree a coroutine builds while
//!   executing, with an HTML serializer.
//! - **VCM trees**: value-construction expressions carried by vDOM
//!   attributes and content, evaluated by the interpreter.
//! - **Attribute operators**: the seven `=`-family operators applied when
//!   an evaluated attribute meets an existing value.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod attr;
pub mod edom;
pub mod tag;
pub mod vcm;
pub mod vdom;

pub use attr::AttrOp;
pub use edom::{EDocument, ENodeId};
pub use tag::Tag;
pub use vcm::{SymbolName, Vcm, VcmNode};
pub use vdom::{VAttr, VElement, VNodeId, VPayload, VdomBuilder, VdomDocument};
