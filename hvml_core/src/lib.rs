//! # HVML Core
//!
//! Core types and primitives shared across the HVML runtime workspace.
//!
//! This crate provides the foundational building blocks the interpreter is
//! built on:
//!
//! - **Variant System**: reference-counted tagged dynamic values with
//!   post-mutation listeners and a polymorphic "native" escape hatch
//! - **Atoms**: interned names for O(1) equality on event and exception names
//! - **Error Handling**: result types and the unified error hierarchy
//!
//! Variants are single-threaded by design: every handle lives on the thread
//! that owns the interpreter heap. Only the atom interner is shared.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod atom;
pub mod error;
pub mod variant;

pub use atom::Atom;
pub use error::{CoreError, CoreResult, ErrorCode};
pub use variant::listener::{ListenerCallback, ListenerHandle};
pub use variant::native::{NativeEntity, NativeMethod};
pub use variant::{Variant, VariantKind};

/// HVML runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
