//! # HVML Interpreter Core
//!
//! The execution engine: cooperative coroutines walking a vDOM with
//! four-phase frame transitions, building an output DOM, reacting to
//! messages, and driving a renderer.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         Instance (one per thread)               │
//! │  ┌──────────┐  ┌───────────────────────────────────────────┐   │
//! │  │ RunLoop  │  │                  Heap                      │   │
//! │  │ tasks    │  │  coroutines ──► Stack ──► frames           │   │
//! │  │ timers   │  │  request lists (mutex; cross-thread)       │   │
//! │  └──────────┘  │  results of terminated coroutines          │   │
//! │        ▲       └───────────────────────────────────────────┘   │
//! │        │ dispatch (any thread)                                  │
//! └────────┼────────────────────────────────────────────────────────┘
//!          │
//!   fetcher / requests / timer expiry
//! ```
//!
//! One scheduler sweep advances every ready coroutine by exactly one
//! frame-phase transition. Messages, timer expiries, and request
//! completions are runloop tasks that wake parked coroutines.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod coroutine;
pub mod domutil;
pub mod dvobjs;
pub mod exception;
pub mod frame;
pub mod heap;
pub mod instance;
pub mod observer;
pub mod ops;
pub mod rdr;
pub mod request;
pub mod runloop;
pub mod scheduler;
pub mod scope;
pub mod stack;
pub mod timer;
pub mod vcm;

pub use coroutine::{CoState, Coroutine, CoroutineId};
pub use exception::Exception;
pub use frame::{Frame, FrameKind, NextStep};
pub use instance::Instance;
pub use rdr::{LoopbackRenderer, RdrMessage, RendererEndpoint};
pub use stack::{Stack, StackStage};
