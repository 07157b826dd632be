//! The polymorphic escape hatch: dynamic and native variants.
//!
//! A *dynamic* variant is a getter/setter pair; reading it through the
//! expression layer invokes the getter, assigning invokes the setter.
//!
//! A *native* variant wraps an opaque entity behind the [`NativeEntity`]
//! vtable. Per-property behavior is obtained from `property_getter` /
//! `property_setter`, which return bound method values. Observation
//! life-cycle is communicated through `on_observe` / `on_forget`, and
//! `on_release` fires when the last handle to the wrapping variant drops.

use crate::atom::Atom;
use crate::error::{CoreError, CoreResult};
use crate::variant::Variant;
use std::any::Any;
use std::rc::Rc;

/// A bound method on a dynamic or native variant.
///
/// Arguments are positional; the flag requests silent evaluation
/// (errors demoted, see the interpreter's `silently` frames).
pub type NativeMethod = Rc<dyn Fn(&[Variant], bool) -> CoreResult<Variant>>;

/// Vtable implemented by every native-variant entity.
///
/// All hooks have conservative defaults; a concrete entity overrides the
/// subset it supports.
pub trait NativeEntity {
    /// Concrete-type access for holders that know what they wrapped.
    fn as_any(&self) -> &dyn Any;

    /// A short diagnostic name for the entity kind.
    fn entity_name(&self) -> &'static str {
        "native"
    }

    /// The bound getter for `name`, if the entity exposes that property.
    fn property_getter(&self, _name: &str) -> Option<NativeMethod> {
        None
    }

    /// The bound setter for `name`, if the property is writable.
    fn property_setter(&self, _name: &str) -> Option<NativeMethod> {
        None
    }

    /// Clear the entity's content, returning the cleared value.
    fn cleaner(&self, _silently: bool) -> CoreResult<Variant> {
        Err(CoreError::not_implemented("native cleaner"))
    }

    /// Erase the entity entirely, returning what was erased.
    fn eraser(&self, _silently: bool) -> CoreResult<Variant> {
        Err(CoreError::not_implemented("native eraser"))
    }

    /// Replace the entity's content wholesale.
    fn updater(&self, _new_value: &Variant, _silently: bool) -> CoreResult<Variant> {
        Err(CoreError::not_implemented("native updater"))
    }

    /// An observer was registered for `(event, sub)`; called on the first
    /// registration of that pair.
    fn on_observe(&self, _event: Atom, _sub: Option<&str>) {}

    /// The last observer for `(event, sub)` was revoked.
    fn on_forget(&self, _event: Atom, _sub: Option<&str>) {}

    /// The last variant handle wrapping this entity dropped.
    fn on_release(&self) {}
}

/// Getter/setter pair backing a dynamic variant.
#[derive(Clone)]
pub struct DynamicVal {
    /// Invoked when the dynamic value is read.
    pub getter: Option<NativeMethod>,
    /// Invoked when the dynamic value is assigned.
    pub setter: Option<NativeMethod>,
}

impl DynamicVal {
    /// Read through the getter.
    pub fn get(&self, args: &[Variant], silently: bool) -> CoreResult<Variant> {
        match &self.getter {
            Some(g) => g(args, silently),
            None => Err(CoreError::not_allowed("dynamic value has no getter")),
        }
    }

    /// Write through the setter.
    pub fn set(&self, args: &[Variant], silently: bool) -> CoreResult<Variant> {
        match &self.setter {
            Some(s) => s(args, silently),
            None => Err(CoreError::not_allowed("dynamic value has no setter")),
        }
    }
}

/// Entity handle stored in a native variant.
#[derive(Clone)]
pub struct NativeVal {
    /// The wrapped entity.
    pub entity: Rc<dyn NativeEntity>,
}

impl NativeVal {
    /// Wrap an entity.
    pub fn new(entity: Rc<dyn NativeEntity>) -> Self {
        Self { entity }
    }
}
