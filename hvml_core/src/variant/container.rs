//! Container mutators and their post-mutation events.
//!
//! Every structural mutation first completes the change, then fires the
//! matching post-listeners on the mutating thread:
//!
//! | Event | Arguments |
//! |-------|-----------|
//! | `grow` | `[key-new, value-new]` (sets: `[element]`) |
//! | `change` | `[key-new, value-new, key-old, value-old]` (sets: `[element-new, element-old]`) |
//! | `shrink` | `[key-old, value-old]` (sets: `[element]`) |
//!
//! Callbacks run after the `RefCell` borrow is released, so a listener may
//! re-enter the same variant; it must not drop the variant it is being
//! called on below one reference.

use crate::atom::events;
use crate::error::{CoreError, CoreResult};
use crate::variant::{Variant, VariantData};

impl Variant {
    // =========================================================================
    // Object
    // =========================================================================

    /// Insert or overwrite `key`. Fires `grow` on insert, `change` on
    /// overwrite.
    pub fn object_set(&self, key: &str, value: Variant) -> CoreResult<()> {
        let old = {
            let mut data = self.cell.data.borrow_mut();
            let VariantData::Object(map) = &mut *data else {
                return Err(CoreError::invalid_value("object_set on non-object"));
            };
            map.insert(key.to_owned(), value.clone())
        };
        self.bump_generation();

        let key_var = Variant::string(key);
        match old {
            None => self.fire_event(events::grow(), &[key_var, value]),
            Some(old_value) => self.fire_event(
                events::change(),
                &[key_var.clone(), value, key_var, old_value],
            ),
        }
        Ok(())
    }

    /// Look up `key`, silently: a miss is `None`, not an error.
    #[must_use]
    pub fn object_get(&self, key: &str) -> Option<Variant> {
        match &*self.cell.data.borrow() {
            VariantData::Object(map) => map.get(key).cloned(),
            _ => None,
        }
    }

    /// Look up `key`; a miss is a `NotExists` error.
    pub fn object_get_req(&self, key: &str) -> CoreResult<Variant> {
        match &*self.cell.data.borrow() {
            VariantData::Object(map) => map
                .get(key)
                .cloned()
                .ok_or_else(|| CoreError::not_exists(key)),
            _ => Err(CoreError::invalid_value("object_get on non-object")),
        }
    }

    /// Remove `key`, firing `shrink`. A miss is a `NotExists` error.
    pub fn object_remove(&self, key: &str) -> CoreResult<Variant> {
        let removed = {
            let mut data = self.cell.data.borrow_mut();
            let VariantData::Object(map) = &mut *data else {
                return Err(CoreError::invalid_value("object_remove on non-object"));
            };
            map.shift_remove(key)
        };
        let Some(old_value) = removed else {
            return Err(CoreError::not_exists(key));
        };
        self.bump_generation();
        self.fire_event(
            events::shrink(),
            &[Variant::string(key), old_value.clone()],
        );
        Ok(old_value)
    }

    /// Whether the object holds `key`.
    #[must_use]
    pub fn object_has(&self, key: &str) -> bool {
        match &*self.cell.data.borrow() {
            VariantData::Object(map) => map.contains_key(key),
            _ => false,
        }
    }

    /// Snapshot of the keys, in insertion order.
    #[must_use]
    pub fn object_keys(&self) -> Vec<String> {
        match &*self.cell.data.borrow() {
            VariantData::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Snapshot of `(key, value)` pairs, in insertion order.
    #[must_use]
    pub fn object_entries(&self) -> Vec<(String, Variant)> {
        match &*self.cell.data.borrow() {
            VariantData::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }

    // =========================================================================
    // Array
    // =========================================================================

    /// Append `value`, firing `grow` with the new index.
    pub fn array_append(&self, value: Variant) -> CoreResult<()> {
        let index = {
            let mut data = self.cell.data.borrow_mut();
            let VariantData::Array(items) = &mut *data else {
                return Err(CoreError::invalid_value("array_append on non-array"));
            };
            items.push(value.clone());
            items.len() - 1
        };
        self.bump_generation();
        self.fire_event(events::grow(), &[Variant::ulongint(index as u64), value]);
        Ok(())
    }

    /// Insert `value` at `index`, firing `grow`.
    pub fn array_insert(&self, index: usize, value: Variant) -> CoreResult<()> {
        {
            let mut data = self.cell.data.borrow_mut();
            let VariantData::Array(items) = &mut *data else {
                return Err(CoreError::invalid_value("array_insert on non-array"));
            };
            if index > items.len() {
                return Err(CoreError::bad_arg("array index out of range"));
            }
            items.insert(index, value.clone());
        }
        self.bump_generation();
        self.fire_event(events::grow(), &[Variant::ulongint(index as u64), value]);
        Ok(())
    }

    /// Overwrite the element at `index`, firing `change`.
    pub fn array_set(&self, index: usize, value: Variant) -> CoreResult<()> {
        let old = {
            let mut data = self.cell.data.borrow_mut();
            let VariantData::Array(items) = &mut *data else {
                return Err(CoreError::invalid_value("array_set on non-array"));
            };
            let slot = items
                .get_mut(index)
                .ok_or_else(|| CoreError::bad_arg("array index out of range"))?;
            std::mem::replace(slot, value.clone())
        };
        self.bump_generation();
        let idx = Variant::ulongint(index as u64);
        self.fire_event(events::change(), &[idx.clone(), value, idx, old]);
        Ok(())
    }

    /// Remove the element at `index`, firing `shrink`.
    pub fn array_remove(&self, index: usize) -> CoreResult<Variant> {
        let old = {
            let mut data = self.cell.data.borrow_mut();
            let VariantData::Array(items) = &mut *data else {
                return Err(CoreError::invalid_value("array_remove on non-array"));
            };
            if index >= items.len() {
                return Err(CoreError::bad_arg("array index out of range"));
            }
            items.remove(index)
        };
        self.bump_generation();
        self.fire_event(
            events::shrink(),
            &[Variant::ulongint(index as u64), old.clone()],
        );
        Ok(old)
    }

    /// The element at `index` of an array.
    #[must_use]
    pub fn array_get(&self, index: usize) -> Option<Variant> {
        match &*self.cell.data.borrow() {
            VariantData::Array(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// The array length; zero for non-arrays.
    #[must_use]
    pub fn array_len(&self) -> usize {
        match &*self.cell.data.borrow() {
            VariantData::Array(items) => items.len(),
            _ => 0,
        }
    }

    /// A shallow clone: a fresh container holding the same element handles.
    pub fn container_clone(&self) -> CoreResult<Variant> {
        match &*self.cell.data.borrow() {
            VariantData::Array(items) => Ok(Variant::array_with(items.iter().cloned())),
            VariantData::Object(map) => Ok(Variant::object_with(
                map.iter().map(|(k, v)| (k.as_str(), v.clone())),
            )),
            VariantData::Set { key_field, elems } => {
                let clone = Variant::set_by_key(key_field.as_deref());
                for e in elems {
                    clone.set_add(e.clone())?;
                }
                Ok(clone)
            }
            _ => Err(CoreError::invalid_value("container_clone on non-container")),
        }
    }

    // =========================================================================
    // Set
    // =========================================================================

    fn set_key_of(&self, elem: &Variant) -> String {
        let key_field = match &*self.cell.data.borrow() {
            VariantData::Set { key_field, .. } => key_field.clone(),
            _ => None,
        };
        match key_field {
            Some(field) => elem
                .object_get(&field)
                .map(|v| v.stringify())
                .unwrap_or_default(),
            None => elem.serialize(),
        }
    }

    /// Add `elem`. A colliding unique key overwrites the existing element
    /// and fires `change`; otherwise fires `grow`. Returns whether the set
    /// grew.
    pub fn set_add(&self, elem: Variant) -> CoreResult<bool> {
        if !matches!(&*self.cell.data.borrow(), VariantData::Set { .. }) {
            return Err(CoreError::invalid_value("set_add on non-set"));
        }
        let key = self.set_key_of(&elem);
        let replaced = {
            let mut data = self.cell.data.borrow_mut();
            let VariantData::Set { key_field, elems } = &mut *data else {
                unreachable!()
            };
            let existing = elems.iter().position(|e| {
                let field = key_field.as_deref();
                let ekey = match field {
                    Some(f) => e.object_get(f).map(|v| v.stringify()).unwrap_or_default(),
                    None => e.serialize(),
                };
                ekey == key
            });
            match existing {
                Some(idx) => Some(std::mem::replace(&mut elems[idx], elem.clone())),
                None => {
                    elems.push(elem.clone());
                    None
                }
            }
        };
        self.bump_generation();
        match replaced {
            Some(old) => {
                self.fire_event(events::change(), &[elem, old]);
                Ok(false)
            }
            None => {
                self.fire_event(events::grow(), &[elem]);
                Ok(true)
            }
        }
    }

    /// Remove the element whose unique key equals `key`, firing `shrink`.
    pub fn set_remove_by_key(&self, key: &str) -> CoreResult<Variant> {
        let removed = {
            let mut data = self.cell.data.borrow_mut();
            let VariantData::Set { key_field, elems } = &mut *data else {
                return Err(CoreError::invalid_value("set_remove on non-set"));
            };
            let field = key_field.clone();
            let pos = elems.iter().position(|e| {
                let ekey = match field.as_deref() {
                    Some(f) => e.object_get(f).map(|v| v.stringify()).unwrap_or_default(),
                    None => e.serialize(),
                };
                ekey == key
            });
            pos.map(|idx| elems.remove(idx))
        };
        let Some(old) = removed else {
            return Err(CoreError::not_exists(key));
        };
        self.bump_generation();
        self.fire_event(events::shrink(), &[old.clone()]);
        Ok(old)
    }

    /// Find the element whose unique key equals `key`.
    #[must_use]
    pub fn set_find(&self, key: &str) -> Option<Variant> {
        let (field, elems) = match &*self.cell.data.borrow() {
            VariantData::Set { key_field, elems } => (key_field.clone(), elems.clone()),
            _ => return None,
        };
        elems.into_iter().find(|e| {
            let ekey = match field.as_deref() {
                Some(f) => e.object_get(f).map(|v| v.stringify()).unwrap_or_default(),
                None => e.serialize(),
            };
            ekey == key
        })
    }

    /// The set size; zero for non-sets.
    #[must_use]
    pub fn set_len(&self) -> usize {
        match &*self.cell.data.borrow() {
            VariantData::Set { elems, .. } => elems.len(),
            _ => 0,
        }
    }

    /// The `i`-th set element, in insertion order.
    #[must_use]
    pub fn set_get(&self, index: usize) -> Option<Variant> {
        match &*self.cell.data.borrow() {
            VariantData::Set { elems, .. } => elems.get(index).cloned(),
            _ => None,
        }
    }

    // =========================================================================
    // Tuple
    // =========================================================================

    /// The `i`-th tuple member.
    #[must_use]
    pub fn tuple_get(&self, index: usize) -> Option<Variant> {
        match &*self.cell.data.borrow() {
            VariantData::Tuple(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// The tuple arity; zero for non-tuples.
    #[must_use]
    pub fn tuple_len(&self) -> usize {
        match &*self.cell.data.borrow() {
            VariantData::Tuple(items) => items.len(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::events;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn record_events(v: &Variant) -> Rc<RefCell<Vec<(String, usize)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for ev in [events::grow(), events::shrink(), events::change()] {
            let log = Rc::clone(&log);
            v.register_post_listener(
                ev,
                Rc::new(move |_src, event, args| {
                    log.borrow_mut().push((event.to_string(), args.len()));
                    true
                }),
            );
        }
        log
    }

    #[test]
    fn test_object_set_get_roundtrip() {
        let obj = Variant::object();
        let val = Variant::string("v");
        obj.object_set("k", val.clone()).unwrap();
        assert_eq!(obj.object_get("k").unwrap(), val);
        assert!(obj.object_get("missing").is_none());
        assert!(matches!(
            obj.object_get_req("missing"),
            Err(CoreError::NotExists { .. })
        ));
    }

    #[test]
    fn test_object_events() {
        let obj = Variant::object();
        let log = record_events(&obj);

        obj.object_set("a", Variant::longint(1)).unwrap();
        obj.object_set("a", Variant::longint(2)).unwrap();
        obj.object_remove("a").unwrap();

        let log = log.borrow();
        assert_eq!(
            &*log,
            &[
                ("grow".to_string(), 2),
                ("change".to_string(), 4),
                ("shrink".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_listener_fires_after_mutation() {
        let obj = Variant::object();
        let seen = Rc::new(RefCell::new(None));
        {
            let seen = Rc::clone(&seen);
            obj.register_post_listener(
                events::grow(),
                Rc::new(move |src, _ev, _args| {
                    // Post-listener: the mutation is already visible.
                    *seen.borrow_mut() = src.object_get("k");
                    true
                }),
            );
        }
        obj.object_set("k", Variant::longint(9)).unwrap();
        assert_eq!(seen.borrow().as_ref().unwrap().as_i64(), Some(9));
    }

    #[test]
    fn test_revoked_listener_never_fires() {
        let arr = Variant::array();
        let count = Rc::new(RefCell::new(0));
        let handle = {
            let count = Rc::clone(&count);
            arr.register_post_listener(
                events::grow(),
                Rc::new(move |_, _, _| {
                    *count.borrow_mut() += 1;
                    true
                }),
            )
        };
        arr.array_append(Variant::null()).unwrap();
        assert!(arr.revoke_listener(handle));
        assert!(!arr.revoke_listener(handle));
        arr.array_append(Variant::null()).unwrap();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_listener_may_revoke_itself_mid_fire() {
        let arr = Variant::array();
        let fired = Rc::new(RefCell::new(0));
        let slot: Rc<RefCell<Option<crate::ListenerHandle>>> = Rc::new(RefCell::new(None));
        let handle = {
            let fired = Rc::clone(&fired);
            let slot = Rc::clone(&slot);
            arr.register_post_listener(
                events::grow(),
                Rc::new(move |src, _, _| {
                    *fired.borrow_mut() += 1;
                    if let Some(h) = slot.borrow_mut().take() {
                        src.revoke_listener(h);
                    }
                    true
                }),
            )
        };
        *slot.borrow_mut() = Some(handle);
        arr.array_append(Variant::null()).unwrap();
        arr.array_append(Variant::null()).unwrap();
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn test_set_unique_by_key_overwrites() {
        let set = Variant::set_by_key(Some("id"));
        let log = record_events(&set);

        let a = Variant::object_with([("id", Variant::string("t")), ("n", Variant::longint(1))]);
        let b = Variant::object_with([("id", Variant::string("t")), ("n", Variant::longint(2))]);
        assert!(set.set_add(a).unwrap());
        assert!(!set.set_add(b).unwrap());
        assert_eq!(set.set_len(), 1);
        assert_eq!(
            set.set_find("t").unwrap().object_get("n").unwrap().as_i64(),
            Some(2)
        );

        let log = log.borrow();
        assert_eq!(log[0].0, "grow");
        assert_eq!(log[1].0, "change");
    }

    #[test]
    fn test_array_snapshot_iteration_under_mutation() {
        let arr = Variant::array_with([
            Variant::longint(0),
            Variant::longint(1),
            Variant::longint(2),
        ]);
        let size_at_call = arr.array_len();
        let mut seen = Vec::new();
        for i in 0..size_at_call {
            if let Some(v) = arr.array_get(i) {
                seen.push(v.as_i64().unwrap());
            }
            if i == 0 {
                arr.array_append(Variant::longint(99)).unwrap();
            }
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(arr.array_len(), 4);
    }
}
