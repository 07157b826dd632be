//! Atom interning for O(1) name equality.
//!
//! Event names, exception names, and other hot identifiers are interned
//! into a process-wide table and handled as copyable `Atom` indices.
//! Comparing two atoms is an integer compare; resolving an atom back to
//! its text is a read-locked table lookup.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A handle to an interned string.
///
/// Atoms are cheap to copy and compare. Two atoms are equal if and only
/// if they were interned from the same text in the same bucket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

/// Interner buckets keep unrelated namespaces from colliding in lookups.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Bucket {
    /// Message/event type names (`grow`, `shrink`, `change`, `expired`, …).
    Event = 0,
    /// HVML exception names (`BadName`, `NoSuchKey`, …).
    Except = 1,
    /// Everything else (tag names, misc identifiers).
    Misc = 2,
}

const BUCKET_SHIFT: u32 = 24;
const INDEX_MASK: u32 = (1 << BUCKET_SHIFT) - 1;

struct AtomTable {
    by_text: FxHashMap<Arc<str>, u32>,
    texts: Vec<Arc<str>>,
}

impl AtomTable {
    fn new() -> Self {
        Self {
            by_text: FxHashMap::default(),
            texts: Vec::new(),
        }
    }
}

fn tables() -> &'static [RwLock<AtomTable>; 3] {
    static TABLES: OnceLock<[RwLock<AtomTable>; 3]> = OnceLock::new();
    TABLES.get_or_init(|| {
        [
            RwLock::new(AtomTable::new()),
            RwLock::new(AtomTable::new()),
            RwLock::new(AtomTable::new()),
        ]
    })
}

/// Intern `text` in `bucket`, returning its atom.
///
/// Interning the same text twice returns the same atom.
pub fn intern_in(bucket: Bucket, text: &str) -> Atom {
    let table = &tables()[bucket as usize];

    // Fast path: already interned.
    {
        let guard = table.read();
        if let Some(&idx) = guard.by_text.get(text) {
            return Atom(((bucket as u32) << BUCKET_SHIFT) | idx);
        }
    }

    let mut guard = table.write();
    // Re-check under the write lock: another thread may have won the race.
    if let Some(&idx) = guard.by_text.get(text) {
        return Atom(((bucket as u32) << BUCKET_SHIFT) | idx);
    }

    let idx = u32::try_from(guard.texts.len()).expect("atom table overflow");
    assert!(idx <= INDEX_MASK, "atom table overflow");
    let owned: Arc<str> = Arc::from(text);
    guard.texts.push(Arc::clone(&owned));
    guard.by_text.insert(owned, idx);
    Atom(((bucket as u32) << BUCKET_SHIFT) | idx)
}

/// Intern `text` in the [`Bucket::Misc`] bucket.
#[inline]
pub fn intern(text: &str) -> Atom {
    intern_in(Bucket::Misc, text)
}

/// Look up an atom that must already exist; returns `None` otherwise.
pub fn try_existing(bucket: Bucket, text: &str) -> Option<Atom> {
    let guard = tables()[bucket as usize].read();
    guard
        .by_text
        .get(text)
        .map(|&idx| Atom(((bucket as u32) << BUCKET_SHIFT) | idx))
}

impl Atom {
    /// The bucket this atom was interned in.
    #[inline]
    #[must_use]
    pub fn bucket(self) -> Bucket {
        match self.0 >> BUCKET_SHIFT {
            0 => Bucket::Event,
            1 => Bucket::Except,
            _ => Bucket::Misc,
        }
    }

    /// Resolve the atom back to its text.
    #[must_use]
    pub fn as_str(self) -> Arc<str> {
        let guard = tables()[(self.0 >> BUCKET_SHIFT).min(2) as usize].read();
        Arc::clone(&guard.texts[(self.0 & INDEX_MASK) as usize])
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.as_str())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

// =============================================================================
// Well-Known Atoms
// =============================================================================

/// Pre-defined event-type atoms.
pub mod events {
    use super::{intern_in, Atom, Bucket};

    /// Post-insert container event.
    pub fn grow() -> Atom {
        intern_in(Bucket::Event, "grow")
    }

    /// Post-remove container event.
    pub fn shrink() -> Atom {
        intern_in(Bucket::Event, "shrink")
    }

    /// Post-overwrite container event.
    pub fn change() -> Atom {
        intern_in(Bucket::Event, "change")
    }

    /// Timer expiry event.
    pub fn expired() -> Atom {
        intern_in(Bucket::Event, "expired")
    }
}

/// Pre-defined HVML exception-name atoms.
pub mod excepts {
    use super::{intern_in, Atom, Bucket};

    /// A name failed the identifier rules.
    pub fn bad_name() -> Atom {
        intern_in(Bucket::Except, "BadName")
    }

    /// A keyed lookup missed.
    pub fn no_such_key() -> Atom {
        intern_in(Bucket::Except, "NoSuchKey")
    }

    /// A host-language collaborator reported failure.
    pub fn external_failure() -> Atom {
        intern_in(Bucket::Except, "ExternalFailure")
    }

    /// A value had the wrong kind for the requested operation.
    pub fn wrong_data_type() -> Atom {
        intern_in(Bucket::Except, "WrongDataType")
    }

    /// A value was out of the accepted domain.
    pub fn invalid_value() -> Atom {
        intern_in(Bucket::Except, "InvalidValue")
    }

    /// Allocation failed.
    pub fn memory_failure() -> Atom {
        intern_in(Bucket::Except, "MemoryFailure")
    }

    /// The operation is not supported in the current document stage.
    pub fn wrong_stage() -> Atom {
        intern_in(Bucket::Except, "WrongStage")
    }

    /// The renderer rejected a request.
    pub fn server_refused() -> Atom {
        intern_in(Bucket::Except, "ServerRefused")
    }

    /// Intern an arbitrary exception name.
    pub fn named(name: &str) -> Atom {
        intern_in(Bucket::Except, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedup() {
        let a = intern("hello");
        let b = intern("hello");
        let c = intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(&*a.as_str(), "hello");
    }

    #[test]
    fn test_buckets_are_disjoint() {
        let e = intern_in(Bucket::Event, "same");
        let x = intern_in(Bucket::Except, "same");
        assert_ne!(e, x);
        assert_eq!(e.bucket(), Bucket::Event);
        assert_eq!(x.bucket(), Bucket::Except);
    }

    #[test]
    fn test_try_existing() {
        let a = events::expired();
        assert_eq!(try_existing(Bucket::Event, "expired"), Some(a));
        assert_eq!(try_existing(Bucket::Event, "never-interned-xyzzy"), None);
    }
}
