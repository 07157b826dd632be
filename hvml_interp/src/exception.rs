//! The coroutine exception slot.
//!
//! Leaf operations return `Result`; the scheduler moves an `Err` crossing
//! a step boundary into the current coroutine's exception slot, where it
//! travels with the coroutine until a `catch` consumes it or termination
//! dumps it.

use hvml_core::{Atom, CoreError, ErrorCode, Variant};
use std::fmt;

/// A captured HVML exception.
#[derive(Debug, Clone)]
pub struct Exception {
    /// The abstract error tag.
    pub code: ErrorCode,
    /// The interned exception name (`BadName`, `NoSuchKey`, …).
    pub atom: Atom,
    /// Optional exception payload.
    pub info: Option<Variant>,
    /// Human-readable description captured at the raise site.
    pub message: String,
    /// Frame positions (innermost first) at capture time.
    pub frame_trace: Vec<String>,
}

impl Exception {
    /// Capture `err` with the given frame trace.
    #[must_use]
    pub fn capture(err: &CoreError, frame_trace: Vec<String>) -> Self {
        Self {
            code: err.code(),
            atom: err.except_atom(),
            info: err.exinfo().cloned(),
            message: err.to_string(),
            frame_trace,
        }
    }

    /// Whether this exception's name equals `atom`.
    #[must_use]
    pub fn is_named(&self, atom: Atom) -> bool {
        self.atom == atom
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.atom, self.message)?;
        for (i, pos) in self.frame_trace.iter().enumerate() {
            write!(f, "\n  #{i} {pos}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvml_core::atom::excepts;

    #[test]
    fn test_capture_maps_atom() {
        let err = CoreError::not_exists("title");
        let exc = Exception::capture(&err, vec!["<init>".into()]);
        assert_eq!(exc.code, ErrorCode::NotExists);
        assert!(exc.is_named(excepts::no_such_key()));
        assert!(exc.to_string().contains("<init>"));
    }
}
