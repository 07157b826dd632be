//! Error types and result definitions for the HVML runtime.
//!
//! Two layers of failure coexist in the interpreter:
//!
//! - **Runtime errors** (`CoreError` with an [`ErrorCode`]): wrong kind for
//!   an operation, missing key, refused renderer request, and so on.
//! - **HVML exceptions**: language-level exceptions identified by interned
//!   atoms (`BadName`, `NoSuchKey`, …) that travel with a coroutine until a
//!   `catch` consumes them.
//!
//! Every runtime error maps onto an exception atom via
//! [`CoreError::except_atom`], so the interpreter can treat both uniformly
//! once an error crosses a scheduler step boundary.

use crate::atom::{excepts, Atom};
use crate::variant::Variant;
use std::fmt;
use thiserror::Error;

/// The unified result type used throughout the runtime.
pub type CoreResult<T> = Result<T, CoreError>;

/// Abstract error tags, mirrored in diagnostics and renderer responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Allocation or resource exhaustion.
    OutOfMemory,
    /// A value had the wrong kind for the requested operation.
    InvalidValue,
    /// An argument failed validation.
    BadArg,
    /// A keyed or named lookup missed.
    NotExists,
    /// The operation is forbidden on this target.
    NotAllowed,
    /// The operation is recognized but unimplemented.
    NotImplemented,
    /// The operation is not valid in the current document stage.
    WrongStage,
    /// The renderer answered with a non-success status.
    ServerRefused,
    /// A host-language collaborator reported failure.
    ExternalFailure,
    /// An HVML-level exception raised by the document itself.
    Raised,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OutOfMemory => "OutOfMemory",
            Self::InvalidValue => "InvalidValue",
            Self::BadArg => "BadArg",
            Self::NotExists => "NotExists",
            Self::NotAllowed => "NotAllowed",
            Self::NotImplemented => "NotImplemented",
            Self::WrongStage => "WrongStage",
            Self::ServerRefused => "ServerRefused",
            Self::ExternalFailure => "ExternalFailure",
            Self::Raised => "Raised",
        };
        f.write_str(s)
    }
}

/// Comprehensive error type covering all runtime error conditions.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Allocation or resource exhaustion.
    #[error("OutOfMemory: {message}")]
    OutOfMemory {
        /// Error description.
        message: String,
    },

    /// Wrong kind for the requested operation.
    #[error("InvalidValue: {message}")]
    InvalidValue {
        /// Error description.
        message: String,
    },

    /// An argument failed validation.
    #[error("BadArg: {message}")]
    BadArg {
        /// Error description.
        message: String,
    },

    /// A keyed or named lookup missed.
    #[error("NotExists: no such key '{name}'")]
    NotExists {
        /// The missing key or name.
        name: String,
    },

    /// The operation is forbidden on this target.
    #[error("NotAllowed: {message}")]
    NotAllowed {
        /// Error description.
        message: String,
    },

    /// Recognized but unimplemented.
    #[error("NotImplemented: {what}")]
    NotImplemented {
        /// The unimplemented operation.
        what: String,
    },

    /// Not valid in the current document stage.
    #[error("WrongStage: {message}")]
    WrongStage {
        /// Error description.
        message: String,
    },

    /// The renderer answered with a non-success status.
    #[error("ServerRefused: {operation} (retCode {ret_code})")]
    ServerRefused {
        /// The refused renderer operation.
        operation: String,
        /// The status the renderer answered with.
        ret_code: u16,
    },

    /// A host-language collaborator reported failure.
    #[error("ExternalFailure: {message}")]
    ExternalFailure {
        /// Error description.
        message: String,
    },

    /// An HVML-level exception raised by the document.
    #[error("{name}")]
    Raised {
        /// The interned exception name.
        name: Atom,
        /// Optional exception payload.
        info: Option<Variant>,
    },
}

impl CoreError {
    // =========================================================================
    // Convenience Constructors
    // =========================================================================

    /// Wrong kind for the requested operation.
    #[inline]
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// An argument failed validation.
    #[inline]
    pub fn bad_arg(message: impl Into<String>) -> Self {
        Self::BadArg {
            message: message.into(),
        }
    }

    /// A keyed or named lookup missed.
    #[inline]
    pub fn not_exists(name: impl Into<String>) -> Self {
        Self::NotExists { name: name.into() }
    }

    /// The operation is forbidden on this target.
    #[inline]
    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::NotAllowed {
            message: message.into(),
        }
    }

    /// Recognized but unimplemented.
    #[inline]
    pub fn not_implemented(what: impl Into<String>) -> Self {
        Self::NotImplemented { what: what.into() }
    }

    /// Not valid in the current document stage.
    #[inline]
    pub fn wrong_stage(message: impl Into<String>) -> Self {
        Self::WrongStage {
            message: message.into(),
        }
    }

    /// A host-language collaborator reported failure.
    #[inline]
    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalFailure {
            message: message.into(),
        }
    }

    /// An HVML-level exception with the given interned name.
    #[inline]
    pub fn raised(name: Atom, info: Option<Variant>) -> Self {
        Self::Raised { name, info }
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// The abstract tag of this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OutOfMemory { .. } => ErrorCode::OutOfMemory,
            Self::InvalidValue { .. } => ErrorCode::InvalidValue,
            Self::BadArg { .. } => ErrorCode::BadArg,
            Self::NotExists { .. } => ErrorCode::NotExists,
            Self::NotAllowed { .. } => ErrorCode::NotAllowed,
            Self::NotImplemented { .. } => ErrorCode::NotImplemented,
            Self::WrongStage { .. } => ErrorCode::WrongStage,
            Self::ServerRefused { .. } => ErrorCode::ServerRefused,
            Self::ExternalFailure { .. } => ErrorCode::ExternalFailure,
            Self::Raised { .. } => ErrorCode::Raised,
        }
    }

    /// The HVML exception atom this error propagates as.
    #[must_use]
    pub fn except_atom(&self) -> Atom {
        match self {
            Self::OutOfMemory { .. } => excepts::memory_failure(),
            Self::InvalidValue { .. } => excepts::invalid_value(),
            Self::BadArg { .. } => excepts::bad_name(),
            Self::NotExists { .. } => excepts::no_such_key(),
            Self::NotAllowed { .. } | Self::NotImplemented { .. } => excepts::wrong_data_type(),
            Self::WrongStage { .. } => excepts::wrong_stage(),
            Self::ServerRefused { .. } => excepts::server_refused(),
            Self::ExternalFailure { .. } => excepts::external_failure(),
            Self::Raised { name, .. } => *name,
        }
    }

    /// The exception payload, when one was attached.
    #[must_use]
    pub fn exinfo(&self) -> Option<&Variant> {
        match self {
            Self::Raised { info, .. } => info.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_classification() {
        assert_eq!(
            CoreError::invalid_value("bad").code(),
            ErrorCode::InvalidValue
        );
        assert_eq!(CoreError::not_exists("k").code(), ErrorCode::NotExists);
        assert_eq!(
            CoreError::ServerRefused {
                operation: "createPlainWindow".into(),
                ret_code: 500
            }
            .code(),
            ErrorCode::ServerRefused
        );
    }

    #[test]
    fn test_except_atom_mapping() {
        assert_eq!(
            CoreError::not_exists("k").except_atom(),
            excepts::no_such_key()
        );
        let raised = CoreError::raised(excepts::bad_name(), None);
        assert_eq!(raised.except_atom(), excepts::bad_name());
    }

    #[test]
    fn test_display() {
        let e = CoreError::not_exists("title");
        assert_eq!(e.to_string(), "NotExists: no such key 'title'");
    }
}
