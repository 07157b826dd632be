//! Attribute operators.
//!
//! An HVML attribute names an operator that combines its freshly evaluated
//! value with the value already in place (the element's current attribute,
//! or the target of an `update`). [`apply`] is the pure combination
//! function.

use hvml_core::{CoreError, CoreResult, Variant};
use regex::Regex;
use std::fmt;

/// The seven attribute operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrOp {
    /// `=` — replace.
    Assign,
    /// `+=` — numeric add.
    Add,
    /// `-=` — numeric subtract.
    Sub,
    /// `%=` — numeric remainder.
    Rem,
    /// `~=` — regex replace: strip the portions of the old value matching
    /// the new value as a pattern.
    RegexReplace,
    /// `^=` — prepend the new value.
    Prepend,
    /// `$=` — append the new value.
    Append,
}

impl AttrOp {
    /// Parse the operator's source spelling.
    #[must_use]
    pub fn from_spelling(s: &str) -> Option<Self> {
        match s {
            "=" => Some(Self::Assign),
            "+=" => Some(Self::Add),
            "-=" => Some(Self::Sub),
            "%=" => Some(Self::Rem),
            "~=" => Some(Self::RegexReplace),
            "^=" => Some(Self::Prepend),
            "$=" => Some(Self::Append),
            _ => None,
        }
    }

    /// The operator's source spelling.
    #[must_use]
    pub fn spelling(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Rem => "%=",
            Self::RegexReplace => "~=",
            Self::Prepend => "^=",
            Self::Append => "$=",
        }
    }
}

impl fmt::Display for AttrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spelling())
    }
}

fn numeric(op: AttrOp, left: f64, right: f64) -> CoreResult<f64> {
    match op {
        AttrOp::Add => Ok(left + right),
        AttrOp::Sub => Ok(left - right),
        AttrOp::Rem => {
            if right == 0.0 {
                Err(CoreError::invalid_value("remainder by zero"))
            } else {
                Ok(left % right)
            }
        }
        _ => unreachable!(),
    }
}

/// Combine `right` (the newly evaluated value) with `left` (the value in
/// place) per `op`. A missing `left` behaves as undefined: zero for the
/// numeric operators, empty for the string operators.
pub fn apply(op: AttrOp, left: Option<&Variant>, right: &Variant) -> CoreResult<Variant> {
    match op {
        AttrOp::Assign => Ok(right.clone()),

        AttrOp::Add | AttrOp::Sub | AttrOp::Rem => {
            let l = match left {
                Some(v) => v.cast_to_number(true)?,
                None => 0.0,
            };
            let r = right.cast_to_number(true)?;
            let out = numeric(op, l, r)?;
            // Integer inputs stay integers.
            let ints = left.map_or(true, |v| v.as_i64().is_some())
                && right.as_i64().is_some()
                && out.fract() == 0.0;
            if ints {
                Ok(Variant::longint(out as i64))
            } else {
                Ok(Variant::number(out))
            }
        }

        AttrOp::RegexReplace => {
            let l = left.map(Variant::stringify).unwrap_or_default();
            let pattern = right
                .as_str()
                .ok_or_else(|| CoreError::invalid_value("regex operand must be a string"))?;
            let re = Regex::new(&pattern)
                .map_err(|e| CoreError::bad_arg(format!("bad regex: {e}")))?;
            Ok(Variant::string(re.replace_all(&l, "").into_owned()))
        }

        AttrOp::Prepend => {
            let l = left.map(Variant::stringify).unwrap_or_default();
            Ok(Variant::string(format!("{}{}", right.stringify(), l)))
        }

        AttrOp::Append => {
            let l = left.map(Variant::stringify).unwrap_or_default();
            Ok(Variant::string(format!("{}{}", l, right.stringify())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spelling_roundtrip() {
        for op in [
            AttrOp::Assign,
            AttrOp::Add,
            AttrOp::Sub,
            AttrOp::Rem,
            AttrOp::RegexReplace,
            AttrOp::Prepend,
            AttrOp::Append,
        ] {
            assert_eq!(AttrOp::from_spelling(op.spelling()), Some(op));
        }
        assert_eq!(AttrOp::from_spelling("*="), None);
    }

    #[test]
    fn test_assign_replaces() {
        let old = Variant::string("old");
        let new = Variant::string("new");
        let out = apply(AttrOp::Assign, Some(&old), &new).unwrap();
        assert_eq!(out, new);
    }

    #[test]
    fn test_numeric_ops() {
        let l = Variant::longint(7);
        let r = Variant::longint(3);
        assert_eq!(
            apply(AttrOp::Add, Some(&l), &r).unwrap().as_i64(),
            Some(10)
        );
        assert_eq!(apply(AttrOp::Sub, Some(&l), &r).unwrap().as_i64(), Some(4));
        assert_eq!(apply(AttrOp::Rem, Some(&l), &r).unwrap().as_i64(), Some(1));
        assert!(apply(AttrOp::Rem, Some(&l), &Variant::longint(0)).is_err());
    }

    #[test]
    fn test_string_ops() {
        let l = Variant::string("middle");
        assert_eq!(
            apply(AttrOp::Prepend, Some(&l), &Variant::string("pre-"))
                .unwrap()
                .stringify(),
            "pre-middle"
        );
        assert_eq!(
            apply(AttrOp::Append, Some(&l), &Variant::string("-post"))
                .unwrap()
                .stringify(),
            "middle-post"
        );
    }

    #[test]
    fn test_regex_replace_strips_matches() {
        let l = Variant::string("a1b22c333");
        let out = apply(AttrOp::RegexReplace, Some(&l), &Variant::string("[0-9]+")).unwrap();
        assert_eq!(out.stringify(), "abc");
    }
}
