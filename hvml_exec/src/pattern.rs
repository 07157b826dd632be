//! Matching patterns: literal strings or `/regex/flags`, with an optional
//! `MAX n` length cap.
//!
//! A pattern literal of the form `/body/flags` compiles as a regex; flags
//! come from the fixed set `c` (force case-sensitive), `i`
//! (case-insensitive), `s` (dot matches newline). Anything else is a plain
//! literal compared for equality. The `MAX n` suffix caps the number of
//! characters of the candidate examined before matching.

use hvml_core::{CoreError, CoreResult};
use regex::{Regex, RegexBuilder};
use std::fmt;

/// A compiled matching pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Plain string equality.
    Literal {
        /// The expected text.
        text: String,
        /// Optional examined-length cap.
        max_len: Option<usize>,
    },
    /// Regex matching.
    Regex {
        /// Regex body as written (between the slashes).
        source: String,
        /// Flag characters as written.
        flags: String,
        /// Optional examined-length cap.
        max_len: Option<usize>,
        /// The compiled form.
        compiled: Regex,
    },
}

impl Pattern {
    /// Build a pattern from a string literal and optional `MAX` cap.
    pub fn parse(literal: &str, max_len: Option<usize>) -> CoreResult<Self> {
        if let Some(rest) = literal.strip_prefix('/') {
            if let Some(slash) = rest.rfind('/') {
                let source = &rest[..slash];
                let flags = &rest[slash + 1..];
                return Self::regex(source, flags, max_len);
            }
        }
        Ok(Self::Literal {
            text: literal.to_owned(),
            max_len,
        })
    }

    /// Build a regex pattern from its body and flags.
    pub fn regex(source: &str, flags: &str, max_len: Option<usize>) -> CoreResult<Self> {
        let mut builder = RegexBuilder::new(source);
        for f in flags.chars() {
            match f {
                'i' => {
                    builder.case_insensitive(true);
                }
                'c' => {
                    builder.case_insensitive(false);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                other => {
                    return Err(CoreError::bad_arg(format!(
                        "unknown pattern flag '{other}'"
                    )));
                }
            }
        }
        let compiled = builder
            .build()
            .map_err(|e| CoreError::bad_arg(format!("bad pattern: {e}")))?;
        Ok(Self::Regex {
            source: source.to_owned(),
            flags: flags.to_owned(),
            max_len,
            compiled,
        })
    }

    /// The examined-length cap, if any.
    #[must_use]
    pub fn max_len(&self) -> Option<usize> {
        match self {
            Self::Literal { max_len, .. } | Self::Regex { max_len, .. } => *max_len,
        }
    }

    /// Whether this is a regex-form pattern.
    #[must_use]
    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex { .. })
    }

    fn clip<'a>(&self, candidate: &'a str) -> &'a str {
        match self.max_len() {
            Some(cap) => {
                let end = candidate
                    .char_indices()
                    .nth(cap)
                    .map_or(candidate.len(), |(i, _)| i);
                &candidate[..end]
            }
            None => candidate,
        }
    }

    /// Match `candidate` against the pattern.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = self.clip(candidate);
        match self {
            Self::Literal { text, .. } => candidate == text,
            Self::Regex { compiled, .. } => compiled.is_match(candidate),
        }
    }
}

/// Patterns compare by their written form, not by compiled identity.
impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Literal { text: a, max_len: ma },
                Self::Literal { text: b, max_len: mb },
            ) => a == b && ma == mb,
            (
                Self::Regex {
                    source: sa,
                    flags: fa,
                    max_len: ma,
                    ..
                },
                Self::Regex {
                    source: sb,
                    flags: fb,
                    max_len: mb,
                    ..
                },
            ) => sa == sb && fa == fb && ma == mb,
            _ => false,
        }
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal { text, max_len } => {
                write!(f, "'{text}'")?;
                if let Some(m) = max_len {
                    write!(f, " MAX {m}")?;
                }
                Ok(())
            }
            Self::Regex {
                source,
                flags,
                max_len,
                ..
            } => {
                write!(f, "'/{source}/{flags}'")?;
                if let Some(m) = max_len {
                    write!(f, " MAX {m}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let p = Pattern::parse("foo", None).unwrap();
        assert!(!p.is_regex());
        assert!(p.matches("foo"));
        assert!(!p.matches("food"));
    }

    #[test]
    fn test_regex_pattern_with_flags() {
        let p = Pattern::parse("/^foo/i", None).unwrap();
        assert!(p.is_regex());
        assert!(p.matches("FOOBAR"));
        assert!(!p.matches("barfoo"));
    }

    #[test]
    fn test_max_len_clips_candidate() {
        let p = Pattern::parse("/bar$/", Some(3)).unwrap();
        // Only the first three characters are examined.
        assert!(p.matches("barbecue"));
        assert!(!p.matches("rebar"));
    }

    #[test]
    fn test_display_roundtrip() {
        let p = Pattern::parse("/^foo/i", Some(16)).unwrap();
        assert_eq!(p.to_string(), "'/^foo/i' MAX 16");
        let q = Pattern::parse("plain", None).unwrap();
        assert_eq!(q.to_string(), "'plain'");
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Pattern::parse("/x/z", None).is_err());
    }
}
