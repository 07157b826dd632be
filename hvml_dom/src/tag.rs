//! The HVML tag table.
//!
//! Every vDOM element carries one of the verb tags below or `Foreign` for
//! ordinary output elements (`span`, `div`, …) that pass through to the
//! output DOM unchanged.

use std::fmt;

/// The recognized HVML tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Document element.
    Hvml,
    /// Head section.
    Head,
    /// Body section.
    Body,
    /// Bind an evaluated value to a name in scope.
    Init,
    /// Register an observer on a data source.
    Observe,
    /// One arm of a `test`.
    Match,
    /// Evaluate a value for its `match` children.
    Test,
    /// The no-arm-matched fallback of a `test`.
    Differ,
    /// Consume a propagating exception.
    Catch,
    /// Execute children with the parent's context.
    Inherit,
    /// Iterate children over an input with an executor.
    Iterate,
    /// Choose one value from an input with an executor.
    Choose,
    /// Inline error-content template.
    Except,
    /// Terminate the coroutine with a result.
    Exit,
    /// Revoke observers.
    Forget,
    /// Mutate a DOM target or container variant.
    Update,
    /// Run another document in a nested coroutine.
    Load,
    /// Store a named operation group.
    Define,
    /// Pop frames back to a checkpoint.
    Back,
    /// Call a named operation group with isolated scope.
    Call,
    /// Include a named operation group in the current scope.
    Include,
    /// Reduce an input with an executor.
    Reduce,
    /// Sort an input.
    Sort,
    /// Bind an expression (not its value) to a name.
    Bind,
    /// Store a named template.
    Archetype,
    /// Any non-verb element, passed through to the output DOM.
    Foreign,
}

impl Tag {
    /// Map a tag name to its id; unknown names are `Foreign`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "hvml" => Self::Hvml,
            "head" => Self::Head,
            "body" => Self::Body,
            "init" => Self::Init,
            "observe" => Self::Observe,
            "match" => Self::Match,
            "test" => Self::Test,
            "differ" => Self::Differ,
            "catch" => Self::Catch,
            "inherit" => Self::Inherit,
            "iterate" => Self::Iterate,
            "choose" => Self::Choose,
            "except" => Self::Except,
            "exit" => Self::Exit,
            "forget" => Self::Forget,
            "update" => Self::Update,
            "load" => Self::Load,
            "define" => Self::Define,
            "back" => Self::Back,
            "call" => Self::Call,
            "include" => Self::Include,
            "reduce" => Self::Reduce,
            "sort" => Self::Sort,
            "bind" => Self::Bind,
            "archetype" => Self::Archetype,
            _ => Self::Foreign,
        }
    }

    /// The canonical tag name; `Foreign` has none (the element keeps its
    /// literal name).
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Hvml => "hvml",
            Self::Head => "head",
            Self::Body => "body",
            Self::Init => "init",
            Self::Observe => "observe",
            Self::Match => "match",
            Self::Test => "test",
            Self::Differ => "differ",
            Self::Catch => "catch",
            Self::Inherit => "inherit",
            Self::Iterate => "iterate",
            Self::Choose => "choose",
            Self::Except => "except",
            Self::Exit => "exit",
            Self::Forget => "forget",
            Self::Update => "update",
            Self::Load => "load",
            Self::Define => "define",
            Self::Back => "back",
            Self::Call => "call",
            Self::Include => "include",
            Self::Reduce => "reduce",
            Self::Sort => "sort",
            Self::Bind => "bind",
            Self::Archetype => "archetype",
            Self::Foreign => "",
        }
    }

    /// Whether this is a verb tag (interpreted, not copied to output).
    #[must_use]
    pub fn is_verb(self) -> bool {
        !matches!(self, Self::Foreign | Self::Hvml | Self::Head | Self::Body)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_names() {
        for tag in [
            Tag::Hvml,
            Tag::Init,
            Tag::Observe,
            Tag::Iterate,
            Tag::Catch,
            Tag::Archetype,
        ] {
            assert_eq!(Tag::from_name(tag.name()), tag);
        }
    }

    #[test]
    fn test_unknown_is_foreign() {
        assert_eq!(Tag::from_name("span"), Tag::Foreign);
        assert!(!Tag::from_name("span").is_verb());
        assert!(Tag::from_name("iterate").is_verb());
    }
}
