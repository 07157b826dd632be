//! Value-construction trees (VCM).
//!
//! A VCM tree is the parsed form of an attribute value or inline content
//! expression: a literal, a maker for an array/object, a reference to a
//! symbol or named variable, a member access, or a call. The interpreter
//! evaluates a tree against the current frame; this module only defines
//! the shape.

use std::fmt;
use std::rc::Rc;

/// A shared, immutable VCM tree.
pub type Vcm = Rc<VcmNode>;

/// The eight punctuation-named per-frame symbol variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum SymbolName {
    /// `<` — the input delivered by the parent frame.
    LessThan = 0,
    /// `@` — the parent's output-DOM insertion point.
    At = 1,
    /// `!` — per-frame scratch object.
    Exclamation = 2,
    /// `?` — result of the most recent completed child frame.
    Question = 3,
    /// `%` — iteration counter.
    Percent = 4,
    /// `^` — reserved.
    Caret = 5,
    /// `&` — reserved.
    Ampersand = 6,
    /// `:` — reserved.
    Colon = 7,
}

impl SymbolName {
    /// Number of symbol variables per frame.
    pub const COUNT: usize = 8;

    /// The symbol's source character.
    #[must_use]
    pub fn glyph(self) -> char {
        match self {
            Self::LessThan => '<',
            Self::At => '@',
            Self::Exclamation => '!',
            Self::Question => '?',
            Self::Percent => '%',
            Self::Caret => '^',
            Self::Ampersand => '&',
            Self::Colon => ':',
        }
    }

    /// Map a source character to its symbol.
    #[must_use]
    pub fn from_glyph(c: char) -> Option<Self> {
        match c {
            '<' => Some(Self::LessThan),
            '@' => Some(Self::At),
            '!' => Some(Self::Exclamation),
            '?' => Some(Self::Question),
            '%' => Some(Self::Percent),
            '^' => Some(Self::Caret),
            '&' => Some(Self::Ampersand),
            ':' => Some(Self::Colon),
            _ => None,
        }
    }

    /// All symbols, in slot order.
    #[must_use]
    pub fn all() -> [Self; Self::COUNT] {
        [
            Self::LessThan,
            Self::At,
            Self::Exclamation,
            Self::Question,
            Self::Percent,
            Self::Caret,
            Self::Ampersand,
            Self::Colon,
        ]
    }
}

/// One node of a VCM tree.
#[derive(Debug, Clone)]
pub enum VcmNode {
    /// The undefined value.
    Undefined,
    /// Null.
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// Number literal.
    Number(f64),
    /// Signed integer literal (`3L`).
    LongInt(i64),
    /// Unsigned integer literal (`3UL`).
    ULongInt(u64),
    /// String literal.
    Text(String),
    /// String composition of evaluated parts (`"item $%"`).
    Concat(Vec<Vcm>),
    /// Array maker.
    MakeArray(Vec<Vcm>),
    /// Object maker with literal keys, in order.
    MakeObject(Vec<(String, Vcm)>),
    /// Reference to a frame symbol variable (`$?`, `$%`, …).
    SymbolVar(SymbolName),
    /// Reference to a named variable, resolved along the scope chain and
    /// the document variables (`$TIMERS`, user binds).
    NamedVar(String),
    /// Member access on an evaluated base (`$L.lt`, `$HVML.base`).
    Member {
        /// The accessed base expression.
        base: Vcm,
        /// The member name.
        name: String,
    },
    /// Call of an evaluated callee with evaluated arguments. The callee
    /// `raise` is intercepted by the evaluator to raise an HVML exception.
    Call {
        /// The callee expression.
        callee: Vcm,
        /// Positional arguments.
        args: Vec<Vcm>,
    },
}

impl VcmNode {
    /// A string-literal node.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Vcm {
        Rc::new(Self::Text(s.into()))
    }

    /// A signed integer node.
    #[must_use]
    pub fn longint(n: i64) -> Vcm {
        Rc::new(Self::LongInt(n))
    }

    /// An unsigned integer node.
    #[must_use]
    pub fn ulongint(n: u64) -> Vcm {
        Rc::new(Self::ULongInt(n))
    }

    /// A number node.
    #[must_use]
    pub fn number(n: f64) -> Vcm {
        Rc::new(Self::Number(n))
    }

    /// A boolean node.
    #[must_use]
    pub fn boolean(b: bool) -> Vcm {
        Rc::new(Self::Boolean(b))
    }

    /// A symbol-variable reference.
    #[must_use]
    pub fn symbol(sym: SymbolName) -> Vcm {
        Rc::new(Self::SymbolVar(sym))
    }

    /// A named-variable reference.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Vcm {
        Rc::new(Self::NamedVar(name.into()))
    }

    /// A member access.
    #[must_use]
    pub fn member(base: Vcm, name: impl Into<String>) -> Vcm {
        Rc::new(Self::Member {
            base,
            name: name.into(),
        })
    }

    /// A call node.
    #[must_use]
    pub fn call(callee: Vcm, args: Vec<Vcm>) -> Vcm {
        Rc::new(Self::Call { callee, args })
    }

    /// The conventional `raise('Name')` call.
    #[must_use]
    pub fn raise(except: &str) -> Vcm {
        Self::call(Self::named("raise"), vec![Self::text(except)])
    }

    /// An object maker.
    #[must_use]
    pub fn object(pairs: Vec<(&str, Vcm)>) -> Vcm {
        Rc::new(Self::MakeObject(
            pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
        ))
    }

    /// An array maker.
    #[must_use]
    pub fn array(items: Vec<Vcm>) -> Vcm {
        Rc::new(Self::MakeArray(items))
    }

    /// A concatenation node.
    #[must_use]
    pub fn concat(parts: Vec<Vcm>) -> Vcm {
        Rc::new(Self::Concat(parts))
    }
}

impl fmt::Display for VcmNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::LongInt(n) => write!(f, "{n}L"),
            Self::ULongInt(n) => write!(f, "{n}UL"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Concat(parts) => {
                f.write_str("\"")?;
                for p in parts {
                    write!(f, "{p}")?;
                }
                f.write_str("\"")
            }
            Self::MakeArray(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::MakeObject(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::SymbolVar(sym) => write!(f, "$0{}", sym.glyph()),
            Self::NamedVar(name) => write!(f, "${name}"),
            Self::Member { base, name } => write!(f, "{base}.{name}"),
            Self::Call { callee, args } => {
                write!(f, "{callee}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_glyph_roundtrip() {
        for sym in SymbolName::all() {
            assert_eq!(SymbolName::from_glyph(sym.glyph()), Some(sym));
        }
        assert_eq!(SymbolName::from_glyph('x'), None);
    }

    #[test]
    fn test_display() {
        let tree = VcmNode::object(vec![
            ("id", VcmNode::text("t")),
            ("interval", VcmNode::ulongint(20)),
        ]);
        assert_eq!(tree.to_string(), "{id: 't', interval: 20UL}");
        assert_eq!(VcmNode::raise("BadName").to_string(), "$raise('BadName')");
    }
}
